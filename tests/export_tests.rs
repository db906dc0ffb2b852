//! End-to-end export runs against a mocked Gmail account
//!
//! These tests drive the public `Exporter` through resolve, list, fetch and
//! flush and check the files left on disk.

mod common;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::*;
use gmail_label_export::auth::{AuthorizationFlow, Credential, CredentialManager};
use gmail_label_export::config::{BatchMode, ExportConfig};
use gmail_label_export::error::{GmailError, Result};
use gmail_label_export::exporter::{Exporter, NoProgress};
use mockall::predicate::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn export_config(dir: &TempDir, batch_size: usize, mode: BatchMode) -> ExportConfig {
    ExportConfig {
        batch_size,
        batch_mode: mode,
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_legacy_export_of_450_messages_writes_first_batch_only() {
    let dir = TempDir::new().unwrap();
    let mut exporter = Exporter::new(mock_account(450, 100), export_config(&dir, 200, BatchMode::Legacy));

    let report = exporter.run(false, &NoProgress).await.unwrap();

    assert_eq!(report.label_id, "L1");
    assert_eq!(report.messages_listed, 450);
    assert_eq!(report.files.len(), 1);
    assert_eq!(
        read_record_ids(&dir.path().join("gaby-email-part-1.json")),
        message_ids(0..200)
    );
    assert!(!dir.path().join("gaby-email-part-2.json").exists());
}

#[tokio::test]
async fn test_legacy_export_of_1000_messages_writes_cumulative_files() {
    let dir = TempDir::new().unwrap();
    let mut exporter = Exporter::new(mock_account(1000, 500), export_config(&dir, 200, BatchMode::Legacy));

    let report = exporter.run(false, &NoProgress).await.unwrap();

    assert_eq!(report.messages_fetched, 600);
    assert_eq!(report.messages_skipped, 400);
    for (n, upto) in [(1, 200), (2, 400), (3, 600)] {
        let path = dir.path().join(format!("gaby-email-part-{}.json", n));
        assert_eq!(read_record_ids(&path), message_ids(0..upto));
    }
    assert!(!dir.path().join("gaby-email-part-4.json").exists());
}

#[tokio::test]
async fn test_windowed_export_partitions_all_messages() {
    let dir = TempDir::new().unwrap();
    let mut exporter = Exporter::new(mock_account(450, 100), export_config(&dir, 200, BatchMode::Windowed));

    let report = exporter.run(false, &NoProgress).await.unwrap();

    assert_eq!(report.messages_fetched, 450);
    assert_eq!(report.files.len(), 3);
    assert_eq!(read_record_ids(&dir.path().join("gaby-email-part-1.json")), message_ids(0..200));
    assert_eq!(read_record_ids(&dir.path().join("gaby-email-part-2.json")), message_ids(200..400));
    assert_eq!(read_record_ids(&dir.path().join("gaby-email-part-3.json")), message_ids(400..450));
}

#[tokio::test]
async fn test_records_carry_headers_and_cleaned_content() {
    let dir = TempDir::new().unwrap();
    let mut client = MockGmailClient::new();
    client.expect_list_labels().returning(|| Ok(account_labels()));
    client
        .expect_list_messages_page()
        .returning(|_, _, _| Ok(create_page(message_ids(0..1), None)));
    client.expect_get_raw_message().with(eq("m0")).returning(|id| {
        Ok(create_raw_message(
            id,
            "Sounds good\r\n> On Monday you wrote\r\nSee you\u{200B}\u{200B}\u{200B}",
        ))
    });

    let mut exporter = Exporter::new(client, export_config(&dir, 1, BatchMode::Windowed));
    exporter.run(false, &NoProgress).await.unwrap();

    let content = std::fs::read_to_string(dir.path().join("gaby-email-part-1.json")).unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
    let record = records[0].as_object().unwrap();

    let keys: Vec<&String> = record.keys().collect();
    assert_eq!(keys, vec!["From", "To", "Subject", "X-Test-Id", "email_content"]);
    assert_eq!(record["Subject"], "Message m0");

    let body = record["email_content"].as_str().unwrap();
    assert!(body.starts_with("Sounds good"));
    assert!(!body.contains("On Monday"));
    assert!(!body.contains('\u{200B}'));
}

#[tokio::test]
async fn test_pagination_disabled_exports_first_page_only() {
    let dir = TempDir::new().unwrap();
    let mut config = export_config(&dir, 10, BatchMode::Windowed);
    config.paginate_messages = false;

    let mut exporter = Exporter::new(mock_account(25, 15), config);
    let report = exporter.run(false, &NoProgress).await.unwrap();

    assert_eq!(report.messages_listed, 15);
    assert_eq!(read_record_ids(&dir.path().join("gaby-email-part-2.json")), message_ids(10..15));
}

#[tokio::test]
async fn test_label_resolved_by_id() {
    let dir = TempDir::new().unwrap();
    let mut config = export_config(&dir, 10, BatchMode::Windowed);
    config.label = "L1".to_string();

    let mut exporter = Exporter::new(mock_account(3, 10), config);
    let report = exporter.run(false, &NoProgress).await.unwrap();
    assert_eq!(report.label_id, "L1");
    assert_eq!(report.files.len(), 1);
}

#[tokio::test]
async fn test_unknown_label_lists_nothing() {
    let dir = TempDir::new().unwrap();
    let mut client = MockGmailClient::new();
    client.expect_list_labels().returning(|| Ok(account_labels()));
    client.expect_list_messages_page().never();
    client.expect_get_raw_message().never();

    let mut config = export_config(&dir, 10, BatchMode::Windowed);
    config.label = "Missing".to_string();

    let mut exporter = Exporter::new(client, config);
    let err = exporter.run(false, &NoProgress).await.unwrap_err();
    assert!(matches!(err, GmailError::LabelNotFound(ref name) if name == "Missing"));
}

#[tokio::test]
async fn test_custom_prefix_and_nested_output_dir() {
    let dir = TempDir::new().unwrap();
    let mut config = export_config(&dir, 2, BatchMode::Windowed);
    config.output_dir = dir.path().join("exports").join("gaby");
    config.file_prefix = "archive".to_string();

    let mut exporter = Exporter::new(mock_account(3, 10), config);
    exporter.run(false, &NoProgress).await.unwrap();

    let out = dir.path().join("exports").join("gaby");
    assert_eq!(read_record_ids(&out.join("archive-1.json")), message_ids(0..2));
    assert_eq!(read_record_ids(&out.join("archive-2.json")), message_ids(2..3));
}

/// Flow that only counts interactive authorizations
struct CountingFlow {
    authorizations: Arc<AtomicUsize>,
}

#[async_trait]
impl AuthorizationFlow for CountingFlow {
    async fn refresh(&self, _credential: &Credential) -> Result<Credential> {
        Err(GmailError::TokenRefreshRejected("invalid_grant".to_string()))
    }

    async fn authorize(&self) -> Result<Credential> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        Ok(Credential {
            token: Some("fresh-token".to_string()),
            refresh_token: Some("refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
            expiry: Some(Utc::now() + Duration::hours(1)),
        })
    }
}

#[tokio::test]
async fn test_revoked_token_reauthorizes_once_then_reuses_cache() {
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("token.json");
    std::fs::write(
        &token_path,
        r#"{"token":"old","refresh_token":"revoked","client_id":"client","client_secret":"secret",
            "scopes":["https://www.googleapis.com/auth/gmail.readonly"],"expiry":"2020-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    let authorizations = Arc::new(AtomicUsize::new(0));
    let flow = || {
        Box::new(CountingFlow {
            authorizations: Arc::clone(&authorizations),
        })
    };

    let first = CredentialManager::new(&token_path, flow()).acquire().await.unwrap();
    assert_eq!(first.token.as_deref(), Some("fresh-token"));

    let second = CredentialManager::new(&token_path, flow()).acquire().await.unwrap();
    assert_eq!(second, first);
    assert_eq!(authorizations.load(Ordering::SeqCst), 1);
}
