//! Common test utilities and fixtures

#![allow(dead_code)]

use gmail_label_export::client::{GmailClient, LabelInfo, MessagePage};
use gmail_label_export::error::Result;
use mockall::mock;

/// Build a minimal RFC 822 message whose `X-Test-Id` header carries `id`
pub fn create_raw_message(id: &str, body: &str) -> Vec<u8> {
    format!(
        "From: Sender <sender@example.com>\r\n\
To: gaby@example.com\r\n\
Subject: Message {id}\r\n\
X-Test-Id: {id}\r\n\
\r\n\
{body}\r\n"
    )
    .into_bytes()
}

/// Message ids `m0`, `m1`, ...
pub fn message_ids(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("m{}", i)).collect()
}

/// Create a test LabelInfo
pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Labels of a typical account with the export label at `L1`
pub fn account_labels() -> Vec<LabelInfo> {
    vec![
        create_test_label_info("INBOX", "INBOX"),
        create_test_label_info("SENT", "SENT"),
        create_test_label_info("L1", "Gaby"),
    ]
}

pub fn create_page(ids: Vec<String>, next_page_token: Option<&str>) -> MessagePage {
    MessagePage {
        ids,
        next_page_token: next_page_token.map(|s| s.to_string()),
    }
}

/// Read the `X-Test-Id` of every record in a batch file
pub fn read_record_ids(path: &std::path::Path) -> Vec<String> {
    let content = std::fs::read_to_string(path).unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
    records
        .iter()
        .map(|r| r["X-Test-Id"].as_str().unwrap().to_string())
        .collect()
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait::async_trait]
    impl GmailClient for GmailClient {
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn list_messages_page(
            &self,
            label_id: &str,
            include_spam_trash: bool,
            page_token: Option<String>,
        ) -> Result<MessagePage>;
        async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>>;
        async fn get_profile_email(&self) -> Result<String>;
    }
}

/// A mock account holding `total` messages under `L1`, served in pages of `page_size`
pub fn mock_account(total: usize, page_size: usize) -> MockGmailClient {
    let mut client = MockGmailClient::new();
    client.expect_list_labels().returning(|| Ok(account_labels()));
    client
        .expect_list_messages_page()
        .returning(move |_, _, token| {
            let start: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + page_size).min(total);
            let next = (end < total).then(|| end.to_string());
            Ok(MessagePage {
                ids: message_ids(start..end),
                next_page_token: next,
            })
        });
    client
        .expect_get_raw_message()
        .returning(|id| Ok(create_raw_message(id, &format!("Body of {}", id))));
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_raw_message() {
        let raw = String::from_utf8(create_raw_message("m7", "hello")).unwrap();
        assert!(raw.contains("X-Test-Id: m7\r\n"));
        assert!(raw.ends_with("\r\nhello\r\n"));
    }

    #[test]
    fn test_message_ids() {
        assert_eq!(message_ids(0..3), vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_create_page() {
        let page = create_page(message_ids(0..2), Some("token123"));
        assert_eq!(page.ids.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("token123"));
    }
}
