//! Gmail API client used by the export
//!
//! Every call is awaited on its own; there is no fan-out and no retry, so a
//! failed request surfaces straight to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::auth::{GmailHub, READONLY_SCOPES};
use crate::error::{GmailError, Result};

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One page of `users.messages.list`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Trait defining Gmail client operations for easier testing
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List all labels in the account, in provider order
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Fetch a single page of message ids carrying `label_id`
    async fn list_messages_page(
        &self,
        label_id: &str,
        include_spam_trash: bool,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// Fetch the full RFC 822 bytes of a message
    async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>>;

    /// Email address of the authorized account
    async fn get_profile_email(&self) -> Result<String>;
}

/// Production Gmail client wrapping the generated hub
pub struct ProductionGmailClient {
    hub: GmailHub,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        debug!("Calling Gmail API to list labels...");
        let (_, response) = self
            .hub
            .users()
            .labels_list("me")
            .add_scope(READONLY_SCOPES[0])
            .doit()
            .await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Fetched {} labels", labels.len());
        Ok(labels)
    }

    async fn list_messages_page(
        &self,
        label_id: &str,
        include_spam_trash: bool,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .add_label_ids(label_id)
            .include_spam_trash(include_spam_trash);

        if let Some(token) = page_token.as_ref() {
            call = call.page_token(token);
        }

        let (_, response) = call.add_scope(READONLY_SCOPES[0]).doit().await?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg_ref| msg_ref.id)
            .collect();

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("raw")
            .add_scope(READONLY_SCOPES[0])
            .doit()
            .await?;

        // google-gmail1 has already base64url-decoded `raw`
        message.raw.ok_or_else(|| {
            GmailError::InvalidMessageFormat(format!("Message {} has no raw payload", id))
        })
    }

    async fn get_profile_email(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile("me")
            .add_scope(READONLY_SCOPES[0])
            .doit()
            .await?;

        Ok(profile.email_address.unwrap_or_default())
    }
}

// Implement GmailClient for Arc<C> to allow shared ownership
#[async_trait]
impl<C: GmailClient + ?Sized> GmailClient for Arc<C> {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn list_messages_page(
        &self,
        label_id: &str,
        include_spam_trash: bool,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        self.as_ref()
            .list_messages_page(label_id, include_spam_trash, page_token)
            .await
    }

    async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>> {
        self.as_ref().get_raw_message(id).await
    }

    async fn get_profile_email(&self) -> Result<String> {
        self.as_ref().get_profile_email().await
    }
}
