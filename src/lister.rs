//! Lists the message ids filed under a label

use async_stream::stream;
use futures::stream::{Stream, TryStreamExt};
use std::pin::Pin;
use tracing::{debug, info};

use crate::client::GmailClient;
use crate::error::Result;

/// Listing options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub include_spam_trash: bool,
    /// Follow `nextPageToken`; when false only the first page is returned
    pub paginate: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            include_spam_trash: false,
            paginate: true,
        }
    }
}

pub struct MessageLister<'c, C: GmailClient> {
    client: &'c C,
    options: ListOptions,
}

impl<'c, C: GmailClient> MessageLister<'c, C> {
    pub fn new(client: &'c C, options: ListOptions) -> Self {
        Self { client, options }
    }

    /// Stream ids page by page, in provider order
    pub fn stream_message_ids<'a>(
        &'a self,
        label_id: &'a str,
    ) -> Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>> {
        Box::pin(stream! {
            let mut page_token: Option<String> = None;
            let mut page_number = 0usize;

            loop {
                page_number += 1;
                let page = match self
                    .client
                    .list_messages_page(label_id, self.options.include_spam_trash, page_token.take())
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                debug!("Page {} returned {} message ids", page_number, page.ids.len());
                for id in page.ids {
                    yield Ok(id);
                }

                match page.next_page_token {
                    Some(token) if self.options.paginate => page_token = Some(token),
                    Some(_) => {
                        debug!("More pages available but pagination is disabled");
                        break;
                    }
                    None => break,
                }
            }
        })
    }

    /// Collect every id under `label_id`
    pub async fn list_message_ids(&self, label_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = self.stream_message_ids(label_id).try_collect().await?;
        info!("Listed {} messages under label {}", ids.len(), label_id);
        Ok(ids)
    }
}
