//! Message records built from raw RFC 822 bytes

use mail_parser::{MessageParser, MessagePart, MimeHeaders};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cleaner::clean_body;
use crate::client::GmailClient;
use crate::error::{GmailError, Result};

/// Key under which the cleaned body text is stored
pub const CONTENT_KEY: &str = "email_content";

/// Top-level headers in message order plus the cleaned body under
/// [`CONTENT_KEY`]. A header repeated in the message keeps its first
/// position and the value of its last occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRecord(Map<String, Value>);

impl MessageRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn content(&self) -> &str {
        self.get(CONTENT_KEY).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse raw message bytes into a record with a cleaned body
pub fn parse_raw_message(raw: &[u8]) -> Result<MessageRecord> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| GmailError::InvalidMessageFormat("Unparseable RFC 822 message".to_string()))?;

    let root = message.root_part();
    let raw_message = message.raw_message();
    let mut fields = Map::new();

    for header in root.headers() {
        let name = raw_bytes(raw_message, header.offset_field, header.offset_start)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .and_then(|field| field.strip_suffix(':'))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| header.name.as_str());

        // Non UTF-8 bytes (e.g. a bare Latin-1 Subject) become U+FFFD
        let value = raw_bytes(raw_message, header.offset_start, header.offset_end)
            .map(|bytes| unfold(&String::from_utf8_lossy(bytes)))
            .unwrap_or_default();

        fields.insert(name.to_string(), Value::String(value));
    }

    let body: String = message
        .parts
        .iter()
        .filter(|part| is_plain_text_body(part))
        .filter_map(|part| part.text_contents())
        .collect();

    fields.insert(CONTENT_KEY.to_string(), Value::String(clean_body(&body)));
    Ok(MessageRecord(fields))
}

/// Fetch one message and turn it into a record
pub async fn fetch_and_clean<C: GmailClient + ?Sized>(client: &C, id: &str) -> Result<MessageRecord> {
    let raw = client.get_raw_message(id).await?;
    debug!("Fetched message {} ({} bytes)", id, raw.len());
    parse_raw_message(&raw)
}

fn raw_bytes(raw: &[u8], start: u32, end: u32) -> Option<&[u8]> {
    raw.get(start as usize..end as usize)
}

/// Join folded header lines and trim the surrounding whitespace
fn unfold(value: &str) -> String {
    value.replace("\r\n", "").replace('\n', "").trim().to_string()
}

/// `text/plain` leaf parts that are neither attachments nor named files;
/// a part without a Content-Type header defaults to `text/plain`.
fn is_plain_text_body(part: &MessagePart<'_>) -> bool {
    if !part.is_text() || part.is_text_html() || part.attachment_name().is_some() {
        return false;
    }
    if part
        .content_disposition()
        .is_some_and(|disposition| disposition.is_attachment())
    {
        return false;
    }
    match part.content_type() {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct
                    .subtype()
                    .is_some_and(|subtype| subtype.eq_ignore_ascii_case("plain"))
        }
        None => true,
    }
}
