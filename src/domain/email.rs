use chrono::{DateTime, Utc};
use serde::Serialize;

/// Provider-assigned UID, unique within the selected folder for the life of
/// one session. Not stable across reconnects.
pub type MessageId = u32;

/// One attachment as delivered by the parser, payload already transfer-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: Option<&str>,
        content_type: Option<&str>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.map(str::to_string),
            content_type: content_type.map(str::to_string),
            content,
        }
    }
}

/// Decoded view of one mail item.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Display text of the `From` header, e.g. `Alice <alice@example.com>`.
    pub from: String,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
}

impl ParsedMessage {
    pub fn info(&self) -> EmailInfo {
        EmailInfo {
            from: self.from.clone(),
            subject: self.subject.clone(),
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailInfo {
    pub from: String,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
}
