use std::fmt;

use crate::domain::email::MessageId;
use crate::error::SessionError;

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Skip certificate validation. Only for self-signed test servers.
    pub accept_invalid_certs: bool,
}

/// Result of selecting a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub name: String,
    pub exists: u32,
    pub recent: u32,
    pub unseen: Option<u32>,
    pub uid_validity: Option<u32>,
}

/// Conjunction of search predicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchCriteria {
    pub unseen_only: bool,
    /// Substring match on the subject; servers compare case-insensitively.
    pub subject_contains: Option<String>,
}

impl SearchCriteria {
    /// Unread messages whose subject mentions "report".
    pub fn unread_reports() -> Self {
        Self {
            unseen_only: true,
            subject_contains: Some("report".to_string()),
        }
    }

    pub fn to_imap_query(&self) -> String {
        let mut parts = Vec::new();
        if self.unseen_only {
            parts.push("UNSEEN".to_string());
        }
        if let Some(s) = &self.subject_contains {
            parts.push(format!("SUBJECT {}", quote(s)));
        }
        if parts.is_empty() {
            "ALL".to_string()
        } else {
            parts.join(" ")
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Connection to a remote mail store.
///
/// Implementations never retry or reconnect on their own; a connection-level
/// failure leaves the session disconnected and the caller decides what next.
pub trait MailSession: Send {
    fn connect(
        &mut self,
        credentials: &Credentials,
        host: &str,
        port: u16,
        transport: &TransportOptions,
    ) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;

    /// Select a folder for subsequent search/fetch. Re-selecting is fine.
    fn open_folder(&mut self, name: &str) -> Result<FolderInfo, SessionError>;

    /// Matching UIDs in ascending order. No match is an empty vec.
    fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<MessageId>, SessionError>;

    /// Full raw message. With `mark_seen` the server flags it read as part of
    /// the same fetch.
    fn fetch(&mut self, id: MessageId, mark_seen: bool) -> Result<Vec<u8>, SessionError>;

    /// Idempotent.
    fn disconnect(&mut self);
}
