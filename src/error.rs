//! Error types for the ingestion agent.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::email::MessageId;

/// Failures talking to the remote mailbox.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or TLS failure while establishing the connection.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Operation attempted without a live connection.
    #[error("Not connected")]
    NotConnected,

    /// Search or fetch attempted before a folder was selected.
    #[error("No folder selected")]
    FolderNotOpen,

    /// Selecting the folder failed.
    #[error("Failed to open folder {folder}: {message}")]
    OpenFolder { folder: String, message: String },

    /// SEARCH command failed.
    #[error("Search failed: {0}")]
    Search(String),

    /// FETCH command failed.
    #[error("Fetch failed for UID {uid}: {message}")]
    Fetch { uid: MessageId, message: String },

    /// FETCH succeeded but returned no body for the UID.
    #[error("Message UID {0} not found")]
    MessageNotFound(MessageId),
}

impl SessionError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SessionError::Auth(_))
    }
}

/// Raw message bytes could not be decoded.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Message is empty")]
    Empty,

    #[error("Message has no headers")]
    NoHeaders,

    #[error("Malformed message: {0}")]
    Malformed(#[from] mailparse::MailParseError),
}

/// Why one message in a cycle produced no outcome.
#[derive(Debug, Error)]
pub enum MessageError {
    /// FETCH failed while the connection stayed usable.
    #[error(transparent)]
    Fetch(SessionError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Writing a report to disk failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create reports folder {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Every candidate name for this attachment already exists.
    #[error("No free filename for {0}")]
    Exhausted(String),
}

/// Lifecycle misuse of the polling controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Polling already started")]
    AlreadyStarted,

    #[error("Controller is stopped; create a new one to poll again")]
    Stopped,

    #[error("Failed to spawn poll timer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}
