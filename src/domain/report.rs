use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::email::EmailInfo;

/// Record of one persisted attachment. Never mutated after the store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    pub original_name: Option<String>,
    pub saved_as: String,
    pub path: PathBuf,
    pub size: u64,
    pub sender: String,
    pub subject: Option<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    #[serde(rename = "subject mismatch")]
    SubjectMismatch,
    #[serde(rename = "no pdf attachments")]
    NoPdfAttachments,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SubjectMismatch => f.write_str("subject mismatch"),
            SkipReason::NoPdfAttachments => f.write_str("no pdf attachments"),
        }
    }
}

/// What the pipeline did with one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Skipped {
        reason: SkipReason,
    },
    Processed {
        saved_files: Vec<SavedFile>,
        email_info: EmailInfo,
    },
}

impl ProcessingOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        ProcessingOutcome::Skipped { reason }
    }

    pub fn saved_files(&self) -> &[SavedFile] {
        match self {
            ProcessingOutcome::Processed { saved_files, .. } => saved_files,
            ProcessingOutcome::Skipped { .. } => &[],
        }
    }
}
