use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::email::MessageId;

/// When a fetched UID counts as handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Record every fetched UID, even if processing failed. No retries
    /// within the process lifetime.
    #[default]
    RecordAlways,
    /// Record only UIDs whose processing produced an outcome, so failures
    /// are attempted again next cycle while still unseen.
    RecordOnSuccess,
}

impl DedupPolicy {
    pub fn should_record(self, succeeded: bool) -> bool {
        match self {
            DedupPolicy::RecordAlways => true,
            DedupPolicy::RecordOnSuccess => succeeded,
        }
    }
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "record_always" | "always" => Ok(DedupPolicy::RecordAlways),
            "record_on_success" | "on_success" => Ok(DedupPolicy::RecordOnSuccess),
            other => Err(format!("unknown dedup policy: {other}")),
        }
    }
}

/// UIDs already handled in this process. Only grows; never persisted.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    ids: HashSet<MessageId>,
}

impl ProcessedSet {
    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: MessageId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_decisions() {
        assert!(DedupPolicy::RecordAlways.should_record(false));
        assert!(DedupPolicy::RecordAlways.should_record(true));
        assert!(!DedupPolicy::RecordOnSuccess.should_record(false));
        assert!(DedupPolicy::RecordOnSuccess.should_record(true));
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("record-on-success".parse::<DedupPolicy>(), Ok(DedupPolicy::RecordOnSuccess));
        assert_eq!("ALWAYS".parse::<DedupPolicy>(), Ok(DedupPolicy::RecordAlways));
        assert!("sometimes".parse::<DedupPolicy>().is_err());
    }

    #[test]
    fn set_grows_monotonically() {
        let mut set = ProcessedSet::default();
        assert!(set.is_empty());
        assert!(set.insert(42));
        assert!(!set.insert(42));
        assert!(set.contains(42));
        assert_eq!(set.len(), 1);
    }
}
