use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};

use crate::domain::email::{Attachment, EmailInfo};
use crate::domain::report::SavedFile;
use crate::error::StorageError;
use crate::store::repo::ReportRepository;

const MAX_SENDER_CHARS: usize = 50;
const MAX_NAME_ATTEMPTS: usize = 100;
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Writes reports as plain files under one directory.
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self { dir: dir.into() };
        store.ensure_dir()?;
        info!("Reports folder ensured at: {}", store.dir.display());
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    fn save_at(
        &self,
        attachment: &Attachment,
        message: &EmailInfo,
        now: DateTime<Utc>,
    ) -> Result<SavedFile, StorageError> {
        self.ensure_dir()?;

        let timestamp = file_timestamp(now);
        let filename = build_filename(&timestamp, &message.from, attachment.filename.as_deref());
        let (saved_as, path) = self.write_new(&filename, &attachment.content)?;

        info!(
            "Saved PDF: {} ({} bytes)",
            saved_as,
            attachment.content.len()
        );

        Ok(SavedFile {
            original_name: attachment.filename.clone(),
            saved_as,
            path,
            size: attachment.content.len() as u64,
            sender: message.from.clone(),
            subject: message.subject.clone(),
            saved_at: now,
        })
    }

    /// Create a file that did not exist before, suffixing the name on collision.
    fn write_new(&self, filename: &str, content: &[u8]) -> Result<(String, PathBuf), StorageError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                filename.to_string()
            } else {
                with_suffix(filename, attempt)
            };
            let path = self.dir.join(&candidate);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("{} already exists, trying next name", candidate);
                    continue;
                }
                Err(source) => return Err(StorageError::Write { path, source }),
            };

            file.write_all(content)
                .and_then(|_| file.flush())
                .map_err(|source| StorageError::Write {
                    path: path.clone(),
                    source,
                })?;

            let abs = fs::canonicalize(&path).unwrap_or(path);
            return Ok((candidate, abs));
        }
        Err(StorageError::Exhausted(filename.to_string()))
    }
}

impl ReportRepository for ReportStore {
    fn save(&self, attachment: &Attachment, message: &EmailInfo) -> Result<SavedFile, StorageError> {
        self.save_at(attachment, message, Utc::now())
    }
}

/// ISO-8601 with milliseconds, `:` and `.` replaced so it is filename-safe.
pub fn file_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// `<timestamp>_<sender>_<original name or fallback>`
pub fn build_filename(timestamp: &str, sender: &str, original: Option<&str>) -> String {
    let name = original
        .and_then(base_name)
        .map(str::to_string)
        .unwrap_or_else(|| format!("attachment-{timestamp}.pdf"));
    format!("{}_{}_{}", timestamp, sanitize_sender(sender), name)
}

/// Reduce sender display text to something usable in a filename.
///
/// `Alice <alice@example.com>` becomes `alice@example.com`.
pub fn sanitize_sender(text: &str) -> String {
    if text.is_empty() {
        return "unknown".to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in extract_address(text).chars() {
        if INVALID_FILENAME_CHARS.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        out.push(ch);
    }

    let out: String = out.chars().take(MAX_SENDER_CHARS).collect();
    if out.is_empty() {
        "unknown".to_string()
    } else {
        out
    }
}

fn extract_address(text: &str) -> &str {
    if let (Some(start), Some(end)) = (text.find('<'), text.rfind('>'))
        && end > start + 1
    {
        return &text[start + 1..end];
    }
    text
}

/// Last path component, so a hostile filename cannot escape the directory.
fn base_name(name: &str) -> Option<&str> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    match last {
        "" | "." | ".." => None,
        s => Some(s),
    }
}

fn with_suffix(filename: &str, n: usize) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{n}.{ext}"),
        _ => format!("{filename}-{n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(from: &str) -> EmailInfo {
        EmailInfo {
            from: from.to_string(),
            subject: Some("Weekly Report".to_string()),
            date: None,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn sanitize_extracts_address() {
        assert_eq!(sanitize_sender("Alice <alice@example.com>"), "alice@example.com");
    }

    #[test]
    fn sanitize_strips_invalid_chars() {
        assert_eq!(sanitize_sender("a/b:c\"d|e?f*g\\h"), "abcdefgh");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_sender("Reports   Team\tEast"), "Reports_Team_East");
    }

    #[test]
    fn sanitize_truncates_to_fifty() {
        let long = "x".repeat(80);
        assert_eq!(sanitize_sender(&long).chars().count(), 50);
    }

    #[test]
    fn sanitize_empty_is_unknown() {
        assert_eq!(sanitize_sender(""), "unknown");
        assert_eq!(sanitize_sender("???"), "unknown");
    }

    #[test]
    fn timestamp_is_filename_safe() {
        assert_eq!(file_timestamp(fixed_now()), "2024-03-05T14-07-09-000Z");
    }

    #[test]
    fn filename_layout() {
        let name = build_filename("T", "Bob <bob@x.org>", Some("q.pdf"));
        assert_eq!(name, "T_bob@x.org_q.pdf");
    }

    #[test]
    fn filename_fallback_when_absent() {
        let name = build_filename("T", "bob@x.org", None);
        assert_eq!(name, "T_bob@x.org_attachment-T.pdf");
    }

    #[test]
    fn filename_drops_directory_parts() {
        let name = build_filename("T", "bob", Some("../../etc/evil.pdf"));
        assert_eq!(name, "T_bob_evil.pdf");
        let name = build_filename("T", "bob", Some(".."));
        assert_eq!(name, "T_bob_attachment-T.pdf");
    }

    #[test]
    fn save_writes_bytes_and_reports_size() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::open(tmp.path().join("reports")).unwrap();
        let att = Attachment::new(Some("q.pdf"), Some("application/pdf"), b"%PDF-1.4".to_vec());

        let saved = store.save_at(&att, &info("Alice <alice@example.com>"), fixed_now()).unwrap();

        assert_eq!(saved.saved_as, "2024-03-05T14-07-09-000Z_alice@example.com_q.pdf");
        assert_eq!(saved.size, 8);
        assert_eq!(saved.original_name.as_deref(), Some("q.pdf"));
        assert!(saved.path.is_absolute());
        assert_eq!(fs::read(&saved.path).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn second_open_keeps_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("reports");
        let store = ReportStore::open(&dir).unwrap();
        let att = Attachment::new(Some("q.pdf"), None, b"one".to_vec());
        let first = store.save(&att, &info("a@b.c")).unwrap();

        let again = ReportStore::open(&dir).unwrap();
        let att2 = Attachment::new(Some("r.pdf"), None, b"two".to_vec());
        again.save(&att2, &info("a@b.c")).unwrap();

        assert_eq!(fs::read(&first.path).unwrap(), b"one");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);
    }

    #[test]
    fn collision_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::open(tmp.path()).unwrap();
        let a = Attachment::new(Some("q.pdf"), None, b"first".to_vec());
        let b = Attachment::new(Some("q.pdf"), None, b"second".to_vec());

        let one = store.save_at(&a, &info("x"), fixed_now()).unwrap();
        let two = store.save_at(&b, &info("x"), fixed_now()).unwrap();

        assert_ne!(one.path, two.path);
        assert!(two.saved_as.ends_with("_x_q-1.pdf"));
        assert_eq!(fs::read(&one.path).unwrap(), b"first");
        assert_eq!(fs::read(&two.path).unwrap(), b"second");
    }

    #[test]
    fn unusable_directory_is_storage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let err = ReportStore::open(&blocker).err().unwrap();
        assert!(matches!(err, StorageError::CreateDir { .. }));
    }

    #[test]
    fn suffix_placement() {
        assert_eq!(with_suffix("a_b.pdf", 2), "a_b-2.pdf");
        assert_eq!(with_suffix("noext", 1), "noext-1");
    }
}
