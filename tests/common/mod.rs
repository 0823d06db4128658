#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use report_ingest::daemon::dedup::DedupPolicy;
use report_ingest::daemon::{PollConfig, PollingController};
use report_ingest::domain::email::MessageId;
use report_ingest::error::SessionError;
use report_ingest::mail::parser::MailparseParser;
use report_ingest::mail::session::{
    Credentials, FolderInfo, MailSession, SearchCriteria, TransportOptions,
};
use report_ingest::pipeline::IngestionPipeline;
use report_ingest::store::fs::ReportStore;

pub const PDF_BASE64: &str = "JVBERi0xLjQ=";

/// Multipart message with one part per `(filename, content_type)`.
pub fn raw_message(subject: Option<&str>, attachments: &[(&str, &str)]) -> Vec<u8> {
    let mut m = String::from("From: Alice <alice@example.com>\r\nTo: inbox@example.com\r\n");
    if let Some(s) = subject {
        m.push_str(&format!("Subject: {s}\r\n"));
    }
    m.push_str("Date: Tue, 5 Mar 2024 14:07:09 +0000\r\n");
    m.push_str("MIME-Version: 1.0\r\n");
    m.push_str("Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n\r\n");
    m.push_str("--BOUNDARY\r\nContent-Type: text/plain\r\n\r\nPlease find attached.\r\n");
    for (name, ctype) in attachments {
        m.push_str("--BOUNDARY\r\n");
        m.push_str(&format!("Content-Type: {ctype}; name=\"{name}\"\r\n"));
        m.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{name}\"\r\n"
        ));
        m.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        m.push_str(PDF_BASE64);
        m.push_str("\r\n");
    }
    m.push_str("--BOUNDARY--\r\n");
    m.into_bytes()
}

pub fn report_with_pdf(name: &str) -> Vec<u8> {
    raw_message(Some("Weekly Report"), &[(name, "application/pdf")])
}

#[derive(Debug, Default)]
pub struct CallLog {
    pub searches: usize,
    pub fetches: Vec<(MessageId, bool)>,
    pub disconnects: usize,
}

impl CallLog {
    pub fn fetch_count(&self, id: MessageId) -> usize {
        self.fetches.iter().filter(|(f, _)| *f == id).count()
    }
}

/// In-memory mailbox. Search always returns `search_results`.
#[derive(Default)]
pub struct FakeMailbox {
    pub messages: HashMap<MessageId, Vec<u8>>,
    pub search_results: Vec<MessageId>,
    pub fail_search: bool,
    pub fail_fetch: HashSet<MessageId>,
    /// Fetch failures that also drop the connection.
    pub lose_connection_on_fetch: bool,
    /// First fetch signals the sender, then blocks until the receiver fires.
    pub gate: Option<(Sender<()>, Receiver<()>)>,
    pub log: Arc<Mutex<CallLog>>,
    connected: bool,
    selected: bool,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<(MessageId, Vec<u8>)>) -> Self {
        let search_results = messages.iter().map(|(id, _)| *id).collect();
        Self {
            messages: messages.into_iter().collect(),
            search_results,
            ..Self::default()
        }
    }
}

impl MailSession for FakeMailbox {
    fn connect(
        &mut self,
        credentials: &Credentials,
        _host: &str,
        _port: u16,
        _transport: &TransportOptions,
    ) -> Result<(), SessionError> {
        if credentials.password != "app-password" {
            return Err(SessionError::Auth("Invalid credentials".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn open_folder(&mut self, name: &str) -> Result<FolderInfo, SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        self.selected = true;
        Ok(FolderInfo {
            name: name.to_string(),
            exists: self.messages.len() as u32,
            recent: 0,
            unseen: None,
            uid_validity: Some(1),
        })
    }

    fn search(&mut self, _criteria: &SearchCriteria) -> Result<Vec<MessageId>, SessionError> {
        if !self.selected {
            return Err(SessionError::FolderNotOpen);
        }
        self.log.lock().unwrap().searches += 1;
        if self.fail_search {
            return Err(SessionError::Search("SEARCH rejected".into()));
        }
        Ok(self.search_results.clone())
    }

    fn fetch(&mut self, id: MessageId, mark_seen: bool) -> Result<Vec<u8>, SessionError> {
        self.log.lock().unwrap().fetches.push((id, mark_seen));
        if let Some((entered, release)) = self.gate.take() {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        if self.fail_fetch.contains(&id) {
            if self.lose_connection_on_fetch {
                self.connected = false;
                self.selected = false;
            }
            return Err(SessionError::Fetch {
                uid: id,
                message: "connection reset".into(),
            });
        }
        self.messages
            .get(&id)
            .cloned()
            .ok_or(SessionError::MessageNotFound(id))
    }

    fn disconnect(&mut self) {
        self.log.lock().unwrap().disconnects += 1;
        self.connected = false;
        self.selected = false;
    }
}

pub fn good_credentials() -> Credentials {
    Credentials {
        user: "me@example.com".into(),
        password: "app-password".into(),
    }
}

/// Connected controller writing into `dir`.
pub fn connected_controller(
    mailbox: FakeMailbox,
    dir: &Path,
    dedup: DedupPolicy,
) -> PollingController<FakeMailbox> {
    let config = PollConfig {
        dedup,
        ..PollConfig::default()
    };
    controller_with(mailbox, dir, config)
}

pub fn controller_with(
    mailbox: FakeMailbox,
    dir: &Path,
    config: PollConfig,
) -> PollingController<FakeMailbox> {
    let store = ReportStore::open(dir).unwrap();
    let pipeline = IngestionPipeline::new(MailparseParser, store);
    let controller = PollingController::new(mailbox, pipeline, config);
    controller
        .connect(
            &good_credentials(),
            "imap.example.com",
            993,
            &TransportOptions::default(),
        )
        .unwrap();
    controller
}

pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
