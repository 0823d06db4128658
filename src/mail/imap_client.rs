use std::net::TcpStream;

use log::{debug, info, warn};
use native_tls::{TlsConnector, TlsStream};

use crate::domain::email::MessageId;
use crate::error::SessionError;
use crate::mail::session::{Credentials, FolderInfo, MailSession, SearchCriteria, TransportOptions};

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// [`MailSession`] over implicit-TLS IMAP, using password login.
#[derive(Default)]
pub struct ImapSession {
    session: Option<TlsSession>,
    selected: Option<String>,
}

impl ImapSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&mut self) -> Result<&mut TlsSession, SessionError> {
        self.session.as_mut().ok_or(SessionError::NotConnected)
    }

    /// Drop the connection if the error means it is gone.
    fn note_failure(&mut self, e: &imap::Error) {
        if is_connection_error(e) {
            warn!("IMAP connection lost: {e}");
            self.session = None;
            self.selected = None;
        }
    }
}

fn is_connection_error(e: &imap::Error) -> bool {
    matches!(
        e,
        imap::Error::Io(_) | imap::Error::ConnectionLost | imap::Error::Tls(_)
    )
}

fn login_error(e: imap::Error) -> SessionError {
    match e {
        imap::Error::No(msg) | imap::Error::Bad(msg) => SessionError::Auth(msg),
        other => SessionError::Connect(other.to_string()),
    }
}

impl MailSession for ImapSession {
    fn connect(
        &mut self,
        credentials: &Credentials,
        host: &str,
        port: u16,
        transport: &TransportOptions,
    ) -> Result<(), SessionError> {
        if self.session.is_some() {
            debug!("Already connected; replacing session");
            self.disconnect();
        }

        debug!("Connecting to {host}:{port}");
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(transport.accept_invalid_certs)
            .build()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let client = imap::connect((host, port), host, &tls)
            .map_err(|e| SessionError::Connect(e.to_string()))?;

        let session = client
            .login(&credentials.user, &credentials.password)
            .map_err(|(e, _client)| login_error(e))?;

        info!("Connected to IMAP {host} as {}", credentials.user);
        self.session = Some(session);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn open_folder(&mut self, name: &str) -> Result<FolderInfo, SessionError> {
        let res = self.live()?.select(name);
        let mailbox = match res {
            Ok(m) => m,
            Err(e) => {
                self.note_failure(&e);
                self.selected = None;
                return Err(SessionError::OpenFolder {
                    folder: name.to_string(),
                    message: e.to_string(),
                });
            }
        };

        debug!("{name} selected: {} messages", mailbox.exists);
        self.selected = Some(name.to_string());
        Ok(FolderInfo {
            name: name.to_string(),
            exists: mailbox.exists,
            recent: mailbox.recent,
            unseen: mailbox.unseen,
            uid_validity: mailbox.uid_validity,
        })
    }

    fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<MessageId>, SessionError> {
        if self.selected.is_none() {
            return Err(SessionError::FolderNotOpen);
        }
        let query = criteria.to_imap_query();
        let res = self.live()?.uid_search(&query);
        match res {
            Ok(set) => {
                let mut uids: Vec<MessageId> = set.into_iter().collect();
                uids.sort_unstable();
                debug!("SEARCH {query}: {} hits", uids.len());
                Ok(uids)
            }
            Err(e) => {
                self.note_failure(&e);
                Err(SessionError::Search(e.to_string()))
            }
        }
    }

    fn fetch(&mut self, id: MessageId, mark_seen: bool) -> Result<Vec<u8>, SessionError> {
        if self.selected.is_none() {
            return Err(SessionError::FolderNotOpen);
        }
        // BODY[] sets \Seen as a side effect; BODY.PEEK[] does not.
        let query = if mark_seen {
            "(UID BODY[])"
        } else {
            "(UID BODY.PEEK[])"
        };

        let res = self.live()?.uid_fetch(id.to_string(), query);
        let fetches = match res {
            Ok(f) => f,
            Err(e) => {
                self.note_failure(&e);
                return Err(SessionError::Fetch {
                    uid: id,
                    message: e.to_string(),
                });
            }
        };

        let body = fetches
            .iter()
            .find_map(|f| f.body())
            .ok_or(SessionError::MessageNotFound(id))?;
        debug!("Fetch completed for UID {id} ({} bytes)", body.len());
        Ok(body.to_vec())
    }

    fn disconnect(&mut self) {
        self.selected = None;
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.logout() {
                warn!("IMAP logout failed: {e}");
            }
            info!("Disconnected from IMAP");
        }
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
