//! Timer-driven polling of the mailbox.
//!
//! One cycle: select folder, search, then fetch and process each new UID in
//! order on the shared connection. At most one cycle runs at a time; a tick
//! that arrives while a cycle is running is dropped, not queued.

pub mod dedup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::daemon::dedup::{DedupPolicy, ProcessedSet};
use crate::domain::email::MessageId;
use crate::domain::report::ProcessingOutcome;
use crate::error::{ControllerError, MessageError, SessionError};
use crate::mail::session::{Credentials, MailSession, SearchCriteria, TransportOptions};
use crate::pipeline::IngestionPipeline;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub folder: String,
    pub criteria: SearchCriteria,
    pub mark_seen: bool,
    pub dedup: DedupPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            folder: "INBOX".to_string(),
            criteria: SearchCriteria::unread_reports(),
            mark_seen: true,
            dedup: DedupPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug)]
pub struct MessageReport {
    pub id: MessageId,
    pub result: Result<ProcessingOutcome, MessageError>,
}

/// What one cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// UIDs returned by the search, including ones already handled.
    pub found: Vec<MessageId>,
    pub messages: Vec<MessageReport>,
    /// Failure that ended the cycle early: folder or search errors, or a
    /// fetch that lost the connection.
    pub error: Option<SessionError>,
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed(CycleReport),
    /// Another cycle was in flight.
    Dropped,
    NotConnected,
    Stopped,
}

struct Timer {
    cancel: Option<Sender<()>>,
    handle: JoinHandle<()>,
}

struct Shared<S> {
    session: Mutex<S>,
    pipeline: IngestionPipeline,
    config: PollConfig,
    processed: Mutex<ProcessedSet>,
    connected: AtomicBool,
    polling: AtomicBool,
    stopped: AtomicBool,
    /// Logout deferred to the end of the running cycle.
    disconnect_requested: AtomicBool,
}

/// Clears the single-flight flag on every exit path.
struct CycleGuard<'a> {
    polling: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.polling.store(false, Ordering::Release);
        debug!("Poll state: Polling -> Idle");
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: MailSession> Shared<S> {
    fn tick(&self) -> TickOutcome {
        if self.stopped.load(Ordering::Acquire) {
            return TickOutcome::Stopped;
        }
        if !self.connected.load(Ordering::Acquire) {
            debug!("Not connected; skipping poll");
            return TickOutcome::NotConnected;
        }
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Poll cycle still running; dropping tick");
            return TickOutcome::Dropped;
        }
        let _guard = CycleGuard {
            polling: &self.polling,
        };
        debug!("Poll state: Idle -> Polling");

        let mut report = CycleReport::default();
        {
            let mut session = lock(&self.session);
            if self.disconnect_requested.load(Ordering::SeqCst) {
                return TickOutcome::NotConnected;
            }
            if let Err(e) = self.run_cycle(&mut *session, &mut report) {
                error!("Error checking for emails: {e}");
                report.error = Some(e);
            }
            let still_wanted = !self.disconnect_requested.load(Ordering::SeqCst);
            self.connected
                .store(still_wanted && session.is_connected(), Ordering::Release);
        }

        // Checked after releasing the session so a disconnect that found it
        // busy is always picked up here.
        if self.disconnect_requested.load(Ordering::SeqCst) {
            self.logout();
        }
        TickOutcome::Completed(report)
    }

    fn logout(&self) {
        let mut session = lock(&self.session);
        session.disconnect();
        self.connected.store(false, Ordering::Release);
    }

    fn run_cycle(&self, session: &mut S, report: &mut CycleReport) -> Result<(), SessionError> {
        session.open_folder(&self.config.folder)?;
        let ids = session.search(&self.config.criteria)?;
        if ids.is_empty() {
            info!("No new report emails found");
            return Ok(());
        }
        info!("Found {} unread emails with \"report\" in subject", ids.len());
        report.found.clone_from(&ids);

        for id in ids {
            if lock(&self.processed).contains(id) {
                debug!("UID {id} already handled; skipping");
                continue;
            }

            let raw = match session.fetch(id, self.config.mark_seen) {
                Ok(raw) => raw,
                Err(e) if !session.is_connected() => {
                    self.record(id, false);
                    return Err(e);
                }
                Err(e) => {
                    error!("Fetch error for UID {id}: {e}");
                    self.record(id, false);
                    report.messages.push(MessageReport {
                        id,
                        result: Err(MessageError::Fetch(e)),
                    });
                    continue;
                }
            };

            let result = self.pipeline.process(&raw).map_err(MessageError::from);
            match &result {
                Ok(outcome) => debug!("UID {id} handled: {outcome:?}"),
                Err(e) => error!("Error processing email UID {id}: {e}"),
            }
            self.record(id, result.is_ok());
            report.messages.push(MessageReport { id, result });
        }
        Ok(())
    }

    fn record(&self, id: MessageId, succeeded: bool) {
        if self.config.dedup.should_record(succeeded) {
            lock(&self.processed).insert(id);
        } else {
            debug!("UID {id} left eligible for retry");
        }
    }
}

/// Drives [`MailSession`] and [`IngestionPipeline`] on a repeating timer.
pub struct PollingController<S: MailSession + 'static> {
    shared: Arc<Shared<S>>,
    timer: Mutex<Option<Timer>>,
}

impl<S: MailSession + 'static> PollingController<S> {
    pub fn new(session: S, pipeline: IngestionPipeline, config: PollConfig) -> Self {
        let connected = session.is_connected();
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                pipeline,
                config,
                processed: Mutex::new(ProcessedSet::default()),
                connected: AtomicBool::new(connected),
                polling: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                disconnect_requested: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn connect(
        &self,
        credentials: &Credentials,
        host: &str,
        port: u16,
        transport: &TransportOptions,
    ) -> Result<(), SessionError> {
        let mut session = lock(&self.shared.session);
        let res = session.connect(credentials, host, port, transport);
        self.shared
            .connected
            .store(session.is_connected(), Ordering::Release);
        res
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ControllerState {
        if self.shared.stopped.load(Ordering::Acquire) {
            ControllerState::Stopped
        } else if self.shared.polling.load(Ordering::Acquire) {
            ControllerState::Polling
        } else {
            ControllerState::Idle
        }
    }

    /// One timer fire. Public so a supervisor or test can trigger a cycle.
    pub fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }

    pub fn has_processed(&self, id: MessageId) -> bool {
        lock(&self.shared.processed).contains(id)
    }

    pub fn processed_count(&self) -> usize {
        lock(&self.shared.processed).len()
    }

    /// Run one cycle now, then one every `interval` on a background thread.
    pub fn start(&self, interval: Duration) -> Result<(), ControllerError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(ControllerError::Stopped);
        }
        let mut timer = lock(&self.timer);
        if timer.is_some() {
            return Err(ControllerError::AlreadyStarted);
        }

        info!(
            "Starting mailbox polling every {} seconds",
            interval.as_secs_f64()
        );
        let (tx, rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("report-poll".to_string())
            .spawn(move || {
                shared.tick();
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            shared.tick();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Poll timer cleared");
            })?;

        *timer = Some(Timer {
            cancel: Some(tx),
            handle,
        });
        Ok(())
    }

    /// Cancel the timer. A cycle already running is left to finish. Terminal.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timer) = lock(&self.timer).as_mut()
            && let Some(cancel) = timer.cancel.take()
        {
            let _ = cancel.send(());
        }
        info!("Stopped mailbox polling");
    }

    /// Stop polling and log out.
    ///
    /// Returns once the timer is cancelled. If a cycle holds the session, the
    /// logout happens when that cycle ends; a hung fetch does not block here.
    pub fn disconnect(&self) {
        self.stop();
        self.shared.disconnect_requested.store(true, Ordering::SeqCst);

        let mut session = match self.shared.session.try_lock() {
            Ok(s) => s,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                info!("Poll cycle in flight; logout deferred until it ends");
                self.shared.connected.store(false, Ordering::Release);
                // The timer thread exits on its own once the cycle returns.
                drop(lock(&self.timer).take());
                return;
            }
        };
        session.disconnect();
        self.shared.connected.store(false, Ordering::Release);
        drop(session);

        if let Some(timer) = lock(&self.timer).take()
            && timer.handle.join().is_err()
        {
            warn!("Poll timer thread panicked");
        }
    }
}

impl<S: MailSession + 'static> Drop for PollingController<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
