//! In-memory session registry.
//!
//! [`SessionStore`] is the single source of truth for the running instance.
//! Every change goes through one path: the registry is updated, observers are
//! called with the new snapshot, then the persistable part of the registry is
//! queued for writing. Changes are applied one at a time.
//!
//! The store has to be seeded once with [`SessionStore::restore`] before it
//! accepts changes.

mod notifier;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::persist::{PersistWriter, PersistedSession, PersistenceBackend};
use crate::process::{ProcessControl, ProcessStatus, SupervisedProcess};
use crate::recovery::{self, Reconciled};
use crate::session::{Session, SessionId, SessionInfo};

pub use notifier::Subscription;
use notifier::Notifier;

/// Summary of startup recovery.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Sessions re-adopted from disk
    pub recovered: usize,
    /// Records dropped because their process is gone
    pub discarded: Vec<PersistedSession>,
}

/// Registry of sessions with change notification and persistence.
pub struct SessionStore {
    sessions: Mutex<Vec<Session>>,
    turn: Mutex<()>,
    notifier: Arc<Notifier>,
    backend: Arc<dyn PersistenceBackend>,
    writer: PersistWriter,
    restored: AtomicBool,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("observers", &self.notifier)
            .field("restored", &self.is_restored())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionStore {
    /// Create an empty, not yet restored store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            turn: Mutex::new(()),
            notifier: Arc::new(Notifier::default()),
            writer: PersistWriter::spawn(Arc::clone(&backend)),
            backend,
            restored: AtomicBool::new(false),
        }
    }

    /// Seed the registry from persisted records.
    ///
    /// Records whose process is alive become recovered sessions; the rest are
    /// dropped. Observers are notified once and the reconciled set is written
    /// back. Unreadable storage is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRestored`] on a second call and
    /// [`Error::ReentrantMutation`] when called from an observer.
    pub fn restore(&self, control: &dyn ProcessControl) -> Result<RestoreReport> {
        if notifier::is_dispatching() {
            return Err(Error::ReentrantMutation);
        }
        let _turn = lock(&self.turn);
        if self.restored.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRestored);
        }

        let records = self.backend.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load session records, starting empty");
            Vec::new()
        });
        self.writer
            .claim(records.iter().map(|record| record.id.clone()));

        let Reconciled { live, discarded } = recovery::reconcile(records, control);
        let report = RestoreReport {
            recovered: live.len(),
            discarded,
        };

        let (snapshot, records) = {
            let mut sessions = lock(&self.sessions);
            *sessions = live;
            (snapshot_of(&sessions), records_of(&sessions))
        };
        self.publish(&snapshot, records);

        Ok(report)
    }

    /// Whether [`restore`](Self::restore) has run.
    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::SeqCst)
    }

    /// Generate an id not used by any current session.
    pub fn generate_id(&self) -> SessionId {
        let sessions = lock(&self.sessions);
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if !sessions.iter().any(|s| s.id() == id) {
                return id;
            }
        }
    }

    /// Insert a session.
    ///
    /// Returns `false`, without notifying, if the id is already present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRestored`] before restore and
    /// [`Error::ReentrantMutation`] when called from an observer.
    pub fn add(&self, session: Session) -> Result<bool> {
        self.mutate(|sessions| {
            if sessions.iter().any(|s| s.id() == session.id()) {
                tracing::debug!(id = %session.id(), "Ignoring duplicate session");
                return Ok((false, false));
            }
            sessions.push(session);
            Ok((true, true))
        })
    }

    /// Remove a session, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`add`](Self::add).
    pub fn remove(&self, id: &str) -> Result<Option<Session>> {
        self.mutate(|sessions| {
            let removed = sessions
                .iter()
                .position(|s| s.id() == id)
                .map(|index| sessions.remove(index));
            let changed = removed.is_some();
            Ok((removed, changed))
        })
    }

    /// Remove a session only while it has no ticket.
    ///
    /// Returns `None`, without notifying, if the session is gone or already
    /// carries a ticket.
    ///
    /// # Errors
    ///
    /// Same conditions as [`add`](Self::add).
    pub fn remove_pending(&self, id: &str) -> Result<Option<Session>> {
        self.mutate(|sessions| {
            let removed = sessions
                .iter()
                .position(|s| s.id() == id && s.ticket().is_none())
                .map(|index| sessions.remove(index));
            let changed = removed.is_some();
            Ok((removed, changed))
        })
    }

    /// Set a session's ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown id and
    /// [`Error::TicketAlreadyAssigned`] if a different ticket is already set.
    pub fn assign_ticket(&self, id: &str, ticket: &str) -> Result<()> {
        self.mutate(|sessions| {
            let session = find_mut(sessions, id)?;
            if session.ticket() == Some(ticket) {
                return Ok(((), false));
            }
            session.assign_ticket(ticket)?;
            Ok(((), true))
        })
    }

    /// Record the process spawned for a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown id and
    /// [`Error::ProcessAlreadyAttached`] if a process is already recorded.
    pub fn attach_process(&self, id: &str, process: SupervisedProcess) -> Result<()> {
        self.mutate(|sessions| {
            find_mut(sessions, id)?.attach_process(process)?;
            Ok(((), true))
        })
    }

    /// Snapshot of all sessions in insertion order.
    pub fn list(&self) -> Vec<SessionInfo> {
        snapshot_of(&lock(&self.sessions))
    }

    /// Snapshot of one session.
    pub fn get(&self, id: &str) -> Option<SessionInfo> {
        lock(&self.sessions)
            .iter()
            .find(|s| s.id() == id)
            .map(Session::info)
    }

    /// Whether a session with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.sessions).iter().any(|s| s.id() == id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a full id or a unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if nothing matches and
    /// [`Error::AmbiguousSessionId`] if several sessions match.
    pub fn resolve_id(&self, prefix: &str) -> Result<SessionId> {
        if prefix.is_empty() {
            return Err(Error::SessionNotFound(String::new()));
        }
        let sessions = lock(&self.sessions);
        if let Some(session) = sessions.iter().find(|s| s.id() == prefix) {
            return Ok(session.id().to_string());
        }

        let mut matches = sessions.iter().filter(|s| s.id().starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(session), None) => Ok(session.id().to_string()),
            (Some(_), _) => Err(Error::AmbiguousSessionId(prefix.to_string())),
            (None, _) => Err(Error::SessionNotFound(prefix.to_string())),
        }
    }

    /// Register an observer, called after every change with the new snapshot.
    ///
    /// Observers run synchronously on the thread making the change and must
    /// not modify the store; such calls fail with
    /// [`Error::ReentrantMutation`].
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&[SessionInfo]) + Send + Sync + 'static,
    {
        self.notifier.subscribe(observer)
    }

    /// Wait for queued writes to reach storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] if the latest write failed.
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    /// Check the supervised process of a session.
    ///
    /// Returns `None` if the session is gone or has no supervised process.
    pub(crate) fn poll_process(&self, id: &str) -> Option<ProcessStatus> {
        let mut sessions = lock(&self.sessions);
        sessions
            .iter_mut()
            .find(|s| s.id() == id)?
            .process_mut()
            .supervised_mut()
            .map(SupervisedProcess::poll_exit)
    }

    fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Session>) -> Result<(T, bool)>,
    {
        if notifier::is_dispatching() {
            return Err(Error::ReentrantMutation);
        }
        if !self.is_restored() {
            return Err(Error::NotRestored);
        }

        let _turn = lock(&self.turn);
        let (value, snapshot, records) = {
            let mut sessions = lock(&self.sessions);
            let (value, changed) = change(&mut *sessions)?;
            if !changed {
                return Ok(value);
            }
            (value, snapshot_of(&sessions), records_of(&sessions))
        };
        self.publish(&snapshot, records);

        Ok(value)
    }

    fn publish(&self, snapshot: &[SessionInfo], records: Vec<PersistedSession>) {
        self.notifier.notify(snapshot);
        self.writer.submit(records);
    }
}

fn find_mut<'a>(sessions: &'a mut [Session], id: &str) -> Result<&'a mut Session> {
    sessions
        .iter_mut()
        .find(|s| s.id() == id)
        .ok_or_else(|| Error::SessionNotFound(id.to_string()))
}

fn snapshot_of(sessions: &[Session]) -> Vec<SessionInfo> {
    sessions.iter().map(Session::info).collect()
}

fn records_of(sessions: &[Session]) -> Vec<PersistedSession> {
    sessions.iter().filter_map(Session::to_record).collect()
}
