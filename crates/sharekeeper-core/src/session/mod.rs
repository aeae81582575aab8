//! Session data model.
//!
//! A [`Session`] is one sharing of one path. It starts out pending (no ticket,
//! no process), becomes active once the tool has printed its ticket, or is
//! re-created as recovered from a record left by an earlier run.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::persist::{timestamp, PersistedSession};
use crate::process::{ProcessHandle, SupervisedProcess};

/// Unique session identifier.
pub type SessionId = String;

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Launched or launching, no ticket yet
    Pending,
    /// Ticket known, process started by this run
    Active,
    /// Restored from disk, process inherited from an earlier run
    Recovered,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Recovered => write!(f, "recovered"),
        }
    }
}

/// A single share of a file or folder.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    path: PathBuf,
    name: String,
    created_at: DateTime<Utc>,
    ticket: String,
    process: ProcessHandle,
}

impl Session {
    /// Create a pending session for `path`.
    pub fn new(id: impl Into<SessionId>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: id.into(),
            name: display_name(&path),
            path,
            created_at: Utc::now().trunc_subsecs(3),
            ticket: String::new(),
            process: ProcessHandle::NotSpawned,
        }
    }

    /// Re-create a session from a record whose process is still alive.
    pub(crate) fn recovered(record: PersistedSession) -> Self {
        Self {
            id: record.id,
            path: record.path,
            name: record.name,
            created_at: record.created_at,
            ticket: record.ticket,
            process: ProcessHandle::Recovered { pid: record.pid },
        }
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name, the last path component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time, millisecond precision.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Receive ticket, once known.
    pub fn ticket(&self) -> Option<&str> {
        (!self.ticket.is_empty()).then_some(self.ticket.as_str())
    }

    /// OS process id, once spawned.
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Process relation.
    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    /// Whether the session was inherited from an earlier run.
    pub fn is_recovered(&self) -> bool {
        self.process.is_recovered()
    }

    /// Current lifecycle stage.
    pub fn state(&self) -> SessionState {
        if self.is_recovered() {
            SessionState::Recovered
        } else if self.ticket().is_some() && self.pid().is_some() {
            SessionState::Active
        } else {
            SessionState::Pending
        }
    }

    /// Read-only view handed to observers and callers.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            ticket: self.ticket.clone(),
            pid: self.pid(),
            state: self.state(),
        }
    }

    /// Set the ticket. A ticket is written once; repeating the same value is
    /// accepted.
    pub(crate) fn assign_ticket(&mut self, ticket: &str) -> Result<()> {
        if self.ticket.is_empty() {
            self.ticket = ticket.to_string();
            Ok(())
        } else if self.ticket == ticket {
            Ok(())
        } else {
            Err(Error::TicketAlreadyAssigned(self.id.clone()))
        }
    }

    /// Attach the process spawned for this session.
    pub(crate) fn attach_process(&mut self, process: SupervisedProcess) -> Result<()> {
        if !matches!(self.process, ProcessHandle::NotSpawned) {
            return Err(Error::ProcessAlreadyAttached(self.id.clone()));
        }
        self.process = ProcessHandle::Supervised(process);
        Ok(())
    }

    pub(crate) fn process_mut(&mut self) -> &mut ProcessHandle {
        &mut self.process
    }

    /// Stored form of the session. Only sessions with both a process and a
    /// ticket are persisted.
    pub fn to_record(&self) -> Option<PersistedSession> {
        let pid = self.pid()?;
        let ticket = self.ticket()?;
        Some(PersistedSession {
            id: self.id.clone(),
            pid,
            ticket: ticket.to_string(),
            path: self.path.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        })
    }
}

/// Last component of `path`, or the whole path if it has none.
pub fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id
    pub id: SessionId,
    /// Shared path
    pub path: PathBuf,
    /// Display name
    pub name: String,
    /// Creation time
    #[serde(serialize_with = "timestamp::serialize")]
    pub created_at: DateTime<Utc>,
    /// Receive ticket, empty while pending
    pub ticket: String,
    /// OS process id, if spawned
    pub pid: Option<u32>,
    /// Lifecycle stage
    pub state: SessionState,
}

impl SessionInfo {
    /// Whether the session was inherited from an earlier run.
    pub fn recovered(&self) -> bool {
        self.state == SessionState::Recovered
    }

    /// Command the recipient runs, once the ticket is known.
    pub fn receive_command(&self) -> Option<String> {
        (!self.ticket.is_empty()).then(|| crate::tool::receive_command(&self.ticket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PersistedSession {
        PersistedSession {
            id: "abc".to_string(),
            pid: 4242,
            ticket: "blobTICKET".to_string(),
            path: PathBuf::from("/home/u/photos"),
            name: "photos".to_string(),
            created_at: Utc::now().trunc_subsecs(3),
        }
    }

    #[test]
    fn test_new_session_is_pending() {
        let session = Session::new("id-1", "/tmp/report.pdf");
        assert_eq!(session.state(), SessionState::Pending);
        assert_eq!(session.name(), "report.pdf");
        assert_eq!(session.ticket(), None);
        assert_eq!(session.pid(), None);
        assert!(session.to_record().is_none());
        assert_eq!(session.created_at().timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_display_name_falls_back_to_full_path() {
        assert_eq!(display_name(Path::new("/a/b/c.txt")), "c.txt");
        assert_eq!(display_name(Path::new("/")), "/");
    }

    #[test]
    fn test_ticket_is_write_once() {
        let mut session = Session::new("id-1", "/tmp/a");
        session.assign_ticket("T1").unwrap();
        session.assign_ticket("T1").unwrap();
        assert!(matches!(
            session.assign_ticket("T2"),
            Err(Error::TicketAlreadyAssigned(_))
        ));
        assert_eq!(session.ticket(), Some("T1"));
    }

    #[test]
    fn test_ticket_without_process_stays_pending() {
        let mut session = Session::new("id-1", "/tmp/a");
        session.assign_ticket("T1").unwrap();
        assert_eq!(session.state(), SessionState::Pending);
        assert!(session.to_record().is_none());
    }

    #[test]
    fn test_recovered_session_keeps_record_fields() {
        let rec = record();
        let session = Session::recovered(rec.clone());

        assert_eq!(session.state(), SessionState::Recovered);
        assert!(session.is_recovered());
        assert_eq!(session.pid(), Some(4242));
        assert_eq!(session.to_record(), Some(rec));

        let info = session.info();
        assert!(info.recovered());
        assert_eq!(info.receive_command().as_deref(), Some("sendme receive blobTICKET"));
    }

    #[test]
    fn test_info_json_uses_camel_case() {
        let info = Session::recovered(record()).info();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["state"], "recovered");
        assert_eq!(json["pid"], 4242);
        assert!(json["createdAt"].as_str().unwrap().ends_with('Z'));
    }
}
