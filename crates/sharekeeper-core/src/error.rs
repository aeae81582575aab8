//! Error types for Sharekeeper.
//!
//! This module provides a unified error type for all session operations,
//! with specific error variants for different failure modes.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` type for Sharekeeper operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Sharekeeper.
#[derive(Error, Debug)]
pub enum Error {
    /// The transfer tool could not be started (S001)
    #[error("failed to start '{binary}': {reason}")]
    SpawnFailed {
        /// Binary that was invoked
        binary: String,
        /// Path that was being shared
        path: PathBuf,
        /// OS error description
        reason: String,
    },

    /// No ticket appeared in the tool output in time (S002)
    #[error("no ticket received within {}ms", .0.as_millis())]
    ExtractionTimeout(Duration),

    /// Session records could not be read or written (S003)
    #[error("persistence error: {0}")]
    PersistenceFailed(String),

    /// The OS refused to signal the session's process (S004)
    #[error("failed to stop process {pid}: {reason}")]
    StopFailed {
        /// Process id that was signalled
        pid: u32,
        /// OS error description
        reason: String,
    },

    /// The tool exited before printing a ticket (S005)
    #[error("'{binary}' exited before printing a ticket ({status})")]
    ToolExited {
        /// Binary that was invoked
        binary: String,
        /// Exit status description
        status: String,
        /// Last line of captured output, if any
        last_output: Option<String>,
    },

    /// No session with this id
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// An id prefix matched several sessions
    #[error("session id '{0}' matches more than one session")]
    AmbiguousSessionId(String),

    /// The session already carries a different ticket
    #[error("session '{0}' already has a ticket")]
    TicketAlreadyAssigned(String),

    /// The session already has a process attached
    #[error("session '{0}' already has a process attached")]
    ProcessAlreadyAttached(String),

    /// A change observer tried to mutate the store
    #[error("session store cannot be modified from inside a change observer")]
    ReentrantMutation,

    /// The store was mutated before startup recovery ran
    #[error("session store has not been restored yet")]
    NotRestored,

    /// Startup recovery was requested twice
    #[error("session store was already restored")]
    AlreadyRestored,

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern SXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::SpawnFailed { .. } => Some("S001"),
            Self::ExtractionTimeout(_) => Some("S002"),
            Self::PersistenceFailed(_) => Some("S003"),
            Self::StopFailed { .. } => Some("S004"),
            Self::ToolExited { .. } => Some("S005"),
            _ => None,
        }
    }

    /// Returns whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ExtractionTimeout(_) | Self::PersistenceFailed(_) | Self::ToolExited { .. }
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::SpawnFailed { path, .. } => Some(format!(
                "Make sure sendme is installed: https://github.com/n0-computer/sendme#installation\n\
                 Or share manually from a terminal:\n  {}",
                crate::tool::fallback_command(path)
            )),
            Self::ExtractionTimeout(_) => Some(
                "sendme may still be starting up in the background.\n\
                 Set `on_timeout = \"kill\"` under [tool] to stop slow launches instead,\n\
                 or raise `ticket_timeout`."
                    .to_string(),
            ),
            Self::PersistenceFailed(_) => Some(
                "Running shares are unaffected; the session file will be rewritten on the next change."
                    .to_string(),
            ),
            Self::AmbiguousSessionId(_) => {
                Some("Use more characters of the session id.".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let spawn = Error::SpawnFailed {
            binary: "sendme".to_string(),
            path: PathBuf::from("/tmp/a.txt"),
            reason: "not found".to_string(),
        };
        assert_eq!(spawn.code(), Some("S001"));
        assert_eq!(
            Error::ExtractionTimeout(Duration::from_secs(5)).code(),
            Some("S002")
        );
        assert_eq!(Error::NotRestored.code(), None);
    }

    #[test]
    fn test_timeout_message_in_millis() {
        let err = Error::ExtractionTimeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "no ticket received within 5000ms");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_spawn_failure_suggests_manual_command() {
        let err = Error::SpawnFailed {
            binary: "sendme".to_string(),
            path: PathBuf::from("/tmp/my \"file\".txt"),
            reason: "No such file or directory".to_string(),
        };
        let hint = err.suggestion().unwrap();
        assert!(hint.contains(r#"sendme send "/tmp/my \"file\".txt""#));
        assert!(!err.is_recoverable());
    }
}
