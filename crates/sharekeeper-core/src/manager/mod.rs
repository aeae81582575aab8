//! High-level session operations.
//!
//! [`SessionManager`] ties the store, the launcher and process control
//! together. A host application builds one, restores it once at startup,
//! and then shares and stops paths through it.
//!
//! ```rust,ignore
//! let manager = SessionManager::from_config(&config);
//! manager.restore()?;
//!
//! let _sub = manager.subscribe(|sessions| println!("{} sessions", sessions.len()));
//! let info = manager.share("/tmp/report.pdf").await?;
//! manager.stop(&info.id)?;
//! manager.flush().await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::persist::{JsonFileBackend, PersistenceBackend};
use crate::process::{ProcessControl, SystemProcesses, Termination};
use crate::session::{Session, SessionId, SessionInfo};
use crate::store::{RestoreReport, SessionStore, Subscription};

/// Entry point for sharing and stopping paths.
pub struct SessionManager {
    store: Arc<SessionStore>,
    launcher: Launcher,
    control: Arc<dyn ProcessControl>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager over the given storage, launcher and process control.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        backend: Arc<dyn PersistenceBackend>,
        launcher: Launcher,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            store: Arc::new(SessionStore::new(backend)),
            launcher,
            control,
        }
    }

    /// Create a manager using the configured session file and the host's
    /// processes.
    pub fn from_config(config: &Config) -> Self {
        let control: Arc<dyn ProcessControl> = Arc::new(SystemProcesses);
        let backend = Arc::new(JsonFileBackend::new(config.storage.sessions_file_path()));
        let launcher = Launcher::from_config(config, Arc::clone(&control));
        Self::new(backend, launcher, control)
    }

    /// Re-adopt sessions from the previous run. Must be called once before
    /// sharing or stopping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRestored`] on a second call.
    pub fn restore(&self) -> Result<RestoreReport> {
        let report = self.store.restore(self.control.as_ref())?;
        for record in &report.discarded {
            self.launcher.discard_output(&record.id);
        }
        Ok(report)
    }

    /// Share `path` and wait for its ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path does not exist, and the
    /// launch errors described on [`Launcher::launch`].
    pub async fn share(&self, path: impl AsRef<Path>) -> Result<SessionInfo> {
        let path = resolve_path(path.as_ref()).await?;

        let id = self.store.generate_id();
        self.store.add(Session::new(id.clone(), path.clone()))?;
        tracing::debug!(id = %id, path = %path.display(), "Created pending session");

        self.launcher.launch(&self.store, &id, &path).await?;

        self.store.get(&id).ok_or(Error::SessionNotFound(id))
    }

    /// Stop a session: drop it from the registry, then signal its process.
    ///
    /// A process that is already gone counts as stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown id and
    /// [`Error::StopFailed`] if the OS refuses the signal. In the latter case
    /// the session has still been removed.
    pub fn stop(&self, id: &str) -> Result<SessionInfo> {
        let session = self
            .store
            .remove(id)?
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        let info = session.info();
        self.launcher.discard_output(&info.id);

        if let Some(pid) = session.pid() {
            match self.control.terminate(pid) {
                Ok(Termination::Signalled) => {
                    tracing::info!(id = %info.id, pid, "Stopped session");
                }
                Ok(Termination::AlreadyGone) => {
                    tracing::info!(id = %info.id, pid, "Session process already exited");
                }
                Err(e) => {
                    tracing::warn!(id = %info.id, pid, error = %e, "Failed to signal session process");
                    return Err(e);
                }
            }
        } else {
            tracing::info!(id = %info.id, "Removed pending session");
        }

        Ok(info)
    }

    /// Stop every session, returning one result per session.
    pub fn stop_all(&self) -> Vec<Result<SessionInfo>> {
        self.store
            .list()
            .into_iter()
            .map(|info| self.stop(&info.id))
            .collect()
    }

    /// Snapshot of all sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.store.list()
    }

    /// Snapshot of one session.
    pub fn get(&self, id: &str) -> Option<SessionInfo> {
        self.store.get(id)
    }

    /// Resolve a full id or unique prefix.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::resolve_id`].
    pub fn resolve_id(&self, prefix: &str) -> Result<SessionId> {
        self.store.resolve_id(prefix)
    }

    /// Register a change observer.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&[SessionInfo]) + Send + Sync + 'static,
    {
        self.store.subscribe(observer)
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The launcher in use.
    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Wait for pending session writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] if the latest write failed.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }
}

async fn resolve_path(path: &Path) -> Result<PathBuf> {
    tokio::fs::canonicalize(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::InvalidPath(format!("{} does not exist", path.display()))
        } else {
            Error::Io(e)
        }
    })
}
