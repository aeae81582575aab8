//! Serialized background writes of registry snapshots.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;

use super::{PersistedSession, PersistenceBackend};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Snapshot {
    version: u64,
    records: Vec<PersistedSession>,
    owned: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
struct WriteStatus {
    version: u64,
    error: Option<String>,
}

/// Writes registry snapshots through a backend, one write at a time.
///
/// Snapshots are handed over through a watch channel, so a burst of
/// submissions collapses into a single write of the newest one and writes
/// never run out of order.
///
/// Each write merges through [`PersistenceBackend::merge`]. The writer owns
/// every id it was asked to write plus the ids passed to
/// [`claim`](Self::claim), and leaves other stored records alone.
#[derive(Debug)]
pub struct PersistWriter {
    snapshots: watch::Sender<Snapshot>,
    status: watch::Receiver<WriteStatus>,
}

impl PersistWriter {
    /// Start the writer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(backend: Arc<dyn PersistenceBackend>) -> Self {
        let (snapshots, snapshot_rx) = watch::channel(Snapshot::default());
        let (status_tx, status) = watch::channel(WriteStatus::default());

        tokio::spawn(write_loop(backend, snapshot_rx, status_tx));

        Self { snapshots, status }
    }

    /// Queue `records` as the newest state to persist.
    ///
    /// Returns the version number assigned to this snapshot.
    pub fn submit(&self, records: Vec<PersistedSession>) -> u64 {
        let mut version = 0;
        self.snapshots.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot
                .owned
                .extend(records.iter().map(|record| record.id.clone()));
            snapshot.records = records;
            version = snapshot.version;
        });
        version
    }

    /// Take ownership of stored records, so later writes may drop them.
    ///
    /// Does not trigger a write.
    pub fn claim<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.snapshots.send_if_modified(|snapshot| {
            snapshot.owned.extend(ids);
            false
        });
    }

    /// Wait until everything submitted so far has been written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] if the most recent write failed.
    pub async fn flush(&self) -> Result<()> {
        let target = self.snapshots.borrow().version;
        let mut status = self.status.clone();

        let reached = status
            .wait_for(|status| status.version >= target)
            .await
            .map_err(|_| Error::PersistenceFailed("session writer stopped".to_string()))?;

        match &reached.error {
            Some(reason) => Err(Error::PersistenceFailed(reason.clone())),
            None => Ok(()),
        }
    }
}

async fn write_loop(
    backend: Arc<dyn PersistenceBackend>,
    mut snapshots: watch::Receiver<Snapshot>,
    status: watch::Sender<WriteStatus>,
) {
    while snapshots.changed().await.is_ok() {
        let (version, records, owned) = {
            let snapshot = snapshots.borrow_and_update();
            (
                snapshot.version,
                snapshot.records.clone(),
                snapshot.owned.clone(),
            )
        };

        let backend = Arc::clone(&backend);
        let count = records.len();
        let outcome = tokio::task::spawn_blocking(move || backend.merge(&records, &owned)).await;

        let error = match outcome {
            Ok(Ok(())) => {
                tracing::debug!(version, count, "Persisted session records");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(version, error = %e, "Failed to persist session records");
                Some(e.to_string())
            }
            Err(e) => {
                tracing::warn!(version, error = %e, "Session write task failed");
                Some(e.to_string())
            }
        };

        status.send_replace(WriteStatus { version, error });
    }
}
