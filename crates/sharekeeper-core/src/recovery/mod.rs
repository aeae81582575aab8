//! Startup reconciliation of persisted records against live processes.
//!
//! A record whose process is still running becomes a recovered session that
//! reuses the stored ticket. A record whose process is gone is dropped: the
//! share ended while the host was not running.

use std::collections::HashSet;

use crate::persist::PersistedSession;
use crate::process::ProcessControl;
use crate::session::Session;

/// Outcome of reconciling persisted records.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Sessions whose process is alive, in record order
    pub live: Vec<Session>,
    /// Records whose process is gone
    pub discarded: Vec<PersistedSession>,
}

/// Split `records` into recovered sessions and stale records.
///
/// A record repeating an id already seen is ignored.
pub fn reconcile(records: Vec<PersistedSession>, control: &dyn ProcessControl) -> Reconciled {
    let mut seen = HashSet::new();
    let mut result = Reconciled::default();

    for record in records {
        if !seen.insert(record.id.clone()) {
            tracing::debug!(id = %record.id, "Skipping duplicate session record");
            continue;
        }

        if record.pid != 0 && control.is_alive(record.pid) {
            tracing::debug!(id = %record.id, pid = record.pid, "Recovered session");
            result.live.push(Session::recovered(record));
        } else {
            tracing::debug!(id = %record.id, pid = record.pid, "Discarding stale session");
            result.discarded.push(record);
        }
    }

    if !result.live.is_empty() || !result.discarded.is_empty() {
        tracing::info!(
            recovered = result.live.len(),
            discarded = result.discarded.len(),
            "Reconciled persisted sessions"
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::process::Termination;
    use crate::session::SessionState;
    use chrono::Utc;
    use std::path::PathBuf;

    struct AliveSet(Vec<u32>);

    impl ProcessControl for AliveSet {
        fn is_alive(&self, pid: u32) -> bool {
            self.0.contains(&pid)
        }

        fn terminate(&self, _pid: u32) -> Result<Termination> {
            Ok(Termination::AlreadyGone)
        }
    }

    fn record(id: &str, pid: u32) -> PersistedSession {
        PersistedSession {
            id: id.to_string(),
            pid,
            ticket: format!("ticket-{id}"),
            path: PathBuf::from(format!("/data/{id}")),
            name: id.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_dead_pid_is_discarded() {
        let result = reconcile(vec![record("a", 10)], &AliveSet(vec![]));
        assert!(result.live.is_empty());
        assert_eq!(result.discarded.len(), 1);
    }

    #[test]
    fn test_live_pid_is_recovered_with_ticket() {
        let result = reconcile(vec![record("a", 10)], &AliveSet(vec![10]));
        assert_eq!(result.live.len(), 1);

        let session = &result.live[0];
        assert_eq!(session.state(), SessionState::Recovered);
        assert_eq!(session.ticket(), Some("ticket-a"));
        assert!(session.process().supervised().is_none());
    }

    #[test]
    fn test_mixed_records_keep_order() {
        let records = vec![record("a", 1), record("b", 2), record("c", 3), record("d", 4)];
        let result = reconcile(records, &AliveSet(vec![1, 3, 4]));

        let ids: Vec<_> = result.live.iter().map(Session::id).collect();
        assert_eq!(ids, ["a", "c", "d"]);
        assert_eq!(result.discarded[0].id, "b");
    }

    #[test]
    fn test_pid_zero_is_never_alive() {
        let result = reconcile(vec![record("a", 0)], &AliveSet(vec![0]));
        assert!(result.live.is_empty());
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let mut second = record("a", 2);
        second.ticket = "other".to_string();
        let result = reconcile(vec![record("a", 1), second], &AliveSet(vec![1, 2]));

        assert_eq!(result.live.len(), 1);
        assert_eq!(result.live[0].ticket(), Some("ticket-a"));
        assert!(result.discarded.is_empty());
    }
}
