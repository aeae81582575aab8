//! Launching the transfer tool and waiting for its ticket.
//!
//! The tool is spawned detached with both output streams appended to a
//! per-session log file. A tail task reads that file as it grows and feeds
//! the [`TicketScanner`]; a timer task fires after the ticket timeout. Both
//! race to settle one result slot and the first to settle wins.
//!
//! When the ticket arrives it is written to the session through the store,
//! which promotes the session to active and persists it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{Config, TimeoutPolicy};
use crate::error::{Error, Result};
use crate::process::{self, ProcessControl, ProcessStatus, SupervisedProcess};
use crate::store::SessionStore;
use crate::ticket::TicketScanner;
use crate::tool::{self, ToolLocator};

const READ_CHUNK_SIZE: usize = 4096;

/// Launch behaviour.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// How long to wait for the ticket
    pub ticket_timeout: Duration,
    /// Delay between reads when no new output is available
    pub poll_interval: Duration,
    /// What happens to the process when the ticket does not arrive in time
    pub on_timeout: TimeoutPolicy,
    /// Directory holding per-session output logs
    pub log_dir: PathBuf,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl LaunchOptions {
    /// Options from the `[tool]` and `[storage]` configuration sections.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ticket_timeout: config.tool.ticket_timeout,
            poll_interval: config.tool.poll_interval,
            on_timeout: config.tool.on_timeout,
            log_dir: config.storage.log_dir_path(),
        }
    }
}

/// Spawns the tool for a session and scrapes its ticket.
pub struct Launcher {
    locator: ToolLocator,
    options: LaunchOptions,
    control: Arc<dyn ProcessControl>,
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("locator", &self.locator)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Launcher {
    /// Create a launcher.
    pub fn new(
        locator: ToolLocator,
        options: LaunchOptions,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            locator,
            options,
            control,
        }
    }

    /// Create a launcher from configuration.
    pub fn from_config(config: &Config, control: Arc<dyn ProcessControl>) -> Self {
        Self::new(
            ToolLocator::from_config(&config.tool),
            LaunchOptions::from_config(config),
            control,
        )
    }

    /// Launch behaviour in effect.
    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// Output log of a session.
    pub fn output_log_path(&self, id: &str) -> PathBuf {
        self.options.log_dir.join(format!("{id}.log"))
    }

    /// Delete a session's output log, ignoring a missing file.
    pub fn discard_output(&self, id: &str) {
        let path = self.output_log_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed output log"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Failed to remove output log");
            }
        }
    }

    /// Start sharing `path` for the pending session `id` and wait for the
    /// ticket.
    ///
    /// The session must already be in `store`. On success it is active and
    /// carries the returned ticket.
    ///
    /// # Errors
    ///
    /// - [`Error::SpawnFailed`] if the tool cannot be started; the session is
    ///   removed.
    /// - [`Error::ExtractionTimeout`] if no ticket arrives in time. Under
    ///   [`TimeoutPolicy::LeaveRunning`] the session stays pending and is
    ///   still promoted if a ticket shows up later; under
    ///   [`TimeoutPolicy::Kill`] the process is terminated and the session
    ///   removed.
    /// - [`Error::ToolExited`] if the tool exits without printing a ticket;
    ///   the session is removed.
    pub async fn launch(&self, store: &Arc<SessionStore>, id: &str, path: &Path) -> Result<String> {
        let binary = self.locator.locate();
        let log = self.output_log_path(id);

        let spawned = process::spawn_detached(&binary, &tool::send_args(path), &log).and_then(
            |child| {
                child.id().map(|pid| (pid, child)).ok_or_else(|| {
                    std::io::Error::other("process exited before its pid could be read")
                })
            },
        );

        let (pid, child) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::warn!(
                    binary = %binary.display(),
                    path = %path.display(),
                    error = %e,
                    "Failed to start sendme"
                );
                self.abandon(store, id);
                return Err(Error::SpawnFailed {
                    binary: binary.display().to_string(),
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        tracing::info!(
            id,
            pid,
            binary = %binary.display(),
            path = %path.display(),
            "Started sendme"
        );

        if let Err(e) = store.attach_process(id, SupervisedProcess::new(pid, child, log.clone())) {
            tracing::warn!(id, pid, error = %e, "Session vanished during launch");
            self.terminate(pid);
            self.discard_output(id);
            return Err(e);
        }

        let (slot, outcome) = TicketSlot::new();

        let tail = tokio::spawn(tail_output(TailContext {
            store: Arc::clone(store),
            id: id.to_string(),
            log,
            binary: binary.display().to_string(),
            poll_interval: self.options.poll_interval,
            slot: slot.clone(),
        }));

        let timeout = self.options.ticket_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            slot.settle(Err(Error::ExtractionTimeout(timeout)));
        });

        let result = outcome
            .await
            .unwrap_or_else(|_| Err(Error::Internal("ticket slot closed".to_string())));
        timer.abort();

        match result {
            Err(Error::ExtractionTimeout(timeout)) => {
                self.resolve_timeout(store, id, pid, timeout, &tail)
            }
            other => other,
        }
    }

    /// Apply the timeout policy once the timer has won the race.
    ///
    /// The ticket may still have been recorded just after the timer fired;
    /// such a session is kept and its ticket returned.
    fn resolve_timeout(
        &self,
        store: &SessionStore,
        id: &str,
        pid: u32,
        timeout: Duration,
        tail: &JoinHandle<()>,
    ) -> Result<String> {
        match self.options.on_timeout {
            TimeoutPolicy::LeaveRunning => {
                if let Some(ticket) = recorded_ticket(store, id) {
                    tracing::debug!(id, pid, "Ticket recorded as the timer fired");
                    return Ok(ticket);
                }
                tracing::info!(id, pid, "No ticket yet, leaving sendme running");
            }
            TimeoutPolicy::Kill => match store.remove_pending(id) {
                Ok(Some(_)) => {
                    tracing::info!(id, pid, "No ticket in time, stopping sendme");
                    tail.abort();
                    self.terminate(pid);
                    self.discard_output(id);
                }
                Ok(None) => {
                    if let Some(ticket) = recorded_ticket(store, id) {
                        tracing::debug!(id, pid, "Ticket recorded as the timer fired");
                        return Ok(ticket);
                    }
                }
                Err(e) => {
                    tracing::warn!(id, error = %e, "Failed to remove pending session");
                }
            },
        }

        Err(Error::ExtractionTimeout(timeout))
    }

    fn abandon(&self, store: &SessionStore, id: &str) {
        if let Err(e) = store.remove(id) {
            tracing::warn!(id, error = %e, "Failed to remove pending session");
        }
        self.discard_output(id);
    }

    fn terminate(&self, pid: u32) {
        if let Err(e) = self.control.terminate(pid) {
            tracing::warn!(pid, error = %e, "Failed to stop sendme");
        }
    }
}

fn recorded_ticket(store: &SessionStore, id: &str) -> Option<String> {
    store
        .get(id)
        .map(|info| info.ticket)
        .filter(|ticket| !ticket.is_empty())
}

/// One-shot result shared by the tail and timer tasks. Only the first
/// settlement is delivered.
#[derive(Clone)]
struct TicketSlot {
    sender: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

impl TicketSlot {
    fn new() -> (Self, oneshot::Receiver<Result<String>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver `outcome` unless the slot is already settled.
    fn settle(&self, outcome: Result<String>) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

struct TailContext {
    store: Arc<SessionStore>,
    id: String,
    log: PathBuf,
    binary: String,
    poll_interval: Duration,
    slot: TicketSlot,
}

impl TailContext {
    fn promote(&self, ticket: &str) {
        match self.store.assign_ticket(&self.id, ticket) {
            Ok(()) => {
                if self.slot.settle(Ok(ticket.to_string())) {
                    tracing::info!(id = %self.id, "Ticket received");
                } else {
                    tracing::info!(id = %self.id, "Late ticket received, session activated");
                }
            }
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "Failed to record ticket");
                self.slot.settle(Err(e));
            }
        }
    }

    fn fail(&self, status: String, last_output: Option<String>) {
        tracing::warn!(
            id = %self.id,
            status = %status,
            last_output = last_output.as_deref().unwrap_or(""),
            "sendme exited without a ticket"
        );

        if let Err(e) = self.store.remove(&self.id) {
            tracing::warn!(id = %self.id, error = %e, "Failed to remove pending session");
        }
        let _ = std::fs::remove_file(&self.log);

        self.slot.settle(Err(Error::ToolExited {
            binary: self.binary.clone(),
            status,
            last_output,
        }));
    }
}

async fn tail_output(ctx: TailContext) {
    let mut file = match tokio::fs::File::open(&ctx.log).await {
        Ok(file) => file,
        Err(e) => {
            ctx.slot.settle(Err(e.into()));
            return;
        }
    };

    let mut scanner = TicketScanner::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        match file.read(&mut chunk).await {
            Ok(0) => {}
            Ok(n) => {
                tracing::debug!(id = %ctx.id, bytes = n, "Read sendme output");
                if let Some(ticket) = scanner.push(&chunk[..n]) {
                    ctx.promote(ticket);
                    return;
                }
                continue;
            }
            Err(e) => {
                tracing::debug!(id = %ctx.id, error = %e, "Failed to read sendme output");
            }
        }

        match ctx.store.poll_process(&ctx.id) {
            None => {
                tracing::debug!(id = %ctx.id, "Session gone, no longer watching output");
                ctx.slot.settle(Err(Error::SessionNotFound(ctx.id.clone())));
                return;
            }
            Some(ProcessStatus::Exited(status)) => {
                while let Ok(n) = file.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    scanner.push(&chunk[..n]);
                }
                match scanner.finish().map(ToString::to_string) {
                    Some(ticket) => ctx.promote(&ticket),
                    None => ctx.fail(status, scanner.last_line()),
                }
                return;
            }
            Some(ProcessStatus::Running) => {}
        }

        tokio::time::sleep(ctx.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryBackend;
    use crate::process::Termination;
    use crate::session::Session;

    #[derive(Debug, Default)]
    struct Terminations(Mutex<Vec<u32>>);

    impl ProcessControl for Terminations {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }

        fn terminate(&self, pid: u32) -> Result<Termination> {
            self.0.lock().unwrap().push(pid);
            Ok(Termination::Signalled)
        }
    }

    fn timeout_fixture(policy: TimeoutPolicy) -> (SessionStore, Launcher, Arc<Terminations>) {
        let control = Arc::new(Terminations::default());
        let store = SessionStore::new(Arc::new(MemoryBackend::default()));
        store.restore(control.as_ref()).unwrap();
        let launcher = Launcher::new(
            ToolLocator::default(),
            LaunchOptions {
                on_timeout: policy,
                log_dir: std::env::temp_dir().join("sharekeeper-launcher-tests"),
                ..LaunchOptions::default()
            },
            control.clone(),
        );
        (store, launcher, control)
    }

    #[tokio::test]
    async fn test_kill_spares_session_with_recorded_ticket() {
        let (store, launcher, control) = timeout_fixture(TimeoutPolicy::Kill);
        store.add(Session::new("s", "/tmp/s")).unwrap();
        store.assign_ticket("s", "T").unwrap();
        let tail = tokio::spawn(async {});

        let result = launcher.resolve_timeout(&store, "s", 4242, Duration::ZERO, &tail);

        assert_eq!(result.unwrap(), "T");
        assert!(store.contains("s"));
        assert!(control.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kill_removes_pending_session() {
        let (store, launcher, control) = timeout_fixture(TimeoutPolicy::Kill);
        store.add(Session::new("p", "/tmp/p")).unwrap();
        let tail = tokio::spawn(async {});

        let result = launcher.resolve_timeout(&store, "p", 4242, Duration::ZERO, &tail);

        assert!(matches!(result, Err(Error::ExtractionTimeout(_))));
        assert!(!store.contains("p"));
        assert_eq!(*control.0.lock().unwrap(), vec![4242]);
    }

    #[tokio::test]
    async fn test_leave_running_returns_recorded_ticket() {
        let (store, launcher, control) = timeout_fixture(TimeoutPolicy::LeaveRunning);
        store.add(Session::new("s", "/tmp/s")).unwrap();
        store.assign_ticket("s", "T").unwrap();
        store.add(Session::new("p", "/tmp/p")).unwrap();
        let tail = tokio::spawn(async {});

        assert_eq!(
            launcher
                .resolve_timeout(&store, "s", 1, Duration::ZERO, &tail)
                .unwrap(),
            "T"
        );
        assert!(matches!(
            launcher.resolve_timeout(&store, "p", 2, Duration::ZERO, &tail),
            Err(Error::ExtractionTimeout(_))
        ));
        assert!(store.contains("p"));
        assert!(control.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_settlement_wins() {
        let (slot, rx) = TicketSlot::new();
        let other = slot.clone();

        assert!(!slot.is_settled());
        assert!(slot.settle(Ok("T1".to_string())));
        assert!(!other.settle(Err(Error::ExtractionTimeout(Duration::from_secs(5)))));
        assert!(other.is_settled());

        assert_eq!(rx.await.unwrap().unwrap(), "T1");
    }

    #[tokio::test]
    async fn test_timeout_settlement() {
        let (slot, rx) = TicketSlot::new();
        assert!(slot.settle(Err(Error::ExtractionTimeout(Duration::from_millis(10)))));
        assert!(!slot.settle(Ok("late".to_string())));

        assert!(matches!(
            rx.await.unwrap(),
            Err(Error::ExtractionTimeout(_))
        ));
    }

    #[test]
    fn test_output_log_path() {
        let options = LaunchOptions {
            log_dir: PathBuf::from("/var/tmp/logs"),
            ..LaunchOptions::default()
        };
        let launcher = Launcher::new(
            ToolLocator::default(),
            options,
            Arc::new(process::SystemProcesses),
        );
        assert_eq!(
            launcher.output_log_path("abc"),
            PathBuf::from("/var/tmp/logs/abc.log")
        );
    }

    #[test]
    fn test_options_follow_config() {
        let mut config = Config::default();
        config.tool.ticket_timeout = Duration::from_millis(750);
        config.tool.on_timeout = TimeoutPolicy::Kill;
        config.storage.log_dir = Some(PathBuf::from("/tmp/sk-logs"));

        let options = LaunchOptions::from_config(&config);
        assert_eq!(options.ticket_timeout, Duration::from_millis(750));
        assert_eq!(options.on_timeout, TimeoutPolicy::Kill);
        assert_eq!(options.log_dir, PathBuf::from("/tmp/sk-logs"));
    }
}
