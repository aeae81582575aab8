//! Common test utilities for `Sharekeeper` integration tests.
//!
//! Launch scenarios run small `/bin/sh` scripts in place of `sendme`. They
//! are invoked the same way, as `<script> send <path>`.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{SubsecRound, Utc};

use sharekeeper_core::config::TimeoutPolicy;
use sharekeeper_core::launcher::{LaunchOptions, Launcher};
use sharekeeper_core::persist::{PersistedSession, PersistenceBackend};
use sharekeeper_core::process::{ProcessControl, SystemProcesses, Termination};
use sharekeeper_core::tool::ToolLocator;
use sharekeeper_core::{Result, SessionManager};

/// Ticket printed by [`PRINTS_TICKET`].
pub const TICKET: &str = "bafkr1234tickettoken";

/// Prints the receive line and keeps sharing.
pub const PRINTS_TICKET: &str = "echo \"imported $2\"\necho \"Run: sendme receive bafkr1234tickettoken\"\nexec sleep 30\n";

/// Prints nothing and keeps running.
pub const SILENT: &str = "exec sleep 30\n";

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Write an executable shell script standing in for the transfer tool.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = create_test_file(dir, name, format!("#!/bin/sh\n{body}").as_bytes());
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

/// Launcher running `tool` with a short poll interval.
pub fn launcher(
    tool: &Path,
    log_dir: &Path,
    timeout: Duration,
    on_timeout: TimeoutPolicy,
    control: Arc<dyn ProcessControl>,
) -> Launcher {
    Launcher::new(
        ToolLocator::new(Vec::new(), "sendme").with_binary(tool),
        LaunchOptions {
            ticket_timeout: timeout,
            poll_interval: Duration::from_millis(20),
            on_timeout,
            log_dir: log_dir.to_path_buf(),
        },
        control,
    )
}

/// Restored manager over `backend` that launches `tool`.
pub fn manager(
    backend: Arc<dyn PersistenceBackend>,
    tool: &Path,
    log_dir: &Path,
    timeout: Duration,
    on_timeout: TimeoutPolicy,
    control: Arc<dyn ProcessControl>,
) -> SessionManager {
    let launcher = launcher(tool, log_dir, timeout, on_timeout, Arc::clone(&control));
    let manager = SessionManager::new(backend, launcher, control);
    manager.restore().expect("restore");
    manager
}

/// A persisted record with a millisecond-precision timestamp.
pub fn record(id: &str, pid: u32) -> PersistedSession {
    PersistedSession {
        id: id.to_string(),
        pid,
        ticket: format!("blob-{id}"),
        path: PathBuf::from(format!("/srv/share/{id}.bin")),
        name: format!("{id}.bin"),
        created_at: Utc::now().trunc_subsecs(3),
    }
}

/// Process control with a configurable set of live pids.
#[derive(Debug, Default)]
pub struct FakeProcesses {
    alive: Mutex<HashSet<u32>>,
    terminated: Mutex<Vec<u32>>,
}

impl FakeProcesses {
    /// Consider `pids` alive.
    pub fn with_alive(pids: &[u32]) -> Self {
        Self {
            alive: Mutex::new(pids.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// Pids passed to `terminate`, in call order.
    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn terminate(&self, pid: u32) -> Result<Termination> {
        self.terminated.lock().unwrap().push(pid);
        if self.alive.lock().unwrap().remove(&pid) {
            Ok(Termination::Signalled)
        } else {
            Ok(Termination::AlreadyGone)
        }
    }
}

/// Real process control that remembers which pids it signalled.
#[derive(Debug, Default)]
pub struct RecordingProcesses {
    terminated: Mutex<Vec<u32>>,
}

impl RecordingProcesses {
    /// Pids passed to `terminate`, in call order.
    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ProcessControl for RecordingProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        SystemProcesses.is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> Result<Termination> {
        self.terminated.lock().unwrap().push(pid);
        SystemProcesses.terminate(pid)
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
