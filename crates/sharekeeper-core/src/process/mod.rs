//! OS process handling for share sessions.
//!
//! A session's relation to its `sendme` process is one of three cases,
//! captured by [`ProcessHandle`]:
//!
//! - no process yet (launch requested)
//! - a process spawned and supervised by this run, with its captured output
//! - a process inherited from an earlier run, known only by its pid
//!
//! Liveness probes and termination go through the [`ProcessControl`] trait so
//! recovery and stop logic can be exercised without real processes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{Error, Result};

/// How this run relates to a session's OS process.
#[derive(Debug)]
pub enum ProcessHandle {
    /// Launch requested, nothing spawned yet.
    NotSpawned,
    /// Spawned by this run.
    Supervised(SupervisedProcess),
    /// Inherited from an earlier run; only the pid is known.
    Recovered {
        /// OS process id
        pid: u32,
    },
}

impl ProcessHandle {
    /// OS process id, if a process exists.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::NotSpawned => None,
            Self::Supervised(process) => Some(process.pid()),
            Self::Recovered { pid } => Some(*pid),
        }
    }

    /// Whether the process was inherited from an earlier run.
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }

    /// The supervised process, if this run spawned it.
    pub fn supervised(&self) -> Option<&SupervisedProcess> {
        match self {
            Self::Supervised(process) => Some(process),
            _ => None,
        }
    }

    pub(crate) fn supervised_mut(&mut self) -> Option<&mut SupervisedProcess> {
        match self {
            Self::Supervised(process) => Some(process),
            _ => None,
        }
    }
}

/// A detached process spawned by this run.
///
/// Dropping it does not kill the process.
#[derive(Debug)]
pub struct SupervisedProcess {
    pid: u32,
    child: Child,
    output_log: PathBuf,
}

impl SupervisedProcess {
    /// Wrap a freshly spawned child.
    pub fn new(pid: u32, child: Child, output_log: PathBuf) -> Self {
        Self {
            pid,
            child,
            output_log,
        }
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// File receiving the merged stdout/stderr of the process.
    pub fn output_log(&self) -> &Path {
        &self.output_log
    }

    /// Read everything the process has printed so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the output file cannot be read.
    pub fn read_output(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.output_log)?)
    }

    /// Check whether the process has exited, reaping it if so.
    pub fn poll_exit(&mut self) -> ProcessStatus {
        match self.child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            Ok(Some(status)) => ProcessStatus::Exited(status.to_string()),
            Err(e) => {
                tracing::debug!(pid = self.pid, error = %e, "Failed to poll process status");
                ProcessStatus::Running
            }
        }
    }
}

/// Observed state of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Still running
    Running,
    /// Exited with the described status
    Exited(String),
}

/// Outcome of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The signal was delivered
    Signalled,
    /// No such process; it is already gone
    AlreadyGone,
}

/// Liveness probes and termination by pid.
pub trait ProcessControl: Send + Sync {
    /// Whether a process with this pid currently exists.
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to terminate. Does not wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StopFailed`] if the OS refuses the signal.
    fn terminate(&self, pid: u32) -> Result<Termination>;
}

/// [`ProcessControl`] backed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

#[cfg(unix)]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        let Some(pid) = to_unix_pid(pid) else {
            return false;
        };
        match kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32) -> Result<Termination> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};

        let Some(unix_pid) = to_unix_pid(pid) else {
            return Ok(Termination::AlreadyGone);
        };
        match kill(unix_pid, Signal::SIGTERM) {
            Ok(()) => Ok(Termination::Signalled),
            Err(Errno::ESRCH) => Ok(Termination::AlreadyGone),
            Err(e) => Err(Error::StopFailed {
                pid,
                reason: e.desc().to_string(),
            }),
        }
    }
}

/// Pid 0 and values outside `i32` would address process groups, never a
/// single process.
#[cfg(unix)]
fn to_unix_pid(pid: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|&raw| raw > 0)
        .map(nix::unistd::Pid::from_raw)
}

#[cfg(windows)]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH"])
            .output()
            .map(|output| {
                let stdout = String::from_utf8_lossy(&output.stdout);
                stdout.contains(&pid.to_string())
            })
            .unwrap_or(false)
    }

    fn terminate(&self, pid: u32) -> Result<Termination> {
        if !self.is_alive(pid) {
            return Ok(Termination::AlreadyGone);
        }
        let output = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .output()?;
        if output.status.success() {
            Ok(Termination::Signalled)
        } else {
            Err(Error::StopFailed {
                pid,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(not(any(unix, windows)))]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }

    fn terminate(&self, pid: u32) -> Result<Termination> {
        Err(Error::StopFailed {
            pid,
            reason: "signals are not supported on this platform".to_string(),
        })
    }
}

/// Spawn `program` detached from the host, merging stdout and stderr into
/// `output_log`.
///
/// Stdin is closed and the working directory is the user's home. On Unix
/// the child gets its own process group so terminal signals aimed at the
/// host do not reach it.
///
/// # Errors
///
/// Returns an I/O error if the output file cannot be created or the OS
/// refuses to start the program.
pub fn spawn_detached(program: &Path, args: &[OsString], output_log: &Path) -> std::io::Result<Child> {
    if let Some(parent) = output_log.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let stdout = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_log)?;
    let stderr = stdout.try_clone()?;

    let mut std_cmd = std::process::Command::new(program);
    std_cmd
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    if let Some(home) = crate::tool::home_dir().filter(|home| home.is_dir()) {
        std_cmd.current_dir(&home).env("HOME", &home);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        std_cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(false);
    cmd.spawn()
}
