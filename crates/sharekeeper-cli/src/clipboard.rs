//! Ticket clipboard support.
//!
//! On Linux the clipboard is owned by a process, so a ticket copied from a
//! short-lived command would vanish when it exits. There the text is handed
//! to a detached `internal-clipboard-hold` child that keeps serving it until
//! another application takes the clipboard or the hold times out.

use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

/// How long a holder keeps serving a copied ticket.
pub const HOLD_SECS: u64 = 300;

/// Put `text` on the system clipboard.
#[cfg(target_os = "linux")]
pub fn copy_text(text: &str) -> Result<()> {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let exe = std::env::current_exe()
        .map_err(|e| anyhow::anyhow!("cannot find current executable for holder: {}", e))?;

    let mut cmd = Command::new(&exe);
    cmd.arg("internal-clipboard-hold")
        .arg("--timeout")
        .arg(HOLD_SECS.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    for var in ["WAYLAND_DISPLAY", "DISPLAY", "XDG_RUNTIME_DIR"] {
        if let Ok(val) = std::env::var(var) {
            cmd.env(var, val);
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| anyhow::anyhow!("failed to spawn clipboard holder: {}", e))?;
    tracing::debug!("Clipboard holder spawned with PID {}", child.id());

    let Some(mut stdin) = child.stdin.take() else {
        bail!("failed to get stdin pipe for clipboard holder");
    };
    stdin
        .write_all(text.as_bytes())
        .map_err(|e| anyhow::anyhow!("failed to write ticket to holder: {}", e))?;
    Ok(())
}

/// Put `text` on the system clipboard.
#[cfg(not(target_os = "linux"))]
pub fn copy_text(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| anyhow::anyhow!("Failed to access clipboard: {}", e))?;
    clipboard
        .set_text(text)
        .map_err(|e| anyhow::anyhow!("Failed to set clipboard text: {}", e))?;
    Ok(())
}

/// Longest hold a caller may ask for.
const MAX_HOLD_SECS: u64 = 24 * 60 * 60;

/// When a holder started now stops serving.
fn hold_deadline(timeout_secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(timeout_secs.min(MAX_HOLD_SECS))
}

/// Serve text read from stdin until the clipboard is taken or `timeout_secs`
/// pass.
pub fn run_hold(timeout_secs: u64) -> Result<()> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;

    if text.is_empty() {
        bail!("No data received on stdin");
    }

    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| anyhow::anyhow!("Failed to access clipboard in holder process: {}", e))?;

    #[cfg(target_os = "linux")]
    {
        use arboard::SetExtLinux;

        clipboard
            .set()
            .wait_until(hold_deadline(timeout_secs))
            .text(text)
            .map_err(|e| anyhow::anyhow!("Failed to set text in holder: {}", e))?;
    }

    #[cfg(not(target_os = "linux"))]
    {
        clipboard
            .set_text(text)
            .map_err(|e| anyhow::anyhow!("Failed to set text in holder: {}", e))?;
        let deadline = hold_deadline(timeout_secs);
        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_lasts_the_whole_timeout() {
        let before = Instant::now();
        let deadline = hold_deadline(HOLD_SECS);
        assert!(deadline >= before + Duration::from_secs(HOLD_SECS));
        assert!(deadline <= Instant::now() + Duration::from_secs(HOLD_SECS));
    }

    #[test]
    fn test_oversized_timeout_is_capped() {
        let deadline = hold_deadline(u64::MAX);
        assert!(deadline <= Instant::now() + Duration::from_secs(MAX_HOLD_SECS));
    }

    #[test]
    fn test_zero_timeout_ends_at_once() {
        let deadline = hold_deadline(0);
        assert!(deadline.saturating_duration_since(Instant::now()) == Duration::ZERO);
    }
}
