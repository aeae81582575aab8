//! Share command implementation.

use anyhow::Result;

use sharekeeper_core::{Error, SessionInfo, SessionState};

use super::ShareArgs;
use crate::{clipboard, ui};

/// Run the share command.
pub async fn run(args: ShareArgs) -> Result<()> {
    let config = super::load_config();
    let manager = super::open_manager(&config)?;
    let human = !args.json && !args.quiet;
    let copy = config.ui.copy_ticket && !args.no_copy;

    if human {
        println!();
        println!("Sharekeeper v{}", sharekeeper_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
    }

    let mut shared: Vec<SessionInfo> = Vec::new();
    let mut failed: Vec<(String, Error)> = Vec::new();

    for path in &args.paths {
        if human {
            println!("  Sharing {}...", path.display());
        }
        match manager.share(path).await {
            Ok(info) => shared.push(info),
            Err(e) => {
                if human {
                    ui::print_error("Share failed", &e);
                } else if args.quiet {
                    eprintln!("{}: {}", path.display(), e);
                }
                failed.push((path.display().to_string(), e));
            }
        }
    }

    // Pending sessions are not saved, so nothing would track them after exit.
    for pending in manager
        .list()
        .into_iter()
        .filter(|info| info.state == SessionState::Pending)
    {
        tracing::info!("Stopping {}: sendme never printed a ticket", pending.name);
        if let Err(e) = manager.stop(&pending.id) {
            tracing::warn!("Could not stop {}: {}", pending.name, e);
        }
    }

    let copied = match shared.last() {
        Some(info) if copy => match clipboard::copy_text(&info.ticket) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not copy ticket: {}", e);
                false
            }
        },
        _ => false,
    };

    if args.json {
        let output = serde_json::json!({
            "shared": shared,
            "failed": failed.iter().map(|(path, e)| serde_json::json!({
                "path": path,
                "code": e.code(),
                "error": e.to_string(),
            })).collect::<Vec<_>>(),
            "copied": copied,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.quiet {
        for info in &shared {
            println!("{}", info.ticket);
        }
    } else {
        for (index, info) in shared.iter().enumerate() {
            let last = index + 1 == shared.len();
            println!();
            if let Some(command) = info.receive_command() {
                ui::TicketBox::new(&info.name)
                    .with_copied(copied && last)
                    .display(&command);
            }
        }
        if !shared.is_empty() {
            println!();
            println!("  Shares keep running after this command exits.");
            println!("  Stop them with: sharekeeper stop <ID>");
            println!();
        }
    }

    super::finish(&manager).await;

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} share(s) failed", failed.len(), args.paths.len())
    }
}
