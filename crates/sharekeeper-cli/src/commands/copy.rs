//! Copy command implementation.

use anyhow::Result;

use super::CopyArgs;
use crate::clipboard;

/// Run the copy command.
pub async fn run(args: CopyArgs) -> Result<()> {
    let config = super::load_config();
    let manager = super::open_manager(&config)?;
    let id = super::resolve(&manager, &args.id)?;

    let ticket = manager
        .get(&id)
        .map(|info| info.ticket)
        .filter(|ticket| !ticket.is_empty());
    super::finish(&manager).await;

    let Some(ticket) = ticket else {
        anyhow::bail!("share {id} has no ticket yet");
    };

    clipboard::copy_text(&ticket)?;
    println!();
    println!("  Ticket copied to clipboard.");
    println!();
    Ok(())
}
