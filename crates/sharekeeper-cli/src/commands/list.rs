//! List command implementation.

use anyhow::Result;

use super::ListArgs;
use crate::ui;

const TICKET_WIDTH: usize = 24;
const NAME_WIDTH: usize = 24;

/// Run the list command.
pub async fn run(args: ListArgs) -> Result<()> {
    let config = super::load_config();
    let manager = super::open_manager(&config)?;
    let sessions = manager.list();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        super::finish(&manager).await;
        return Ok(());
    }

    println!();
    if sessions.is_empty() {
        println!("  No active shares.");
        println!();
        println!("  Start one with: sharekeeper share <PATH>");
        println!();
        super::finish(&manager).await;
        return Ok(());
    }

    println!(
        "  {:<8}  {:<name$}  {:<9}  {:<ticket$}  STARTED",
        "ID",
        "NAME",
        "STATUS",
        "TICKET",
        name = NAME_WIDTH,
        ticket = TICKET_WIDTH,
    );
    for info in &sessions {
        let ticket = if info.ticket.is_empty() {
            "-".to_string()
        } else {
            ui::truncate(&info.ticket, TICKET_WIDTH)
        };
        println!(
            "  {:<8}  {:<name$}  {:<9}  {:<ticket$}  {}",
            ui::short_id(&info.id),
            ui::truncate(&info.name, NAME_WIDTH),
            ui::status_label(info.state),
            ticket,
            ui::format_started(info.created_at, &config.ui.date_format),
            name = NAME_WIDTH,
            ticket = TICKET_WIDTH,
        );
    }
    println!();
    println!("  {} share(s). Use 'sharekeeper show <ID>' for the full ticket.", sessions.len());
    println!();

    super::finish(&manager).await;
    Ok(())
}
