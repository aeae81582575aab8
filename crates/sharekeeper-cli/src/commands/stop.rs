//! Stop command implementation.

use anyhow::Result;

use sharekeeper_core::{Error, SessionInfo};

use super::StopArgs;
use crate::ui;

/// Run the stop command.
pub async fn run(args: StopArgs) -> Result<()> {
    let config = super::load_config();
    let manager = super::open_manager(&config)?;

    let results = if args.all {
        manager.stop_all()
    } else if let Some(prefix) = args.id.as_deref() {
        let id = super::resolve(&manager, prefix)?;
        vec![manager.stop(&id)]
    } else {
        Vec::new()
    };

    println!();
    if results.is_empty() {
        println!("  No active shares.");
    }

    let mut errors = 0;
    for result in &results {
        match result {
            Ok(info) => report_stopped(info),
            Err(e @ Error::StopFailed { .. }) => {
                errors += 1;
                ui::print_error("Share forgotten, but its process could not be stopped", e);
            }
            Err(e) => {
                errors += 1;
                ui::print_error("Stop failed", e);
            }
        }
    }
    println!();

    super::finish(&manager).await;

    if errors == 0 {
        Ok(())
    } else {
        anyhow::bail!("{} of {} share(s) could not be stopped cleanly", errors, results.len())
    }
}

fn report_stopped(info: &SessionInfo) {
    println!("  Stopped {} ({})", info.name, ui::short_id(&info.id));
}
