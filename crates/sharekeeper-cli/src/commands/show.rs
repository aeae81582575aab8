//! Show command implementation.

use anyhow::Result;

use super::ShowArgs;
use crate::ui;

/// Run the show command.
pub async fn run(args: ShowArgs) -> Result<()> {
    let config = super::load_config();
    let manager = super::open_manager(&config)?;
    let id = super::resolve(&manager, &args.id)?;

    let Some(info) = manager.get(&id) else {
        anyhow::bail!("share {id} stopped while looking it up");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!();
        ui::print_details(&info, &config.ui.date_format);
        println!();
    }

    super::finish(&manager).await;
    Ok(())
}
