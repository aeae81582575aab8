//! Config command implementation.

use anyhow::Result;

use sharekeeper_core::config::Config;
use sharekeeper_core::tool::ToolLocator;

use super::ConfigAction;

/// Run the config command.
pub fn run(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show(),
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
            Ok(())
        }
        ConfigAction::Reset => reset(),
    }
}

fn show() -> Result<()> {
    let config = super::load_config();
    let binary = ToolLocator::from_config(&config.tool).locate();

    println!("# {}", Config::config_path().display());
    println!("# sendme binary:  {}", binary.display());
    println!("# sessions file:  {}", config.storage.sessions_file_path().display());
    println!("# output logs:    {}", config.storage.log_dir_path().display());
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn reset() -> Result<()> {
    let path = Config::config_path();
    Config::default().save_to(&path)?;
    println!();
    println!("  Configuration reset to defaults.");
    println!("  Saved to: {}", path.display());
    println!();
    Ok(())
}
