//! CLI command implementations.

pub mod completions;
pub mod config;
pub mod copy;
pub mod list;
pub mod share;
pub mod show;
pub mod stop;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use sharekeeper_core::config::Config;
use sharekeeper_core::{SessionManager, SessionId};

/// Load configuration, falling back to defaults on error.
pub fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring configuration at {}: {}", Config::config_path().display(), e);
            Config::default()
        }
    }
}

/// Build a session manager for `config` and reconcile saved sessions.
pub fn open_manager(config: &Config) -> anyhow::Result<SessionManager> {
    let manager = SessionManager::from_config(config);
    let report = manager.restore()?;
    if !report.discarded.is_empty() {
        tracing::info!(
            "Dropped {} share(s) whose sendme process is no longer running",
            report.discarded.len()
        );
    }
    Ok(manager)
}

/// Wait for pending session writes, warning instead of failing.
pub async fn finish(manager: &SessionManager) {
    if let Err(e) = manager.flush().await {
        tracing::warn!("Could not save sessions: {}", e);
    }
}

/// Resolve a full id or unique prefix, printing the core error on failure.
pub fn resolve(manager: &SessionManager, id: &str) -> anyhow::Result<SessionId> {
    manager.resolve_id(id).map_err(|e| {
        crate::ui::print_error("Lookup failed", &e);
        anyhow::anyhow!("no share matches '{id}'")
    })
}

/// Sharekeeper - keep sendme shares running and their tickets at hand
#[derive(Parser)]
#[command(name = "sharekeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Share files or directories
    Share(ShareArgs),

    /// List running shares
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one share in full
    Show(ShowArgs),

    /// Copy a share's ticket to the clipboard
    Copy(CopyArgs),

    /// Stop shares
    Stop(StopArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),

    /// Hold clipboard content (internal use only)
    #[command(hide = true)]
    InternalClipboardHold(InternalClipboardHoldArgs),
}

/// Arguments for share command
#[derive(Parser)]
pub struct ShareArgs {
    /// Files or directories to share
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Don't copy the ticket to the clipboard
    #[arg(long)]
    pub no_copy: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Print only the tickets
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for list command
#[derive(Parser)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for show command
#[derive(Parser)]
pub struct ShowArgs {
    /// Session id or unique prefix
    pub id: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for copy command
#[derive(Parser)]
pub struct CopyArgs {
    /// Session id or unique prefix
    pub id: String,
}

/// Arguments for stop command
#[derive(Parser)]
pub struct StopArgs {
    /// Session id or unique prefix
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub id: Option<String>,

    /// Stop every share
    #[arg(long)]
    pub all: bool,
}

/// Arguments for config command
#[derive(Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Reset configuration to defaults
    Reset,
}

/// Arguments for completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Arguments for internal clipboard hold command
#[derive(Parser)]
pub struct InternalClipboardHoldArgs {
    /// Seconds to keep serving the clipboard
    #[arg(long, default_value = "300")]
    pub timeout: u64,
}
