//! Sharekeeper CLI - share files through sendme tickets
//!
//! Every `share` starts a detached `sendme send` process and prints the
//! ticket a recipient needs. Shares keep running after the command exits
//! and can be listed and stopped later.
//!
//! ## Quick Start
//!
//! ```bash
//! # Share a file and copy its ticket
//! sharekeeper share ./report.pdf
//!
//! # See what is being shared
//! sharekeeper list
//!
//! # Stop a share by id prefix
//! sharekeeper stop 5f0c
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod clipboard;
mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Command::InternalClipboardHold(_)) {
        init_logging(cli.verbose);
    }

    match cli.command {
        Command::Share(args) => commands::share::run(args).await,
        Command::List(args) => commands::list::run(args).await,
        Command::Show(args) => commands::show::run(args).await,
        Command::Copy(args) => commands::copy::run(args).await,
        Command::Stop(args) => commands::stop::run(args).await,
        Command::Config(args) => commands::config::run(args.action),
        Command::Completions(args) => {
            commands::completions::run(args.shell);
            Ok(())
        }
        Command::InternalClipboardHold(args) => clipboard::run_hold(args.timeout),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "debug"
    } else {
        "warn,sharekeeper=info,sharekeeper_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
