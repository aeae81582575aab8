//! # Sharekeeper Core Library
//!
//! `sharekeeper-core` launches the `sendme` transfer tool as a detached
//! process, scrapes the receive ticket from its output, and keeps a registry
//! of running shares that survives restarts of the host application.
//!
//! ## Features
//!
//! - **Detached sessions**: the tool keeps sharing after the host exits
//! - **Ticket scraping**: the receive ticket is pulled from the merged output
//! - **Restart recovery**: persisted sessions are re-adopted if their process is alive
//! - **Change notifications**: observers see every registry mutation
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`launcher`] - Spawning the tool and waiting for its ticket
//! - [`manager`] - High-level share / stop / list operations
//! - [`persist`] - Session record storage
//! - [`process`] - Process handles, liveness probes and signals
//! - [`recovery`] - Reconciling persisted records against live processes
//! - [`session`] - Session data model
//! - [`store`] - In-memory session registry and change notifications
//! - [`ticket`] - Ticket extraction from tool output
//! - [`tool`] - Locating and invoking the external binary
//!
//! ## Example
//!
//! ```rust,ignore
//! use sharekeeper_core::{config::Config, SessionManager};
//!
//! let manager = SessionManager::from_config(&Config::load()?);
//! manager.restore()?;
//!
//! let session = manager.share("/tmp/report.pdf").await?;
//! println!("sendme receive {}", session.ticket);
//! manager.flush().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod launcher;
pub mod manager;
pub mod persist;
pub mod process;
pub mod recovery;
pub mod session;
pub mod store;
pub mod ticket;
pub mod tool;

pub use error::{Error, Result};
pub use manager::SessionManager;
pub use session::{Session, SessionId, SessionInfo, SessionState};
pub use store::{SessionStore, Subscription};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the external transfer tool
pub const TOOL_NAME: &str = "sendme";

/// Default time to wait for a ticket after launch, in seconds
pub const DEFAULT_TICKET_TIMEOUT_SECS: u64 = 5;

/// Default interval between reads of the tool's captured output, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
