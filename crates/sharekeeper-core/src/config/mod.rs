//! Configuration management for Sharekeeper.
//!
//! This module handles loading, saving, and managing Sharekeeper configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/sharekeeper/config.toml` |
//! | macOS | `~/Library/Application Support/com.sharekeeper.Sharekeeper/config.toml` |
//! | Windows | `%APPDATA%\Sharekeeper\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use sharekeeper_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Ticket timeout: {:?}", config.tool.ticket_timeout);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Sharekeeper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool settings
    pub tool: ToolConfig,
    /// Storage settings
    pub storage: StorageConfig,
    /// UI settings
    pub ui: UiConfig,
}

/// External tool configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Explicit binary to run, skipping the search
    pub binary: Option<PathBuf>,
    /// Candidate binary locations, searched in order
    pub search_paths: Vec<String>,
    /// Executable name resolved through PATH when no candidate exists
    pub fallback_name: String,
    /// How long to wait for a ticket after launch
    #[serde(with = "humantime_serde")]
    pub ticket_timeout: Duration,
    /// Interval between reads of the captured output
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// What to do with the process when no ticket arrives in time
    pub on_timeout: TimeoutPolicy,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: None,
            search_paths: crate::tool::DEFAULT_SEARCH_PATHS
                .iter()
                .map(ToString::to_string)
                .collect(),
            fallback_name: crate::TOOL_NAME.to_string(),
            ticket_timeout: Duration::from_secs(crate::DEFAULT_TICKET_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
            on_timeout: TimeoutPolicy::default(),
        }
    }
}

/// Handling of a launch whose ticket did not arrive in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Keep the process and its pending session; a late ticket still
    /// activates the session
    #[default]
    LeaveRunning,
    /// Terminate the process and drop the pending session
    Kill,
}

/// Storage configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Session records file (defaults to the data directory)
    pub sessions_file: Option<PathBuf>,
    /// Directory for captured tool output (defaults to the data directory)
    pub log_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved path of the session records file.
    #[must_use]
    pub fn sessions_file_path(&self) -> PathBuf {
        self.sessions_file
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("sessions.json"))
    }

    /// Resolved directory for captured tool output.
    #[must_use]
    pub fn log_dir_path(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("logs"))
    }
}

/// UI configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Copy new tickets to the clipboard
    pub copy_ticket: bool,
    /// `strftime` format for start times
    pub date_format: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            copy_ticket: true,
            date_format: "%b %-d, %Y %-I:%M %p".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Directory for session records and captured output.
    #[must_use]
    pub fn data_dir() -> PathBuf {
        project_dirs().map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().to_path_buf())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "sharekeeper", "Sharekeeper")
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|millis| {
                millis
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map_err(serde::de::Error::custom)
                        .and_then(|m| {
                            m.checked_mul(60)
                                .map(Duration::from_secs)
                                .ok_or_else(|| serde::de::Error::custom("duration is too large"))
                        })
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}
