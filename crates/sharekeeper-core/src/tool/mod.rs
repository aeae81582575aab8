//! Locating and invoking the external `sendme` binary.
//!
//! The binary is looked up in a fixed, ordered list of candidate locations;
//! the first existing file wins. If none exists the bare executable name is
//! used and resolution is left to the `PATH` search of the OS.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::ToolConfig;
use crate::TOOL_NAME;

/// Default candidate locations, in search order.
///
/// A leading `~/` is expanded to the user's home directory.
pub const DEFAULT_SEARCH_PATHS: &[&str] = &[
    "./sendme",
    "~/sendme",
    "/usr/local/bin/sendme",
    "/opt/homebrew/bin/sendme",
];

/// Resolves which binary to launch.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    explicit: Option<PathBuf>,
    candidates: Vec<PathBuf>,
    fallback: String,
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new(
            DEFAULT_SEARCH_PATHS.iter().map(|p| expand_home(p)).collect(),
            TOOL_NAME,
        )
    }
}

impl ToolLocator {
    /// Create a locator from explicit candidates and a fallback name.
    #[must_use]
    pub fn new(candidates: Vec<PathBuf>, fallback: impl Into<String>) -> Self {
        Self {
            explicit: None,
            candidates,
            fallback: fallback.into(),
        }
    }

    /// Build a locator from the `[tool]` configuration section.
    #[must_use]
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            explicit: config.binary.as_deref().map(|p| expand_home(&p.to_string_lossy())),
            candidates: config.search_paths.iter().map(|p| expand_home(p)).collect(),
            fallback: config.fallback_name.clone(),
        }
    }

    /// Always use this binary, skipping the search.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.explicit = Some(binary.into());
        self
    }

    /// Candidate locations in search order.
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Resolve the binary to invoke.
    ///
    /// Relative paths are anchored to the current directory, since the tool
    /// itself runs from the home directory. A bare name is left for `PATH`.
    pub fn locate(&self) -> PathBuf {
        if let Some(binary) = &self.explicit {
            return if binary.components().count() > 1 {
                anchored(binary)
            } else {
                binary.clone()
            };
        }

        self.candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .map(|candidate| anchored(candidate))
            .unwrap_or_else(|| {
                tracing::debug!(
                    fallback = %self.fallback,
                    "No candidate binary found, relying on PATH lookup"
                );
                PathBuf::from(&self.fallback)
            })
    }
}

fn anchored(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Arguments for sharing `path`: `send <path>`.
pub fn send_args(path: &Path) -> Vec<OsString> {
    vec![OsString::from("send"), path.as_os_str().to_os_string()]
}

/// Command a user can run by hand when launching fails.
pub fn fallback_command(path: &Path) -> String {
    let escaped = path.display().to_string().replace('"', "\\\"");
    format!("{TOOL_NAME} send \"{escaped}\"")
}

/// Command the recipient runs to fetch the data.
pub fn receive_command(ticket: &str) -> String {
    format!("{TOOL_NAME} receive {ticket}")
}

/// The current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Expand a leading `~/` (or a lone `~`) to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };

    match (rest, home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_prefers_first_existing_candidate() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("missing-sendme");
        let second = dir.path().join("sendme-a");
        let third = dir.path().join("sendme-b");
        std::fs::write(&second, "").unwrap();
        std::fs::write(&third, "").unwrap();

        let locator = ToolLocator::new(vec![first, second.clone(), third], "sendme");
        assert_eq!(locator.locate(), second);
    }

    #[test]
    fn test_locate_falls_back_to_bare_name() {
        let dir = TempDir::new().unwrap();
        let locator = ToolLocator::new(vec![dir.path().join("nope")], "sendme");
        assert_eq!(locator.locate(), PathBuf::from("sendme"));
    }

    #[test]
    fn test_directories_are_not_binaries() {
        let dir = TempDir::new().unwrap();
        let locator = ToolLocator::new(vec![dir.path().to_path_buf()], "sendme");
        assert_eq!(locator.locate(), PathBuf::from("sendme"));
    }

    #[test]
    fn test_explicit_binary_skips_search() {
        let dir = TempDir::new().unwrap();
        let candidate = dir.path().join("sendme");
        std::fs::write(&candidate, "").unwrap();

        let locator =
            ToolLocator::new(vec![candidate], "sendme").with_binary("/custom/bin/sendme");
        assert_eq!(locator.locate(), PathBuf::from("/custom/bin/sendme"));
    }

    #[test]
    fn test_relative_candidate_is_made_absolute() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let dir_name = dir.path().file_name().unwrap();
        std::fs::write(dir.path().join("sendme"), "").unwrap();

        let relative = Path::new(".").join(dir_name).join("sendme");
        let located = ToolLocator::new(vec![relative.clone()], "sendme").locate();

        assert!(located.is_absolute());
        assert_eq!(
            std::fs::canonicalize(&located).unwrap(),
            std::fs::canonicalize(&relative).unwrap()
        );

        let explicit = ToolLocator::default().with_binary(&relative).locate();
        assert!(explicit.is_absolute());
        assert_eq!(ToolLocator::default().with_binary("sendme").locate(), PathBuf::from("sendme"));
    }

    #[test]
    fn test_default_search_order() {
        let locator = ToolLocator::default();
        assert_eq!(locator.candidates().len(), DEFAULT_SEARCH_PATHS.len());
        assert_eq!(locator.candidates()[0], PathBuf::from("./sendme"));
        assert_eq!(
            locator.candidates()[3],
            PathBuf::from("/opt/homebrew/bin/sendme")
        );
    }

    #[test]
    fn test_send_args() {
        let args = send_args(Path::new("/tmp/report.pdf"));
        assert_eq!(args, vec![OsString::from("send"), OsString::from("/tmp/report.pdf")]);
    }

    #[test]
    fn test_fallback_and_receive_commands() {
        assert_eq!(
            fallback_command(Path::new("/tmp/a b.txt")),
            "sendme send \"/tmp/a b.txt\""
        );
        assert_eq!(receive_command("blobXYZ"), "sendme receive blobXYZ");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("./rel"), PathBuf::from("./rel"));
        if let Some(home) = home_dir() {
            assert_eq!(expand_home("~/sendme"), home.join("sendme"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
