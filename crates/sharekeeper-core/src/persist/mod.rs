//! Session record persistence.
//!
//! The registry is stored as a single JSON array, one record per active
//! session, rewritten in full after every change:
//!
//! ```json
//! [
//!   {
//!     "id": "5f0c...",
//!     "pid": 48213,
//!     "ticket": "blobacahs3i...",
//!     "path": "/Users/me/report.pdf",
//!     "name": "report.pdf",
//!     "createdAt": "2026-10-19T14:03:11.512Z"
//!   }
//! ]
//! ```
//!
//! Storage is pluggable through [`PersistenceBackend`]. Writes are performed
//! off the caller's path by [`PersistWriter`], which always writes the newest
//! snapshot so an older registry state can never overwrite a newer one.
//!
//! Several processes may share one file. Each write is a merge: records
//! whose id the writing process never loaded or created belong to another
//! process and are kept. [`JsonFileBackend`] holds an advisory lock on a
//! sibling `.lock` file for the read-merge-write.

mod writer;

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use writer::PersistWriter;

/// Stored form of an active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    /// Session id
    pub id: String,
    /// OS process id of the sharing process
    pub pid: u32,
    /// Receive ticket
    pub ticket: String,
    /// Shared file or folder
    pub path: PathBuf,
    /// Display name
    pub name: String,
    /// Creation time
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Durable storage for session records.
pub trait PersistenceBackend: Send + Sync {
    /// Read all stored records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] if storage exists but is unreadable.
    fn load(&self) -> Result<Vec<PersistedSession>>;

    /// Replace all stored records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] if the records cannot be written.
    fn save(&self, records: &[PersistedSession]) -> Result<()>;

    /// Replace the records in `owned`, keeping stored records with other ids.
    ///
    /// `owned` holds every id the caller has loaded or created. Unreadable
    /// storage is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] if the records cannot be written.
    fn merge(&self, records: &[PersistedSession], owned: &HashSet<String>) -> Result<()> {
        merge_with_stored(self, records, owned)
    }
}

fn merge_with_stored<B>(
    backend: &B,
    records: &[PersistedSession],
    owned: &HashSet<String>,
) -> Result<()>
where
    B: PersistenceBackend + ?Sized,
{
    let stored = backend.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to read stored session records, overwriting");
        Vec::new()
    });
    backend.save(&merge_records(records, stored, owned))
}

/// `records` followed by the stored records owned by someone else.
pub fn merge_records(
    records: &[PersistedSession],
    stored: Vec<PersistedSession>,
    owned: &HashSet<String>,
) -> Vec<PersistedSession> {
    let mut merged = records.to_vec();
    merged.extend(stored.into_iter().filter(|record| {
        !owned.contains(&record.id) && !records.iter().any(|r| r.id == record.id)
    }));
    merged
}

/// Records stored as a JSON array in one file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Store records at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the records file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn create_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::PersistenceFailed(format!(
                    "Failed to create session records directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Block until this process holds the records lock. Released on drop.
    fn lock(&self) -> Result<fs::File> {
        self.create_parent()?;
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .and_then(|file| file.lock_exclusive().map(|()| file))
            .map_err(|e| {
                Error::PersistenceFailed(format!(
                    "Failed to lock {}: {}",
                    lock_path.display(),
                    e
                ))
            })?;
        tracing::debug!(path = %lock_path.display(), "Acquired session records lock");
        Ok(lock_file)
    }
}

impl PersistenceBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<PersistedSession>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path).map_err(|e| {
            Error::PersistenceFailed(format!(
                "Failed to open session records at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::PersistenceFailed(format!(
                "Failed to parse session records at {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, records: &[PersistedSession]) -> Result<()> {
        self.create_parent()?;

        let temp = self.temp_path();
        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(fs::File::create(&temp)?);
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&temp, &self.path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&temp);
            Error::PersistenceFailed(format!(
                "Failed to write session records at {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn merge(&self, records: &[PersistedSession], owned: &HashSet<String>) -> Result<()> {
        let _lock = self.lock()?;
        merge_with_stored(self, records, owned)
    }
}

/// In-memory backend, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<Vec<PersistedSession>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryBackend {
    /// Create a backend pre-populated with `records`.
    pub fn with_records(records: Vec<PersistedSession>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Records currently stored.
    pub fn records(&self) -> Vec<PersistedSession> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent loads and saves fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<PersistedSession>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::PersistenceFailed("memory backend unavailable".to_string()));
        }
        Ok(self.records())
    }

    fn save(&self, records: &[PersistedSession]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::PersistenceFailed("memory backend unavailable".to_string()));
        }
        *self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fixed textual timestamp format: UTC with millisecond precision.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// `strftime` pattern of stored timestamps.
    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    /// Render a timestamp in the stored format.
    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.format(FORMAT).to_string()
    }

    /// Parse a stored timestamp; any RFC 3339 timestamp is also accepted.
    ///
    /// # Errors
    ///
    /// Returns the parse error if the text matches neither format.
    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, FORMAT)
            .map(|naive| naive.and_utc())
            .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
    }

    pub(crate) fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(dt))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}
