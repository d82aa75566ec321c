//! Record store: one PID file per supervised port
//!
//! A record lives at `<temp-dir>/context7-mcp-<port>.pid` and contains the
//! decimal process identifier of the helper last started for that port. The
//! file is advisory: it says which process to probe, it does not lock the
//! port. Writes are crash-safe via write-to-temp + rename so a reader never
//! sees a half-written identifier.

use crate::{CoreError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name prefix shared by every record
pub const RECORD_PREFIX: &str = "context7-mcp-";

/// Environment variables consulted, in order, for the temporary directory
pub const TEMP_DIR_VARS: [&str; 3] = ["TMPDIR", "TMP", "TEMP"];

/// Fallback root when none of [`TEMP_DIR_VARS`] is set
pub const FALLBACK_TEMP_DIR: &str = "/tmp";

/// Port and process identifier of a supervised helper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisedProcess {
    /// Port the helper was started on
    pub port: u16,
    /// Process identifier captured at spawn time
    pub pid: u32,
}

/// What a record file held when it was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState {
    /// No record file for this port
    Missing,
    /// A well-formed record
    Present(SupervisedProcess),
    /// The file exists but does not hold a usable pid; carries the raw text
    Corrupt(String),
}

/// Resolve the temporary directory from the process environment.
pub fn resolve_temp_dir() -> PathBuf {
    resolve_temp_dir_with(|key| std::env::var(key).ok())
}

/// Resolve the temporary directory using `lookup` for environment access.
///
/// The first variable of [`TEMP_DIR_VARS`] that is set to a non-empty value
/// wins; otherwise [`FALLBACK_TEMP_DIR`] is used.
pub fn resolve_temp_dir_with<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    TEMP_DIR_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_TEMP_DIR))
}

/// Directory-backed store of per-port records
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create a store rooted at the environment's temporary directory
    pub fn from_env() -> Self {
        Self::new(resolve_temp_dir())
    }

    /// Directory holding the record files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic record path for `port`
    pub fn path_for(&self, port: u16) -> PathBuf {
        self.dir.join(format!("{RECORD_PREFIX}{port}.pid"))
    }

    /// Read the record for `port`.
    ///
    /// Missing files are not an error. Unreadable files are; files with
    /// content that is not a positive integer (or not text at all) come back as
    /// [`RecordState::Corrupt`] so callers can discard them like a stale
    /// record.
    pub fn load(&self, port: u16) -> Result<RecordState> {
        let path = self.path_for(port);
        let raw = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RecordState::Missing),
            Err(e) => {
                return Err(CoreError::RecordError(format!(
                    "Failed to read record {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        match parse_pid(&raw) {
            Some(pid) => Ok(RecordState::Present(SupervisedProcess { port, pid })),
            None => {
                debug!("Record {} holds unusable content {:?}", path.display(), raw);
                Ok(RecordState::Corrupt(raw))
            }
        }
    }

    /// Atomically write the record for `process.port`.
    pub fn save(&self, process: SupervisedProcess) -> Result<PathBuf> {
        let path = self.path_for(process.port);
        fs::create_dir_all(&self.dir).map_err(|e| {
            CoreError::RecordError(format!(
                "Failed to create record dir {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let tmp_path = path.with_extension("pid.tmp");
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(|e| {
                    CoreError::RecordError(format!(
                        "Failed to open temp record {}: {}",
                        tmp_path.display(),
                        e
                    ))
                })?;
            f.write_all(process.pid.to_string().as_bytes()).map_err(|e| {
                CoreError::RecordError(format!(
                    "Failed to write temp record {}: {}",
                    tmp_path.display(),
                    e
                ))
            })?;
            let _ = f.sync_all();
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CoreError::RecordError(format!(
                "Failed to replace record {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!("Recorded pid {} at {}", process.pid, path.display());
        Ok(path)
    }

    /// Delete the record for `port`. Returns whether a file was removed.
    pub fn remove(&self, port: u16) -> Result<bool> {
        let path = self.path_for(port);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed record {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CoreError::RecordError(format!(
                "Failed to remove record {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

fn parse_pid(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}
