//! Per-repository exclusive lock.
//!
//! The lock is a JSON [`LockRecord`] at `<evidence>/locks/<repo-key>.lock`.
//! Creation is atomic: the record is written to a private temp file and then
//! hard-linked into place, so a reader never observes a half-written lock.
//! Where hard links are unavailable the file is created with `create_new`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use syncward_core::LockRecord;

use crate::error::{io_err, EngineError};
use crate::liveness::ProcessLiveness;

/// What a lock file on disk currently says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Absent,
    Held(LockStatus),
    Corrupt { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub record: LockRecord,
    pub same_host: bool,
    pub owner_alive: bool,
    pub age_secs: i64,
    /// Owner provably gone (same host, dead pid) and the lock older than the timeout.
    pub stale: bool,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock held by run {} (pid {} on {})", .0.record.run_id, .0.record.pid, .0.record.host)]
    Held(Box<LockStatus>),

    #[error("lock file {path} is unreadable: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Removed,
    /// The file was already gone.
    Missing,
    /// The file now names another run; it was left alone.
    NotOwned,
}

impl ReleaseOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseOutcome::Removed => "released",
            ReleaseOutcome::Missing => "missing",
            ReleaseOutcome::NotOwned => "not-owned",
        }
    }
}

#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    record: LockRecord,
    /// Stale record removed to make room for this one.
    reclaimed: Option<LockRecord>,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn reclaimed(&self) -> Option<&LockRecord> {
        self.reclaimed.as_ref()
    }

    pub fn release(mut self) -> Result<ReleaseOutcome, EngineError> {
        self.released = true;
        remove_if_owned(&self.path, &self.record)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            match remove_if_owned(&self.path, &self.record) {
                Ok(outcome) => tracing::debug!(
                    path = %self.path.display(),
                    outcome = outcome.as_str(),
                    "lock released on drop"
                ),
                Err(err) => tracing::error!(error = %err, "lock release on drop failed"),
            }
        }
    }
}

/// Inspect the lock at `path` without modifying it.
pub fn inspect(
    path: &Path,
    host: &str,
    timeout_secs: u64,
    liveness: &dyn ProcessLiveness,
    now: DateTime<Utc>,
) -> Result<LockState, EngineError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LockState::Absent),
        Err(err) => return Err(io_err(path, err)),
    };
    let record: LockRecord = match serde_json::from_str(&contents) {
        Ok(record) => record,
        Err(err) => {
            return Ok(LockState::Corrupt {
                detail: err.to_string(),
            })
        }
    };
    let same_host = record.host == host;
    // A foreign host's pid cannot be checked.
    let owner_alive = !same_host || liveness.is_alive(record.pid);
    let age_secs = (now - record.acquired_at).num_seconds().max(0);
    let timeout = i64::try_from(timeout_secs).unwrap_or(i64::MAX);
    let stale = !owner_alive && age_secs > timeout;
    Ok(LockState::Held(LockStatus {
        record,
        same_host,
        owner_alive,
        age_secs,
        stale,
    }))
}

/// Take the lock at `path` for `record`.
///
/// An existing lock is reclaimed only when it is stale; a live or recent
/// owner, or an unreadable file, is never touched.
pub fn acquire(
    path: &Path,
    record: LockRecord,
    timeout_secs: u64,
    liveness: &dyn ProcessLiveness,
    now: DateTime<Utc>,
) -> Result<LockGuard, LockError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let mut reclaimed = None;
    for _ in 0..2 {
        if try_create(path, &record)? {
            tracing::info!(path = %path.display(), run_id = %record.run_id, "lock acquired");
            return Ok(LockGuard {
                path: path.to_path_buf(),
                record,
                reclaimed,
                released: false,
            });
        }
        match inspect(path, &record.host, timeout_secs, liveness, now)? {
            // Released between our attempt and the read.
            LockState::Absent => continue,
            LockState::Corrupt { detail } => {
                return Err(LockError::Corrupt {
                    path: path.to_path_buf(),
                    detail,
                })
            }
            LockState::Held(status) if status.stale => {
                tracing::warn!(
                    path = %path.display(),
                    owner = %status.record.run_id,
                    pid = status.record.pid,
                    age_secs = status.age_secs,
                    "reclaiming stale lock"
                );
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(io_err(path, err).into()),
                }
                reclaimed = Some(status.record);
            }
            LockState::Held(status) => return Err(LockError::Held(Box::new(status))),
        }
    }

    // Lost a race with another reclaimer.
    match inspect(path, &record.host, timeout_secs, liveness, now)? {
        LockState::Held(status) => Err(LockError::Held(Box::new(status))),
        LockState::Corrupt { detail } => Err(LockError::Corrupt {
            path: path.to_path_buf(),
            detail,
        }),
        LockState::Absent => Err(EngineError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "lock vanished during acquisition"),
        }
        .into()),
    }
}

/// `Ok(true)` when we created the file, `Ok(false)` when it already existed.
fn try_create(path: &Path, record: &LockRecord) -> Result<bool, EngineError> {
    let body = format!("{}\n", serde_json::to_string_pretty(record)?);
    let tmp = path.with_extension(format!("lock.{}.tmp", record.run_id));
    fs::write(&tmp, &body).map_err(|e| io_err(&tmp, e))?;
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    match linked {
        Ok(()) => return Ok(true),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => {
            tracing::debug!(error = %err, "hard link unavailable, falling back to create_new");
        }
    }

    let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(io_err(path, err)),
    };
    file.write_all(body.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| io_err(path, e))?;
    Ok(true)
}

fn remove_if_owned(path: &Path, record: &LockRecord) -> Result<ReleaseOutcome, EngineError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ReleaseOutcome::Missing),
        Err(err) => return Err(io_err(path, err)),
    };
    let owner: Option<LockRecord> = serde_json::from_str(&contents).ok();
    if owner.as_ref().map(|o| &o.run_id) != Some(&record.run_id) {
        return Ok(ReleaseOutcome::NotOwned);
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(ReleaseOutcome::Removed),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ReleaseOutcome::Missing),
        Err(err) => Err(io_err(path, err)),
    }
}
