//! Evidence directory layout.
//!
//! ```text
//! <evidence_root>/
//!   .gitignore                  (`*`)
//!   LATEST                      (relative path of the newest run dir)
//!   locks/<repo-key>.lock       (one lock file per repository)
//!   runs/<run_id>/
//!     summary.json  decision_trace.json  run.json  manifest.json
//!     stdout.log  stderr.log  markers.log  [status.diff]
//! ```

use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use syncward_core::{RunId, SummaryRecord};

use crate::bundle::RunRecord;
use crate::error::{io_err, json_err, EvidenceError};
use crate::writer::write_text_atomic;

pub const RUNS_DIR: &str = "runs";
pub const LOCKS_DIR: &str = "locks";
pub const LATEST_POINTER: &str = "LATEST";

pub const SUMMARY_FILE: &str = "summary.json";
pub const TRACE_FILE: &str = "decision_trace.json";
pub const RUN_FILE: &str = "run.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const STDOUT_FILE: &str = "stdout.log";
pub const STDERR_FILE: &str = "stderr.log";
pub const MARKERS_FILE: &str = "markers.log";
pub const STATUS_DIFF_FILE: &str = "status.diff";
/// Self-ignoring `.gitignore` so an evidence root inside a working tree never
/// shows up as untracked.
pub const GITIGNORE_FILE: &str = ".gitignore";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLayout {
    root: PathBuf,
}

impl EvidenceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    /// `runs/<run_id>`: the form stored in `LATEST` and in summaries.
    pub fn run_dir_rel(&self, run_id: &RunId) -> PathBuf {
        Path::new(RUNS_DIR).join(run_id.as_str())
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(self.run_dir_rel(run_id))
    }

    /// Write `<root>/.gitignore` containing `*` unless one exists.
    pub fn ensure_ignored(&self) -> Result<(), EvidenceError> {
        let path = self.root.join(GITIGNORE_FILE);
        if path.exists() {
            return Ok(());
        }
        write_text_atomic(&path, "*\n")
    }

    pub fn latest_pointer_path(&self) -> PathBuf {
        self.root.join(LATEST_POINTER)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    /// Deterministic lock path for a repository root (callers pass the
    /// canonical path so every spelling of one repository maps to one lock).
    pub fn lock_path(&self, repo_root: &Path) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", repo_key(repo_root)))
    }

    /// Resolve the `LATEST` pointer to an absolute run directory.
    ///
    /// Returns `Ok(None)` when no run has finalized yet.
    pub fn latest_run_dir(&self) -> Result<Option<PathBuf>, EvidenceError> {
        let pointer = self.latest_pointer_path();
        let contents = match std::fs::read_to_string(&pointer) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&pointer, err)),
        };
        let rel = PathBuf::from(contents.trim());
        if rel.as_os_str().is_empty()
            || rel.is_absolute()
            || rel.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(EvidenceError::InvalidPointer(contents.trim().to_string()));
        }
        Ok(Some(self.root.join(rel)))
    }

    pub fn load_summary(&self, run_dir: &Path) -> Result<SummaryRecord, EvidenceError> {
        read_json(&run_dir.join(SUMMARY_FILE))
    }

    pub fn load_run_record(&self, run_dir: &Path) -> Result<RunRecord, EvidenceError> {
        read_json(&run_dir.join(RUN_FILE))
    }
}

/// `<sanitized dir name>-<first 12 hex of sha256(path)>`.
pub fn repo_key(repo_root: &Path) -> String {
    let digest = {
        let mut h = Sha256::new();
        h.update(repo_root.to_string_lossy().as_bytes());
        hex::encode(h.finalize())
    };
    let name: String = repo_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{name}-{}", &digest[..12])
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, EvidenceError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&contents).map_err(|e| json_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_is_deterministic_per_repo() {
        let layout = EvidenceLayout::new("/ev");
        let a = layout.lock_path(Path::new("/work/app"));
        let b = layout.lock_path(Path::new("/work/app"));
        let c = layout.lock_path(Path::new("/other/app"));
        assert_eq!(a, b);
        assert_ne!(a, c, "same dir name in different places must not collide");
        assert!(a.starts_with("/ev/locks"));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("app-"));
    }

    #[test]
    fn repo_key_sanitizes_name() {
        let key = repo_key(Path::new("/work/my repo.git"));
        assert!(key.starts_with("my_repo_git-"), "got {key}");
    }

    #[test]
    fn latest_absent_is_none() {
        let tmp = TempDir::new().unwrap();
        let layout = EvidenceLayout::new(tmp.path());
        assert!(layout.latest_run_dir().unwrap().is_none());
    }

    #[test]
    fn ensure_ignored_writes_once_and_keeps_existing() {
        let tmp = TempDir::new().unwrap();
        let layout = EvidenceLayout::new(tmp.path().join("ev"));
        std::fs::create_dir_all(layout.root()).unwrap();
        layout.ensure_ignored().unwrap();
        let path = layout.root().join(GITIGNORE_FILE);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "*\n");

        std::fs::write(&path, "custom\n").unwrap();
        layout.ensure_ignored().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "custom\n");
    }

    #[test]
    fn latest_resolves_relative_pointer() {
        let tmp = TempDir::new().unwrap();
        let layout = EvidenceLayout::new(tmp.path());
        std::fs::write(layout.latest_pointer_path(), "runs/r1\n").unwrap();
        assert_eq!(
            layout.latest_run_dir().unwrap(),
            Some(tmp.path().join("runs/r1"))
        );
    }

    #[test]
    fn latest_rejects_escaping_pointer() {
        let tmp = TempDir::new().unwrap();
        let layout = EvidenceLayout::new(tmp.path());
        std::fs::write(layout.latest_pointer_path(), "../../etc\n").unwrap();
        assert!(matches!(
            layout.latest_run_dir(),
            Err(EvidenceError::InvalidPointer(_))
        ));
    }
}
