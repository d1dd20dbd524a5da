//! SHA-256 manifest of a run's evidence files.
//!
//! Persisted as `manifest.json` next to the artifacts it covers. The summary
//! is written after the manifest, so its digest is taken from the bytes about
//! to be written and added with [`Manifest::record`].

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use syncward_core::RunId;

use crate::error::{io_err, EvidenceError};
use crate::layout::{MANIFEST_FILE, SUMMARY_FILE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    /// File name → hex SHA-256 digest, sorted by name.
    pub files: BTreeMap<String, String>,
}

impl Manifest {
    /// Hash every regular file directly inside `run_dir`, except the
    /// manifest and the not-yet-final summary.
    pub fn build(run_id: &RunId, run_dir: &Path) -> Result<Self, EvidenceError> {
        let mut files = BTreeMap::new();
        let entries = std::fs::read_dir(run_dir).map_err(|e| io_err(run_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(run_dir, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if !ty.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == MANIFEST_FILE || name == SUMMARY_FILE || name.ends_with(".syncward.tmp") {
                continue;
            }
            files.insert(name, hash_file(&entry.path())?);
        }
        Ok(Self {
            run_id: run_id.clone(),
            generated_at: Utc::now(),
            files,
        })
    }

    /// Cover a file from the bytes it will hold once written.
    pub fn record(&mut self, name: &str, bytes: &[u8]) {
        self.files.insert(name.to_string(), hash_bytes(bytes));
    }

    /// Names of files whose current digest differs from the manifest, or
    /// that have disappeared.
    pub fn verify(&self, run_dir: &Path) -> Result<Vec<String>, EvidenceError> {
        let mut mismatched = Vec::new();
        for (name, expected) in &self.files {
            let path = run_dir.join(name);
            match std::fs::metadata(&path) {
                Ok(_) => {
                    if &hash_file(&path)? != expected {
                        mismatched.push(name.clone());
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    mismatched.push(name.clone())
                }
                Err(err) => return Err(io_err(path, err)),
            }
        }
        Ok(mismatched)
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

fn hash_file(path: &Path) -> Result<String, EvidenceError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    Ok(hash_bytes(&bytes))
}
