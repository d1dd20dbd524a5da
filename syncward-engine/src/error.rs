//! Error types for syncward-engine.
//!
//! These are unanticipated faults. Anticipated fail-closed outcomes travel as
//! [`crate::halt::Failure`] instead.

use std::path::PathBuf;

use thiserror::Error;

use syncward_core::CoreError;
use syncward_evidence::EvidenceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read-only git query exited non-zero where success was required.
    #[error("git {label} failed (exit {code:?}): {message}")]
    GitQuery {
        label: String,
        code: Option<i32>,
        message: String,
    },

    #[error("unexpected git output for {label}: {output:?}")]
    GitOutput { label: String, output: String },

    #[error("git executable has not been resolved for this run")]
    GitNotResolved,

    #[error("invalid remote URL pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("lock record serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
