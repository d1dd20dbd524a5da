//! Error types for syncward-evidence.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while writing or reading evidence.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error, with the file involved.
    #[error("evidence JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The `LATEST` pointer names something outside the evidence root.
    #[error("invalid latest pointer '{0}'")]
    InvalidPointer(String),
}

/// Convenience constructor for [`EvidenceError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EvidenceError {
    EvidenceError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> EvidenceError {
    EvidenceError::Json {
        path: path.into(),
        source,
    }
}
