//! Error types for syncward-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration and core type parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An upstream reference that is not `<remote>/<branch>`.
    #[error("invalid upstream reference '{0}'; expected <remote>/<branch>")]
    InvalidUpstream(String),

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.syncward/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A key the repository layer may not set, because content fetched
    /// from the remote would then decide it.
    #[error("{path} may not set '{key}'; move it to the global config or --config")]
    UntrustedKey { path: PathBuf, key: &'static str },

    /// A config value that parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
