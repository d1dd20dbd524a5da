//! Layered YAML policy configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.syncward/config.yaml      (global defaults)
//! <repo>/.syncward.yaml        (per-repository policy)
//! --config <path>              (explicit file, highest file precedence)
//! ```
//!
//! Later layers override earlier ones key by key; CLI flags override all
//! files and are applied by the caller on top of [`ResolvedConfig`].
//!
//! The repository file travels with the repository, so a pull can rewrite
//! it. It may not set the keys listed in [`REPO_FORBIDDEN_KEYS`]: those pick
//! the programs a run executes or weaken the remote identity check.
//!
//! # API pattern
//!
//! Functions that need the home directory come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{Policy, DEFAULT_LOCK_TIMEOUT_SECS};

pub const GLOBAL_CONFIG_DIR: &str = ".syncward";
pub const GLOBAL_CONFIG_FILE: &str = "config.yaml";
pub const REPO_CONFIG_FILE: &str = ".syncward.yaml";
pub const DEFAULT_EXPECTED_UPSTREAM: &str = "origin/main";
pub const DEFAULT_EVIDENCE_DIR: &str = ".syncward/evidence";
pub const DEFAULT_TOKEN_PREFIX: &str = "CONSISTENCY";

/// Keys only the global file, `--config` or CLI flags may set.
pub const REPO_FORBIDDEN_KEYS: &[&str] = &[
    "expected_remote_url",
    "git_program",
    "restricted_dirs",
    "consistency_check",
];

/// System directories a run refuses to start from (plus their descendants).
#[cfg(unix)]
pub const DEFAULT_RESTRICTED_DIRS: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/lib", "/lib64", "/proc", "/sbin", "/sys", "/usr",
];

#[cfg(windows)]
pub const DEFAULT_RESTRICTED_DIRS: &[&str] = &[
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];

#[cfg(not(any(unix, windows)))]
pub const DEFAULT_RESTRICTED_DIRS: &[&str] = &[];

/// Secondary consistency checker invoked after a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyCheck {
    /// argv; the first element is the program.
    pub command: Vec<String>,
    /// Marker lines starting with this token carry the checker's verdict.
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
}

fn default_token_prefix() -> String {
    DEFAULT_TOKEN_PREFIX.to_string()
}

/// One config file as written on disk. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_upstream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_stash: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_untracked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_clean: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_switch: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_detached: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_stash_on_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_program: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_dirs: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_check: Option<ConsistencyCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_root: Option<PathBuf>,
}

impl ConfigFile {
    /// Keys from [`REPO_FORBIDDEN_KEYS`] that this file sets.
    pub fn forbidden_repo_keys(&self) -> Vec<&'static str> {
        let set = [
            self.expected_remote_url.is_some(),
            self.git_program.is_some(),
            self.restricted_dirs.is_some(),
            self.consistency_check.is_some(),
        ];
        REPO_FORBIDDEN_KEYS
            .iter()
            .zip(set)
            .filter_map(|(key, set)| set.then_some(*key))
            .collect()
    }

    /// Overlay `other` on top of `self`: keys set in `other` win.
    pub fn merge(self, other: ConfigFile) -> ConfigFile {
        ConfigFile {
            expected_upstream: other.expected_upstream.or(self.expected_upstream),
            expected_remote_url: other.expected_remote_url.or(self.expected_remote_url),
            allow_stash: other.allow_stash.or(self.allow_stash),
            include_untracked: other.include_untracked.or(self.include_untracked),
            require_clean: other.require_clean.or(self.require_clean),
            auto_switch: other.auto_switch.or(self.auto_switch),
            allow_detached: other.allow_detached.or(self.allow_detached),
            lock_timeout_secs: other.lock_timeout_secs.or(self.lock_timeout_secs),
            restore_stash_on_failure: other
                .restore_stash_on_failure
                .or(self.restore_stash_on_failure),
            git_program: other.git_program.or(self.git_program),
            restricted_dirs: other.restricted_dirs.or(self.restricted_dirs),
            consistency_check: other.consistency_check.or(self.consistency_check),
            evidence_root: other.evidence_root.or(self.evidence_root),
        }
    }

    /// Apply built-in defaults. A relative `evidence_root` is resolved
    /// against `repo_root`.
    pub fn resolve(self, repo_root: &Path) -> Result<ResolvedConfig, CoreError> {
        if let Some(check) = &self.consistency_check {
            if check.command.is_empty() {
                return Err(CoreError::Invalid(
                    "consistency_check.command must not be empty".to_string(),
                ));
            }
        }
        let defaults = Policy::default();
        let policy = Policy {
            allow_stash: self.allow_stash.unwrap_or(defaults.allow_stash),
            include_untracked: self.include_untracked.unwrap_or(defaults.include_untracked),
            require_clean: self.require_clean.unwrap_or(defaults.require_clean),
            auto_switch: self.auto_switch.unwrap_or(defaults.auto_switch),
            allow_detached: self.allow_detached.unwrap_or(defaults.allow_detached),
            lock_timeout_secs: self.lock_timeout_secs.unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS),
            restore_stash_on_failure: self
                .restore_stash_on_failure
                .unwrap_or(defaults.restore_stash_on_failure),
        };
        let evidence_root = match self.evidence_root {
            Some(path) if path.is_absolute() => path,
            Some(path) => repo_root.join(path),
            None => repo_root.join(DEFAULT_EVIDENCE_DIR),
        };
        Ok(ResolvedConfig {
            expected_upstream: self
                .expected_upstream
                .unwrap_or_else(|| DEFAULT_EXPECTED_UPSTREAM.to_string()),
            expected_remote_url: self.expected_remote_url,
            policy,
            git_program: self.git_program,
            restricted_dirs: self.restricted_dirs.unwrap_or_else(|| {
                DEFAULT_RESTRICTED_DIRS.iter().map(PathBuf::from).collect()
            }),
            consistency_check: self.consistency_check,
            evidence_root,
        })
    }
}

/// Config with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub expected_upstream: String,
    pub expected_remote_url: Option<String>,
    pub policy: Policy,
    pub git_program: Option<PathBuf>,
    pub restricted_dirs: Vec<PathBuf>,
    pub consistency_check: Option<ConsistencyCheck>,
    pub evidence_root: PathBuf,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.syncward/config.yaml`: pure, no I/O.
pub fn global_config_path_at(home: &Path) -> PathBuf {
    home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE)
}

/// `<repo>/.syncward.yaml`: pure, no I/O.
pub fn repo_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(REPO_CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load one config file; `Ok(None)` if it does not exist.
pub fn load_file(path: &Path) -> Result<Option<ConfigFile>, CoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(Some(ConfigFile::default()));
    }
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Merge global, repository and explicit config files, in that order.
///
/// An explicit path that does not exist is an error; the implicit layers are
/// optional. A repository file setting a forbidden key is rejected whole.
pub fn load_layered_at(
    home: &Path,
    repo_root: &Path,
    explicit: Option<&Path>,
) -> Result<ConfigFile, CoreError> {
    let mut merged = ConfigFile::default();
    if let Some(global) = load_file(&global_config_path_at(home))? {
        tracing::debug!(path = %global_config_path_at(home).display(), "loaded global config");
        merged = merged.merge(global);
    }
    let repo_path = repo_config_path(repo_root);
    if let Some(repo) = load_file(&repo_path)? {
        if let Some(&key) = repo.forbidden_repo_keys().first() {
            return Err(CoreError::UntrustedKey {
                path: repo_path,
                key,
            });
        }
        tracing::debug!(path = %repo_path.display(), "loaded repository config");
        merged = merged.merge(repo);
    }
    if let Some(path) = explicit {
        let file = load_file(path)?.ok_or_else(|| {
            io_err(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            )
        })?;
        merged = merged.merge(file);
    }
    Ok(merged)
}

/// `load_layered_at` convenience wrapper.
pub fn load_layered(repo_root: &Path, explicit: Option<&Path>) -> Result<ConfigFile, CoreError> {
    load_layered_at(&home()?, repo_root, explicit)
}

fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
