pub mod lock;
pub mod run;
pub mod show;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use syncward_core::{config, ConfigFile, ResolvedConfig};

/// Repository and fully layered configuration a subcommand operates on.
pub struct Target {
    pub cwd: PathBuf,
    pub repo_root: PathBuf,
    pub config: ResolvedConfig,
}

/// Resolve `--repo`, load the config layers and put `overrides` on top.
pub fn resolve_target(
    repo: Option<&Path>,
    explicit_config: Option<&Path>,
    overrides: ConfigFile,
) -> Result<Target> {
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    let repo_root = repo
        .map(|p| absolutize(&cwd, p))
        .unwrap_or_else(|| cwd.clone());
    let file = config::load_layered(&repo_root, explicit_config)
        .context("failed to load configuration")?;
    let config = file
        .merge(overrides)
        .resolve(&repo_root)
        .context("invalid configuration")?;
    Ok(Target {
        cwd,
        repo_root,
        config,
    })
}

pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Canonical form used to key the repository lock.
pub fn canonical_repo(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
