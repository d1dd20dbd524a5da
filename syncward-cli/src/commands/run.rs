//! `syncward run`: one synchronization run.
//!
//! Once the repository root is known every outcome is a recorded run: an
//! unusable configuration fails PRECHECK with `invalid_config`, writes the
//! evidence bundle and exits 1 like any other failure.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use syncward_core::config::{self, DEFAULT_EVIDENCE_DIR, DEFAULT_RESTRICTED_DIRS};
use syncward_core::{ConfigFile, Mode, Policy, ReasonCode, RunSettings, UpstreamRef};
use syncward_engine::{Engine, NativeLiveness};

use super::absolutize;

/// Arguments for `syncward run`. Flags override every config file layer.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Repository top-level directory (defaults to the current directory).
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Evidence root; runs land in `<dir>/runs/<run-id>/`.
    #[arg(long = "evidence-dir", value_name = "DIR")]
    pub evidence_dir: Option<PathBuf>,

    /// Perform the fetch and fast-forward pull. Without it the run is a
    /// non-mutating dry run.
    #[arg(long, conflicts_with = "dry_run")]
    pub apply: bool,

    /// Report without mutating the repository (the default).
    #[arg(long)]
    pub dry_run: bool,

    /// Stash tracked changes before synchronizing.
    #[arg(long, overrides_with = "no_allow_stash")]
    pub allow_stash: bool,

    #[arg(long, overrides_with = "allow_stash", hide = true)]
    pub no_allow_stash: bool,

    /// Tolerate untracked files (and include them in the stash).
    #[arg(long, overrides_with = "no_include_untracked")]
    pub include_untracked: bool,

    #[arg(long, overrides_with = "include_untracked", hide = true)]
    pub no_include_untracked: bool,

    /// Refuse any tracked change, even when stashing is allowed.
    #[arg(long, overrides_with = "no_require_clean")]
    pub require_clean: bool,

    #[arg(long, overrides_with = "require_clean", hide = true)]
    pub no_require_clean: bool,

    /// Switch to the expected branch when on another one.
    #[arg(long, overrides_with = "no_auto_switch")]
    pub auto_switch: bool,

    #[arg(long, overrides_with = "auto_switch", hide = true)]
    pub no_auto_switch: bool,

    /// Allow running with a detached HEAD.
    #[arg(long, overrides_with = "no_allow_detached")]
    pub allow_detached: bool,

    #[arg(long, overrides_with = "allow_detached", hide = true)]
    pub no_allow_detached: bool,

    /// Pop this run's stash if a later phase fails.
    #[arg(long, overrides_with = "no_restore_stash_on_failure")]
    pub restore_stash_on_failure: bool,

    #[arg(long, overrides_with = "restore_stash_on_failure", hide = true)]
    pub no_restore_stash_on_failure: bool,

    /// Upstream to synchronize with, as `<remote>/<branch>`.
    #[arg(long, value_name = "REMOTE/BRANCH")]
    pub expected_upstream: Option<String>,

    /// Regular expression the remote URL must match.
    #[arg(long, value_name = "REGEX")]
    pub expected_remote_url: Option<String>,

    /// Age after which a lock whose owner is gone may be reclaimed.
    #[arg(long, value_name = "SECS")]
    pub lock_timeout_secs: Option<u64>,

    /// Extra YAML config layered over the global and repository files.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Returns the process exit code of the run.
    pub fn run(self) -> Result<i32> {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let repo_root = self
            .repo
            .as_deref()
            .map(|p| absolutize(&cwd, p))
            .unwrap_or_else(|| cwd.clone());
        let overrides = self.overrides(&cwd);

        let liveness = NativeLiveness;
        let engine = Engine::new(&liveness).echo_stdout(true);
        let outcome = match self.settings(&cwd, &repo_root, overrides.clone()) {
            Ok(settings) => {
                tracing::debug!(?settings, "resolved run settings");
                engine.run(settings)
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::error!(error = %detail, "configuration rejected");
                let fallback = self.fallback_settings(&cwd, &repo_root, &overrides);
                engine.reject(fallback, ReasonCode::InvalidConfig, detail)
            }
        };
        if !outcome.finalize.is_complete() {
            tracing::warn!(
                errors = outcome.finalize.errors.len(),
                "evidence bundle is incomplete"
            );
        }
        Ok(outcome.exit_code())
    }

    fn mode(&self) -> Mode {
        if self.apply {
            Mode::Apply
        } else {
            Mode::DryRun
        }
    }

    fn settings(&self, cwd: &Path, repo_root: &Path, overrides: ConfigFile) -> Result<RunSettings> {
        let file = config::load_layered(repo_root, self.config.as_deref())
            .context("failed to load configuration")?;
        let config = file
            .merge(overrides)
            .resolve(repo_root)
            .context("invalid configuration")?;
        let upstream: UpstreamRef = config
            .expected_upstream
            .parse()
            .with_context(|| format!("invalid expected upstream '{}'", config.expected_upstream))?;
        Ok(RunSettings {
            repo_root: repo_root.to_path_buf(),
            evidence_root: config.evidence_root,
            invocation_dir: cwd.to_path_buf(),
            mode: self.mode(),
            policy: config.policy,
            upstream,
            expected_remote_url: config.expected_remote_url,
            git_program: config.git_program,
            restricted_dirs: config.restricted_dirs,
            consistency_check: config.consistency_check,
        })
    }

    /// Settings for recording a rejected run: only the CLI layer is trusted
    /// since the files could not be loaded.
    fn fallback_settings(&self, cwd: &Path, repo_root: &Path, overrides: &ConfigFile) -> RunSettings {
        let evidence_root = match &overrides.evidence_root {
            Some(path) => path.clone(),
            None => repo_root.join(DEFAULT_EVIDENCE_DIR),
        };
        RunSettings {
            repo_root: repo_root.to_path_buf(),
            evidence_root,
            invocation_dir: cwd.to_path_buf(),
            mode: self.mode(),
            policy: Policy::default(),
            upstream: UpstreamRef::default(),
            expected_remote_url: overrides.expected_remote_url.clone(),
            git_program: None,
            restricted_dirs: DEFAULT_RESTRICTED_DIRS.iter().map(PathBuf::from).collect(),
            consistency_check: None,
        }
    }

    fn overrides(&self, cwd: &Path) -> ConfigFile {
        ConfigFile {
            expected_upstream: self.expected_upstream.clone(),
            expected_remote_url: self.expected_remote_url.clone(),
            allow_stash: toggle(self.allow_stash, self.no_allow_stash),
            include_untracked: toggle(self.include_untracked, self.no_include_untracked),
            require_clean: toggle(self.require_clean, self.no_require_clean),
            auto_switch: toggle(self.auto_switch, self.no_auto_switch),
            allow_detached: toggle(self.allow_detached, self.no_allow_detached),
            lock_timeout_secs: self.lock_timeout_secs,
            restore_stash_on_failure: toggle(
                self.restore_stash_on_failure,
                self.no_restore_stash_on_failure,
            ),
            evidence_root: self.evidence_dir.as_deref().map(|p| absolutize(cwd, p)),
            ..ConfigFile::default()
        }
    }
}

/// `--flag` / `--no-flag` pair to an override; `None` leaves the files in charge.
fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}
