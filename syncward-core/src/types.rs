//! Domain types for a synchronization run.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Every persisted record serializes through serde_json with a fixed field
//! order given by the struct definition.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::reason::ReasonCode;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of one engine invocation: `<yyyymmddTHHMMSSmmmZ>-<pid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

static RUN_SEQUENCE: AtomicU32 = AtomicU32::new(0);

impl RunId {
    /// Derive a run id from a timestamp and process id.
    ///
    /// A second id generated by the same process gets a `-<n>` suffix so that
    /// in-process callers (tests, embedding tools) never share an evidence dir.
    pub fn generate(now: DateTime<Utc>, pid: u32) -> Self {
        let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let stamp = now.format("%Y%m%dT%H%M%S%3fZ");
        if seq == 0 {
            Self(format!("{stamp}-{pid}"))
        } else {
            Self(format!("{stamp}-{pid}-{seq}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A remote-qualified branch such as `origin/main`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRef {
    pub remote: String,
    pub branch: String,
}

impl UpstreamRef {
    /// `refs/remotes/<remote>/<branch>` form used for rev-list queries.
    pub fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }
}

impl FromStr for UpstreamRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.split_once('/') {
            Some((remote, branch)) if !remote.is_empty() && !branch.is_empty() => Ok(Self {
                remote: remote.to_string(),
                branch: branch.to_string(),
            }),
            _ => Err(CoreError::InvalidUpstream(s.to_string())),
        }
    }
}

/// `origin/main`, matching [`crate::config::DEFAULT_EXPECTED_UPSTREAM`].
impl Default for UpstreamRef {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
        }
    }
}

impl fmt::Display for UpstreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.remote, self.branch)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Whether the run may mutate the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    DryRun,
    Apply,
}

impl Mode {
    pub fn is_dry_run(self) -> bool {
        self == Mode::DryRun
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::DryRun => write!(f, "dry-run"),
            Mode::Apply => write!(f, "apply"),
        }
    }
}

/// States of the run state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Init,
    Precheck,
    Lock,
    Stash,
    Switch,
    Fetch,
    Pull,
    Postcheck,
    Summary,
    Exception,
}

impl Phase {
    /// Phases that run between INIT and SUMMARY, in order.
    pub const PIPELINE: [Phase; 7] = [
        Phase::Precheck,
        Phase::Lock,
        Phase::Stash,
        Phase::Switch,
        Phase::Fetch,
        Phase::Pull,
        Phase::Postcheck,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "INIT",
            Phase::Precheck => "PRECHECK",
            Phase::Lock => "LOCK",
            Phase::Stash => "STASH",
            Phase::Switch => "SWITCH",
            Phase::Fetch => "FETCH",
            Phase::Pull => "PULL",
            Phase::Postcheck => "POSTCHECK",
            Phase::Summary => "SUMMARY",
            Phase::Exception => "EXCEPTION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseStatus {
    Ok,
    Fail,
    Skip,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Ok => write!(f, "OK"),
            PhaseStatus::Fail => write!(f, "FAIL"),
            PhaseStatus::Skip => write!(f, "SKIP"),
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pass,
    Fail,
    Degraded,
}

impl RunStatus {
    /// Process exit code: only FAIL is non-zero.
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Pass | RunStatus::Degraded => 0,
            RunStatus::Fail => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pass => write!(f, "PASS"),
            RunStatus::Fail => write!(f, "FAIL"),
            RunStatus::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Working-tree cleanliness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TreeClass {
    #[default]
    Clean,
    UntrackedOnly,
    TrackedDirty,
}

/// An in-progress git operation that blocks synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockingOp {
    Merge,
    CherryPick,
    Revert,
    Rebase,
}

impl fmt::Display for BlockingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingOp::Merge => write!(f, "merge"),
            BlockingOp::CherryPick => write!(f, "cherry-pick"),
            BlockingOp::Revert => write!(f, "revert"),
            BlockingOp::Rebase => write!(f, "rebase"),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Default lock staleness threshold (15 minutes).
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 15 * 60;

/// Policy switches resolved from config and CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub allow_stash: bool,
    pub include_untracked: bool,
    pub require_clean: bool,
    pub auto_switch: bool,
    pub allow_detached: bool,
    pub lock_timeout_secs: u64,
    pub restore_stash_on_failure: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allow_stash: false,
            include_untracked: false,
            require_clean: false,
            auto_switch: false,
            allow_detached: false,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            restore_stash_on_failure: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One entry of the phase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Contents of the per-repository lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockRecord {
    pub pid: u32,
    pub host: String,
    pub acquired_at: DateTime<Utc>,
    pub run_id: RunId,
    pub evidence_dir: PathBuf,
}

/// A snapshot created by the stash coordinator. Never consumed automatically
/// unless `restore_stash_on_failure` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashEntry {
    /// Commit id of the stash (`refs/stash` right after creation).
    pub reference: String,
    pub include_untracked: bool,
    pub message: String,
    /// Branch the snapshot was taken on; `None` for a detached HEAD.
    #[serde(default)]
    pub branch: Option<String>,
}

/// Inputs as resolved at run start, recorded verbatim in the decision trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInputs {
    pub repo_root: PathBuf,
    pub evidence_root: PathBuf,
    pub invocation_dir: PathBuf,
    pub mode: Mode,
    pub policy: Policy,
    pub expected_upstream: String,
    pub expected_remote_url: Option<String>,
    pub consistency_check: bool,
}

/// Values computed at one checkpoint. Fields stay `None` when the checkpoint
/// halted before computing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub checkpoint: String,
    pub git_program: Option<PathBuf>,
    pub toplevel: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub branch: Option<String>,
    pub detached: Option<bool>,
    pub target_branch: Option<String>,
    pub upstream_present: Option<bool>,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
    pub diverged: Option<bool>,
    pub blocking: Vec<BlockingOp>,
    pub unmerged: Option<usize>,
    pub tracked_dirty: Option<usize>,
    pub untracked: Option<usize>,
    pub tree: Option<TreeClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ReasonCode>,
}

impl DecisionEntry {
    pub fn at(checkpoint: impl Into<String>) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            ..Self::default()
        }
    }
}

/// Resolved inputs plus every checkpoint's decision entry, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub inputs: ResolvedInputs,
    pub entries: Vec<DecisionEntry>,
}

/// Terminal record of a run. Exactly one per run; written last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    pub reason: ReasonCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub next_action: String,
    pub evidence_dir: PathBuf,
    pub evidence_dir_abs: PathBuf,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash: Option<StashEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
