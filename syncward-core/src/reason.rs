//! Reason codes carried by phase records, marker lines and the run summary.
//!
//! The snake_case spelling of each variant is the wire token. Tokens are part
//! of the marker-line protocol and must never be renamed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure taxonomy. Determines whether a lock may have been taken and
/// whether repository state may already have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Fails before any state is touched; no lock taken.
    Environment,
    /// Fails before mutation.
    Policy,
    /// Another live run holds the repository.
    Concurrency,
    /// Fails after partial mutation.
    Mutation,
    /// Sync finished but the resulting state is wrong.
    Postcondition,
    /// Advisory check failed; the run still passes.
    Degradation,
    /// Unanticipated fault.
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Ok,
    FastForward,
    UpToDate,
    DryRunFetch,
    CleanWorktree,
    NoSwitchNeeded,
    SkippedInDryRun,
    PriorFailure,

    InvalidConfig,
    GitMissing,
    RestrictedDirectory,
    NotARepository,
    CwdNotRepoRoot,
    RepoRootMismatch,
    RemoteMissing,
    RemoteUrlMismatch,

    DetachedHead,
    BranchMismatch,
    BlockingOperation,
    UnmergedPaths,
    UpstreamMissing,
    DivergedBranch,
    UntrackedFiles,
    DirtyWorktreeDryRun,
    DirtyWorktreeRequireClean,
    DirtyWorktreeStashDisallowed,

    LockExists,
    LockCorrupt,

    StashFailed,
    SwitchFailed,
    FetchFailed,
    FfOnlyFailed,
    PullFailed,

    DryRunMutated,
    DirtyAfterPull,
    StillBehindAfterPull,

    ConsistencyCheckFailed,

    Exception,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Ok => "ok",
            ReasonCode::FastForward => "fast_forward",
            ReasonCode::UpToDate => "up_to_date",
            ReasonCode::DryRunFetch => "dry_run_fetch",
            ReasonCode::CleanWorktree => "clean_worktree",
            ReasonCode::NoSwitchNeeded => "no_switch_needed",
            ReasonCode::SkippedInDryRun => "skipped_in_dry_run",
            ReasonCode::PriorFailure => "prior_failure",
            ReasonCode::InvalidConfig => "invalid_config",
            ReasonCode::GitMissing => "git_missing",
            ReasonCode::RestrictedDirectory => "restricted_directory",
            ReasonCode::NotARepository => "not_a_repository",
            ReasonCode::CwdNotRepoRoot => "cwd_not_repo_root",
            ReasonCode::RepoRootMismatch => "repo_root_mismatch",
            ReasonCode::RemoteMissing => "remote_missing",
            ReasonCode::RemoteUrlMismatch => "remote_url_mismatch",
            ReasonCode::DetachedHead => "detached_head",
            ReasonCode::BranchMismatch => "branch_mismatch",
            ReasonCode::BlockingOperation => "blocking_operation",
            ReasonCode::UnmergedPaths => "unmerged_paths",
            ReasonCode::UpstreamMissing => "upstream_missing",
            ReasonCode::DivergedBranch => "diverged_branch",
            ReasonCode::UntrackedFiles => "untracked_files",
            ReasonCode::DirtyWorktreeDryRun => "dirty_worktree_dry_run",
            ReasonCode::DirtyWorktreeRequireClean => "dirty_worktree_require_clean",
            ReasonCode::DirtyWorktreeStashDisallowed => "dirty_worktree_stash_disallowed",
            ReasonCode::LockExists => "lock_exists",
            ReasonCode::LockCorrupt => "lock_corrupt",
            ReasonCode::StashFailed => "stash_failed",
            ReasonCode::SwitchFailed => "switch_failed",
            ReasonCode::FetchFailed => "fetch_failed",
            ReasonCode::FfOnlyFailed => "ff_only_failed",
            ReasonCode::PullFailed => "pull_failed",
            ReasonCode::DryRunMutated => "dry_run_mutated",
            ReasonCode::DirtyAfterPull => "dirty_after_pull",
            ReasonCode::StillBehindAfterPull => "still_behind_after_pull",
            ReasonCode::ConsistencyCheckFailed => "consistency_check_failed",
            ReasonCode::Exception => "exception",
        }
    }

    /// Taxonomy class for failure codes; `None` for success and skip codes.
    pub fn class(self) -> Option<FailureClass> {
        use ReasonCode::*;
        match self {
            Ok | FastForward | UpToDate | DryRunFetch | CleanWorktree | NoSwitchNeeded
            | SkippedInDryRun | PriorFailure => None,
            InvalidConfig | GitMissing | RestrictedDirectory | NotARepository
            | CwdNotRepoRoot | RepoRootMismatch => Some(FailureClass::Environment),
            RemoteMissing | RemoteUrlMismatch | DetachedHead | BranchMismatch
            | BlockingOperation | UnmergedPaths | UpstreamMissing | DivergedBranch
            | UntrackedFiles | DirtyWorktreeDryRun | DirtyWorktreeRequireClean
            | DirtyWorktreeStashDisallowed => Some(FailureClass::Policy),
            LockExists | LockCorrupt => Some(FailureClass::Concurrency),
            StashFailed | SwitchFailed | FetchFailed | FfOnlyFailed | PullFailed => {
                Some(FailureClass::Mutation)
            }
            DryRunMutated | DirtyAfterPull | StillBehindAfterPull => {
                Some(FailureClass::Postcondition)
            }
            ConsistencyCheckFailed => Some(FailureClass::Degradation),
            Exception => Some(FailureClass::Fault),
        }
    }

    /// Default operator instruction used when a failure has no more specific
    /// evidence pointer.
    pub fn operator_hint(self) -> &'static str {
        use ReasonCode::*;
        match self {
            InvalidConfig => "fix the configuration named in the detail and re-run",
            GitMissing => "install git or set git_program in the config",
            RestrictedDirectory => "run from a repository outside system directories",
            NotARepository => "point --repo at a git working copy",
            CwdNotRepoRoot => "cd to the repository top-level directory and re-run",
            RepoRootMismatch => "pass the repository top-level directory as --repo",
            RemoteMissing => "configure the expected remote with `git remote add`",
            RemoteUrlMismatch => "verify the remote URL with `git remote -v`",
            DetachedHead => "check out a branch or pass --allow-detached",
            BranchMismatch => "check out the expected branch or pass --auto-switch",
            BlockingOperation => "finish or abort the in-progress git operation",
            UnmergedPaths => "resolve conflicted paths and commit",
            UpstreamMissing => "fetch the remote or correct --expected-upstream",
            DivergedBranch => "reconcile local and remote history manually",
            UntrackedFiles => "remove untracked files or pass --include-untracked",
            DirtyWorktreeDryRun => "commit or stash changes before a dry run",
            DirtyWorktreeRequireClean => "commit or stash changes, or drop --require-clean",
            DirtyWorktreeStashDisallowed => "commit changes or pass --allow-stash",
            LockExists => "inspect the owning run's evidence before retrying",
            LockCorrupt => "inspect and remove the lock file manually",
            StashFailed | SwitchFailed | FetchFailed | PullFailed => {
                "inspect stderr.log in the run evidence and resolve manually"
            }
            FfOnlyFailed => "local history diverged from upstream; reconcile manually",
            DryRunMutated => "inspect status.diff; the dry run changed the worktree",
            DirtyAfterPull => "inspect `git status` and the run evidence",
            StillBehindAfterPull => "re-run after inspecting the fetch output",
            ConsistencyCheckFailed => "inspect the consistency check output in stdout.log",
            Exception => "inspect stderr.log and the run record",
            Ok | FastForward | UpToDate | DryRunFetch | CleanWorktree | NoSwitchNeeded
            | SkippedInDryRun | PriorFailure => "none",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_token_matches_as_str() {
        for code in [
            ReasonCode::Ok,
            ReasonCode::FfOnlyFailed,
            ReasonCode::DirtyWorktreeDryRun,
            ReasonCode::StillBehindAfterPull,
            ReasonCode::LockExists,
        ] {
            let json = serde_json::to_string(&code).expect("serialize");
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn success_codes_have_no_class() {
        assert_eq!(ReasonCode::Ok.class(), None);
        assert_eq!(ReasonCode::FastForward.class(), None);
        assert_eq!(ReasonCode::DivergedBranch.class(), Some(FailureClass::Policy));
        assert_eq!(ReasonCode::LockExists.class(), Some(FailureClass::Concurrency));
        assert_eq!(ReasonCode::PullFailed.class(), Some(FailureClass::Mutation));
        assert_eq!(ReasonCode::InvalidConfig.class(), Some(FailureClass::Environment));
    }
}
