//! Stash coordinator: snapshot tracked changes before synchronization.
//!
//! The snapshot is never popped automatically. The one exception is the
//! opt-in `restore_stash_on_failure` policy, handled by [`restore`].

use syncward_core::{ReasonCode, RunContext, StashEntry, TreeClass};

use crate::halt::{Halt, Step};
use crate::precheck::PrecheckReport;
use crate::session::Session;

const STASH_REF: &str = "refs/stash";

pub fn run(
    ctx: &mut RunContext,
    session: &mut Session<'_>,
    report: &PrecheckReport,
) -> Result<Step<()>, Halt> {
    if ctx.mode().is_dry_run() {
        return Ok(Step::skip((), ReasonCode::SkippedInDryRun));
    }
    if report.tree != TreeClass::TrackedDirty || !ctx.policy().allow_stash {
        return Ok(Step::skip((), ReasonCode::CleanWorktree));
    }

    let include_untracked = ctx.policy().include_untracked;
    let message = format!(
        "syncward {} {}",
        ctx.run_id(),
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );
    let previous = session.resolve_ref("stash-previous", STASH_REF)?;

    let mut args = vec!["stash", "push", "--message", message.as_str()];
    if include_untracked {
        args.push("--include-untracked");
    }
    let cap = session.git("stash", &args)?;
    if !cap.success() {
        return Err(Halt::fail(ReasonCode::StashFailed, cap.headline()));
    }

    let reference = match session.resolve_ref("stash-ref", STASH_REF)? {
        Some(id) if previous.as_deref() != Some(id.as_str()) => id,
        _ => {
            return Err(Halt::fail(
                ReasonCode::StashFailed,
                "stash push reported success but created no snapshot",
            ))
        }
    };
    tracing::info!(run_id = %ctx.run_id(), reference = %reference, "worktree stashed");
    ctx.set_stash(StashEntry {
        reference: reference.clone(),
        include_untracked,
        message,
        branch: report.branch.clone(),
    });
    Ok(Step::ok((), ReasonCode::Ok).detail(format!("stash {reference}")))
}

/// Pop this run's snapshot after a later phase failed.
///
/// Only pops when `refs/stash` still points at the recorded snapshot and
/// HEAD is on the branch the snapshot was taken from; after an automatic
/// switch the snapshot is kept for the operator. The outcome is reported as
/// a warning and never alters the run's status.
pub fn restore(ctx: &mut RunContext, session: &mut Session<'_>) {
    let Some(entry) = ctx.stash().cloned() else {
        return;
    };
    let current = match session.resolve_ref("stash-restore-check", STASH_REF) {
        Ok(current) => current,
        Err(err) => {
            ctx.warn(format!("stash {} not restored: {err}", entry.reference));
            return;
        }
    };
    if current.as_deref() != Some(entry.reference.as_str()) {
        ctx.warn(format!(
            "stash {} not restored: refs/stash moved since it was created",
            entry.reference
        ));
        return;
    }
    let branch = match session.current_branch("stash-restore-branch") {
        Ok(branch) => branch,
        Err(err) => {
            ctx.warn(format!("stash {} not restored: {err}", entry.reference));
            return;
        }
    };
    if branch != entry.branch {
        ctx.warn(format!(
            "stash {} not restored: taken on {} but HEAD is now on {}; pop it after switching back",
            entry.reference,
            describe(entry.branch.as_deref()),
            describe(branch.as_deref())
        ));
        return;
    }
    match session.git("stash-restore", &["stash", "pop"]) {
        Ok(cap) if cap.success() => {
            ctx.warn(format!("stash {} restored after failure", entry.reference));
        }
        Ok(cap) => ctx.warn(format!(
            "stash {} restore failed ({}); snapshot kept",
            entry.reference,
            cap.headline()
        )),
        Err(err) => ctx.warn(format!("stash {} restore failed: {err}", entry.reference)),
    }
}

fn describe(branch: Option<&str>) -> &str {
    branch.unwrap_or("a detached HEAD")
}
