//! Postcondition verifier.
//!
//! Dry-run: the porcelain status must be byte-identical to the precheck
//! snapshot. Apply: the tree must be clean and not behind the upstream. The
//! optional consistency check can only degrade a run, never fail it.

use std::path::PathBuf;

use syncward_core::{DecisionEntry, ReasonCode, RunContext};
use syncward_evidence::{status_diff, Marker, MarkerEvent};

use crate::consistency;
use crate::halt::{Halt, Step};
use crate::precheck::PrecheckReport;
use crate::process::run_captured;
use crate::session::Session;
use crate::status::StatusSummary;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostcheckOutcome {
    /// Set when the consistency check failed.
    pub degraded: Option<String>,
}

pub fn run(
    ctx: &mut RunContext,
    session: &mut Session<'_>,
    report: &PrecheckReport,
) -> Result<Step<PostcheckOutcome>, Halt> {
    let mut entry = DecisionEntry::at("postcheck");
    let result = verify(ctx, session, report, &mut entry);
    entry.verdict = Some(match &result {
        Ok(_) => ReasonCode::Ok,
        Err(halt) => halt.reason(),
    });
    ctx.push_decision(entry);
    result?;

    let degraded = match ctx.settings().consistency_check.clone() {
        Some(check) => run_check(ctx, session, &check),
        None => None,
    };
    Ok(Step::ok(PostcheckOutcome { degraded }, ReasonCode::Ok))
}

fn verify(
    ctx: &mut RunContext,
    session: &mut Session<'_>,
    report: &PrecheckReport,
    entry: &mut DecisionEntry,
) -> Result<(), Halt> {
    let status_after = session.status_snapshot("status-after")?;
    let status = StatusSummary::parse(&status_after);
    entry.tracked_dirty = Some(status.tracked_dirty());
    entry.untracked = Some(status.untracked.len());
    entry.unmerged = Some(status.unmerged.len());
    entry.tree = Some(status.classify());
    let branch = session.current_branch("branch-after")?;
    entry.detached = Some(branch.is_none());
    entry.branch = branch;

    let tracking = ctx.settings().upstream.tracking_ref();
    let upstream_present = session.resolve_ref("upstream-after", &tracking)?.is_some();
    entry.upstream_present = Some(upstream_present);
    let (ahead, behind) = if upstream_present {
        session.ahead_behind("ahead-behind-after", "HEAD", &tracking)?
    } else {
        (0, 0)
    };
    entry.ahead = Some(ahead);
    entry.behind = Some(behind);
    entry.diverged = Some(ahead > 0 && behind > 0);

    if ctx.mode().is_dry_run() {
        if let Some(diff) = status_diff(&report.status_before, &status_after) {
            session.evidence().write_status_diff(&diff);
            return Err(Halt::fail(
                ReasonCode::DryRunMutated,
                "worktree status changed during a dry-run",
            )
            .next_action(format!(
                "{}/{}",
                session.evidence().run_dir_rel().display(),
                syncward_evidence::layout::STATUS_DIFF_FILE
            )));
        }
        return Ok(());
    }

    let untracked_blocking = !status.untracked.is_empty() && !ctx.policy().include_untracked;
    if status.tracked_dirty() > 0 || untracked_blocking {
        return Err(Halt::fail(
            ReasonCode::DirtyAfterPull,
            format!(
                "{} tracked, {} untracked path(s) after pull",
                status.tracked_dirty(),
                status.untracked.len()
            ),
        ));
    }
    if behind != 0 {
        return Err(Halt::fail(
            ReasonCode::StillBehindAfterPull,
            format!("still {behind} commit(s) behind {}", ctx.settings().upstream),
        ));
    }
    Ok(())
}

/// Run the configured checker; `Some(detail)` when it did not pass.
fn run_check(
    ctx: &mut RunContext,
    session: &mut Session<'_>,
    check: &syncward_core::ConsistencyCheck,
) -> Option<String> {
    let Some((program, args)) = check.command.split_first() else {
        return Some("consistency check has an empty command".to_string());
    };
    let cwd = ctx.settings().repo_root.clone();
    let verdict = match run_captured(
        "consistency-check",
        &PathBuf::from(program),
        args,
        &cwd,
        &[],
    ) {
        Ok(capture) => {
            session.record(&capture);
            consistency::evaluate(check, &capture)
        }
        Err(err) => consistency::CheckVerdict {
            passed: false,
            exit_code: None,
            token: None,
            detail: err.to_string(),
        },
    };

    session.emit(
        &Marker::new(MarkerEvent::CheckResult)
            .field("run_id", ctx.run_id())
            .field("status", if verdict.passed { "PASS" } else { "FAIL" })
            .field_opt("token", verdict.token.as_deref())
            .field_opt("exit_code", verdict.exit_code)
            .field("detail", &verdict.detail),
    );
    if verdict.passed {
        tracing::info!(run_id = %ctx.run_id(), "consistency check passed");
        None
    } else {
        ctx.warn(format!("consistency check failed: {}", verdict.detail));
        Some(verdict.detail)
    }
}
