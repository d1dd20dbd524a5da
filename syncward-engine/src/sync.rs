//! Sync executor: optional branch switch, then FETCH and fast-forward-only PULL.

use syncward_core::{DecisionEntry, ReasonCode, RunContext};

use crate::halt::{Halt, Step};
use crate::precheck::PrecheckReport;
use crate::session::Session;

pub fn switch(
    ctx: &mut RunContext,
    session: &mut Session<'_>,
    report: &PrecheckReport,
) -> Result<Step<()>, Halt> {
    let Some(target) = report.target_branch.as_deref().filter(|_| report.needs_switch) else {
        return Ok(Step::skip((), ReasonCode::NoSwitchNeeded));
    };
    let from = report.branch.as_deref().unwrap_or("(detached)");
    if ctx.mode().is_dry_run() {
        ctx.warn(format!("dry-run: switch from {from} to {target} not performed"));
        return Ok(Step::skip((), ReasonCode::SkippedInDryRun));
    }

    let upstream = ctx.settings().upstream.to_string();
    let cap = if report.target_exists {
        session.git("switch", &["switch", target])?
    } else {
        session.git("switch", &["switch", "--create", target, "--track", &upstream])?
    };
    if !cap.success() {
        return Err(Halt::fail(ReasonCode::SwitchFailed, cap.headline()));
    }
    Ok(Step::ok((), ReasonCode::Ok).detail(format!("switched from {from} to {target}")))
}

pub fn fetch(ctx: &mut RunContext, session: &mut Session<'_>) -> Result<Step<()>, Halt> {
    let remote = ctx.settings().upstream.remote.clone();
    let (args, reason) = if ctx.mode().is_dry_run() {
        (vec!["fetch", "--dry-run", remote.as_str()], ReasonCode::DryRunFetch)
    } else {
        (vec!["fetch", remote.as_str()], ReasonCode::Ok)
    };
    let cap = session.git("fetch", &args)?;
    if !cap.success() {
        return Err(Halt::fail(ReasonCode::FetchFailed, cap.headline()));
    }
    Ok(Step::ok((), reason).detail(format!("fetched {remote}")))
}

/// Fast-forward the current branch to its upstream. Never merges or rebases.
pub fn pull(ctx: &mut RunContext, session: &mut Session<'_>) -> Result<Step<()>, Halt> {
    if ctx.mode().is_dry_run() {
        return Ok(Step::skip((), ReasonCode::SkippedInDryRun));
    }
    let upstream = ctx.settings().upstream.clone();
    let tracking = upstream.tracking_ref();

    // Fetch may have revealed a divergence precheck could not see.
    let (ahead, behind) = session.ahead_behind("post-fetch-ahead-behind", "HEAD", &tracking)?;
    let diverged = ahead > 0 && behind > 0;
    let mut entry = DecisionEntry::at("post-fetch");
    entry.branch = session.current_branch("post-fetch-branch")?;
    entry.upstream_present = Some(true);
    entry.ahead = Some(ahead);
    entry.behind = Some(behind);
    entry.diverged = Some(diverged);
    entry.verdict = Some(if diverged {
        ReasonCode::FfOnlyFailed
    } else {
        ReasonCode::Ok
    });
    ctx.push_decision(entry);
    if diverged {
        return Err(Halt::fail(
            ReasonCode::FfOnlyFailed,
            format!("diverged after fetch: ahead {ahead}, behind {behind}"),
        ));
    }

    let before = session.resolve_ref("head-before", "HEAD")?;
    let cap = session.git(
        "pull",
        &["pull", "--ff-only", "--no-rebase", &upstream.remote, &upstream.branch],
    )?;
    if !cap.success() {
        let reason = if mentions_fast_forward(&cap.stderr) {
            ReasonCode::FfOnlyFailed
        } else {
            ReasonCode::PullFailed
        };
        return Err(Halt::fail(reason, cap.headline()));
    }
    let after = session.resolve_ref("head-after", "HEAD")?;
    if before == after {
        Ok(Step::ok((), ReasonCode::UpToDate))
    } else {
        let short = |id: &Option<String>| {
            id.as_deref()
                .map(|s| s.chars().take(12).collect::<String>())
                .unwrap_or_else(|| "none".to_string())
        };
        Ok(Step::ok((), ReasonCode::FastForward)
            .detail(format!("{}..{}", short(&before), short(&after))))
    }
}

fn mentions_fast_forward(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("fast-forward") || lower.contains("fast forward")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ff_refusal_is_detected() {
        assert!(mentions_fast_forward(
            "fatal: Not possible to fast-forward, aborting.\n"
        ));
        assert!(!mentions_fast_forward(
            "fatal: couldn't find remote ref main\n"
        ));
    }
}
