//! Run orchestrator.
//!
//! Sequences `INIT -> PRECHECK -> LOCK -> STASH -> SWITCH -> FETCH -> PULL ->
//! POSTCHECK -> SUMMARY`. Each phase returns `Result<Step<T>, Halt>`; the first
//! `Halt` unwinds to [`Engine::run`], which is the single place a terminal
//! summary is produced. Panics are caught there too and become `EXCEPTION`.
//! The lock guard is released before evidence is finalized on every path.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use chrono::Utc;

use syncward_core::{
    DecisionEntry, LockRecord, Phase, PhaseRecord, PhaseStatus, ReasonCode, RunContext,
    RunSettings, RunStatus, SummaryRecord,
};
use syncward_core::reason::FailureClass;
use syncward_evidence::layout::{STDERR_FILE, STDOUT_FILE};
use syncward_evidence::{
    EvidenceLayout, EvidenceWriter, FinalBundle, FinalizeReport, Marker, MarkerEvent, RunRecord,
};

use crate::halt::{Failure, Halt, Step};
use crate::liveness::{hostname, ProcessLiveness};
use crate::lock::{self, LockError, LockGuard, ReleaseOutcome};
use crate::precheck::{self, canonical, PrecheckReport};
use crate::session::Session;
use crate::{postcheck, stash, sync};

/// Result of one run, as returned to the caller after evidence is written.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: SummaryRecord,
    pub phases: Vec<PhaseRecord>,
    pub finalize: FinalizeReport,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.summary.status.exit_code()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.phases.iter().find(|r| r.phase == phase)
    }
}

enum Completion {
    Passed,
    Degraded(String),
}

struct Verdict {
    status: RunStatus,
    reason: ReasonCode,
    detail: Option<String>,
    next_action: String,
}

pub struct Engine<'a> {
    liveness: &'a dyn ProcessLiveness,
    host: String,
    echo_stdout: bool,
}

impl<'a> Engine<'a> {
    pub fn new(liveness: &'a dyn ProcessLiveness) -> Self {
        Self {
            liveness,
            host: hostname(),
            echo_stdout: false,
        }
    }

    /// Print marker lines to stdout as well as `markers.log`.
    pub fn echo_stdout(mut self, echo: bool) -> Self {
        self.echo_stdout = echo;
        self
    }

    /// Override the host name written to and compared against lock records.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn run(&self, settings: RunSettings) -> RunOutcome {
        self.execute(settings, None)
    }

    /// Record a run that cannot start, e.g. because its configuration is
    /// unusable. `settings` carries the best-known repository and evidence
    /// roots; the run fails at PRECHECK with `reason` and writes the usual
    /// evidence bundle.
    pub fn reject(
        &self,
        settings: RunSettings,
        reason: ReasonCode,
        detail: impl Into<String>,
    ) -> RunOutcome {
        let failure = Failure {
            reason,
            detail: Some(detail.into()),
            next_action: None,
        };
        self.execute(settings, Some(failure))
    }

    fn execute(&self, settings: RunSettings, rejected: Option<Failure>) -> RunOutcome {
        let mut ctx = RunContext::new(settings, Utc::now(), std::process::id());
        let layout = EvidenceLayout::new(ctx.settings().evidence_root.clone());
        let mut evidence = EvidenceWriter::create(layout, ctx.run_id().clone(), self.echo_stdout);
        let rel = slash_path(&evidence.run_dir_rel());

        tracing::info!(
            run_id = %ctx.run_id(),
            repo = %ctx.settings().repo_root.display(),
            mode = %ctx.mode(),
            "run started"
        );
        ctx.record(Phase::Init, PhaseStatus::Ok, Some(ReasonCode::Ok), None);
        evidence.emit(
            &Marker::new(MarkerEvent::RunStart)
                .field("run_id", ctx.run_id())
                .field("mode", ctx.mode())
                .field("repo", ctx.settings().repo_root.display())
                .field("upstream", &ctx.settings().upstream)
                .field("evidence", &rel),
        );

        let mut lock_record = None;
        let outcome = {
            let mut session = Session::new(&mut evidence);
            match rejected {
                Some(failure) => Ok(refuse(&mut ctx, &mut session, failure)),
                None => panic::catch_unwind(AssertUnwindSafe(|| {
                    self.pipeline(&mut ctx, &mut session, &mut lock_record)
                })),
            }
        };

        let verdict = match outcome {
            Ok(Ok(Completion::Passed)) => Verdict {
                status: RunStatus::Pass,
                reason: ReasonCode::Ok,
                detail: None,
                next_action: "none".to_string(),
            },
            Ok(Ok(Completion::Degraded(detail))) => Verdict {
                status: RunStatus::Degraded,
                reason: ReasonCode::ConsistencyCheckFailed,
                detail: Some(detail),
                next_action: format!("{rel}/{STDOUT_FILE}"),
            },
            Ok(Err(Halt::Fail(failure))) => failed(failure, &rel),
            Ok(Err(Halt::Fault(err))) => {
                exception(&mut ctx, &mut evidence, err.to_string(), &rel, false)
            }
            Err(payload) => {
                exception(&mut ctx, &mut evidence, panic_message(&*payload), &rel, true)
            }
        };

        if verdict.status == RunStatus::Fail {
            let failed_at = ctx
                .phases()
                .iter()
                .rev()
                .find(|r| r.status == PhaseStatus::Fail)
                .map(|r| r.phase)
                .unwrap_or(Phase::Exception);
            ctx.skip_remaining(failed_at);
        }
        ctx.record(Phase::Summary, PhaseStatus::Ok, Some(verdict.reason), None);

        let finished_at = Utc::now();
        let summary = SummaryRecord {
            run_id: ctx.run_id().clone(),
            status: verdict.status,
            reason: verdict.reason,
            detail: verdict.detail,
            next_action: verdict.next_action,
            evidence_dir: evidence.run_dir_rel(),
            evidence_dir_abs: evidence.run_dir().to_path_buf(),
            warnings: ctx.warnings().to_vec(),
            stash: ctx.stash().cloned(),
            started_at: ctx.started_at(),
            finished_at,
        };
        let run = RunRecord {
            run_id: ctx.run_id().clone(),
            mode: ctx.mode(),
            repo_root: ctx.settings().repo_root.clone(),
            status: summary.status,
            started_at: ctx.started_at(),
            finished_at,
            phases: ctx.phases().to_vec(),
            lock: lock_record,
            stash: ctx.stash().cloned(),
            warnings: ctx.warnings().to_vec(),
            commands: evidence.commands().to_vec(),
        };
        let report = evidence.finalize(FinalBundle {
            trace: ctx.trace(),
            run: &run,
            summary: &summary,
        });
        for err in &report.errors {
            tracing::error!(run_id = %summary.run_id, error = %err, "evidence incomplete");
        }
        tracing::info!(
            run_id = %summary.run_id,
            status = %summary.status,
            reason = %summary.reason,
            "run finished"
        );

        RunOutcome {
            summary,
            phases: run.phases,
            finalize: report,
        }
    }

    fn pipeline(
        &self,
        ctx: &mut RunContext,
        session: &mut Session<'_>,
        lock_slot: &mut Option<LockRecord>,
    ) -> Result<Completion, Halt> {
        let report = step(ctx, session, Phase::Precheck, precheck::run)?;
        let guard = step(ctx, session, Phase::Lock, |ctx, session| {
            self.acquire_lock(ctx, session)
        })?;
        *lock_slot = Some(guard.record().clone());

        let result = synchronize(ctx, session, &report);
        if result.is_err() && ctx.policy().restore_stash_on_failure {
            stash::restore(ctx, session);
        }
        release(ctx, session, guard);
        result
    }

    fn acquire_lock(
        &self,
        ctx: &mut RunContext,
        session: &mut Session<'_>,
    ) -> Result<Step<LockGuard>, Halt> {
        let path = session
            .evidence()
            .layout()
            .lock_path(&canonical(&ctx.settings().repo_root));
        let record = LockRecord {
            pid: std::process::id(),
            host: self.host.clone(),
            acquired_at: Utc::now(),
            run_id: ctx.run_id().clone(),
            evidence_dir: session.evidence().run_dir().to_path_buf(),
        };
        let timeout = ctx.policy().lock_timeout_secs;
        match lock::acquire(&path, record, timeout, self.liveness, Utc::now()) {
            Ok(guard) => {
                if let Some(old) = guard.reclaimed() {
                    ctx.warn(format!(
                        "reclaimed stale lock of run {} (pid {} on {})",
                        old.run_id, old.pid, old.host
                    ));
                }
                let detail = format!("acquired {}", guard.path().display());
                Ok(Step::ok(guard, ReasonCode::Ok).detail(detail))
            }
            Err(LockError::Held(status)) => Err(Halt::fail(
                ReasonCode::LockExists,
                format!(
                    "held by run {} (pid {} on {}, age {}s, owner {})",
                    status.record.run_id,
                    status.record.pid,
                    status.record.host,
                    status.age_secs,
                    if status.owner_alive { "alive" } else { "not alive" }
                ),
            )
            .next_action(status.record.evidence_dir.display().to_string())),
            Err(LockError::Corrupt { path, detail }) => Err(Halt::fail(
                ReasonCode::LockCorrupt,
                format!("{}: {detail}", path.display()),
            )
            .next_action(path.display().to_string())),
            Err(LockError::Engine(err)) => Err(Halt::Fault(err)),
        }
    }
}

fn synchronize(
    ctx: &mut RunContext,
    session: &mut Session<'_>,
    report: &PrecheckReport,
) -> Result<Completion, Halt> {
    step(ctx, session, Phase::Stash, |c, s| stash::run(c, s, report))?;
    step(ctx, session, Phase::Switch, |c, s| sync::switch(c, s, report))?;
    step(ctx, session, Phase::Fetch, sync::fetch)?;
    step(ctx, session, Phase::Pull, sync::pull)?;
    let outcome = step(ctx, session, Phase::Postcheck, |c, s| postcheck::run(c, s, report))?;
    Ok(match outcome.degraded {
        Some(detail) => Completion::Degraded(detail),
        None => Completion::Passed,
    })
}

/// Fail PRECHECK with a reason found before the run could start.
fn refuse(
    ctx: &mut RunContext,
    session: &mut Session<'_>,
    failure: Failure,
) -> Result<Completion, Halt> {
    ctx.push_decision(DecisionEntry {
        verdict: Some(failure.reason),
        ..DecisionEntry::at("precheck")
    });
    step(ctx, session, Phase::Precheck, |_, _| {
        Err::<Step<()>, Halt>(Halt::Fail(failure))
    })?;
    Ok(Completion::Passed)
}

/// Run one phase, record its outcome and emit its result marker.
fn step<'s, T, F>(
    ctx: &mut RunContext,
    session: &mut Session<'s>,
    phase: Phase,
    f: F,
) -> Result<T, Halt>
where
    F: FnOnce(&mut RunContext, &mut Session<'s>) -> Result<Step<T>, Halt>,
{
    tracing::debug!(run_id = %ctx.run_id(), %phase, "phase started");
    let (status, reason, detail, next_action, result) = match f(ctx, session) {
        Ok(step) => (step.status, step.reason, step.detail, None, Ok(step.value)),
        Err(Halt::Fail(failure)) => (
            PhaseStatus::Fail,
            failure.reason,
            failure.detail.clone(),
            failure.next_action.clone(),
            Err(Halt::Fail(failure)),
        ),
        Err(Halt::Fault(err)) => (
            PhaseStatus::Fail,
            ReasonCode::Exception,
            Some(err.to_string()),
            None,
            Err(Halt::Fault(err)),
        ),
    };
    tracing::info!(run_id = %ctx.run_id(), %phase, %status, %reason, "phase settled");
    if let Some(event) = MarkerEvent::for_phase(phase) {
        session.emit(
            &Marker::new(event)
                .field("run_id", ctx.run_id())
                .field("status", status)
                .field("reason", reason)
                .field_opt("detail", detail.as_deref())
                .field_opt("next_action", next_action.as_deref()),
        );
    }
    ctx.record(phase, status, Some(reason), detail);
    result
}

fn release(ctx: &mut RunContext, session: &mut Session<'_>, guard: LockGuard) {
    let path = guard.path().display().to_string();
    let (status, detail) = match guard.release() {
        Ok(ReleaseOutcome::Removed) => (ReleaseOutcome::Removed.as_str(), None),
        Ok(other) => {
            ctx.warn(format!("lock {path} was {} at release", other.as_str()));
            (other.as_str(), None)
        }
        Err(err) => {
            ctx.warn(format!("lock release failed: {err}"));
            ("error", Some(err.to_string()))
        }
    };
    session.emit(
        &Marker::new(MarkerEvent::LockRelease)
            .field("run_id", ctx.run_id())
            .field("status", status)
            .field("path", &path)
            .field_opt("detail", detail.as_deref()),
    );
}

fn failed(failure: Failure, rel: &str) -> Verdict {
    let next_action = failure.next_action.unwrap_or_else(|| {
        if failure.reason.class() == Some(FailureClass::Mutation) {
            format!("{rel}/{STDERR_FILE}")
        } else {
            failure.reason.operator_hint().to_string()
        }
    });
    Verdict {
        status: RunStatus::Fail,
        reason: failure.reason,
        detail: failure.detail,
        next_action,
    }
}

fn exception(
    ctx: &mut RunContext,
    evidence: &mut EvidenceWriter,
    message: String,
    rel: &str,
    panicked: bool,
) -> Verdict {
    tracing::error!(run_id = %ctx.run_id(), error = %message, panicked, "run aborted");
    ctx.record(
        Phase::Exception,
        PhaseStatus::Fail,
        Some(ReasonCode::Exception),
        Some(message.clone()),
    );
    evidence.append_stderr(&format!("{message}\n"));
    evidence.emit(
        &Marker::new(MarkerEvent::Exception)
            .field("run_id", ctx.run_id())
            .field("kind", if panicked { "panic" } else { "error" })
            .field("detail", &message),
    );
    Verdict {
        status: RunStatus::Fail,
        reason: ReasonCode::Exception,
        detail: Some(message),
        next_action: format!("{rel}/{STDERR_FILE}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with a non-string payload".to_string()
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
