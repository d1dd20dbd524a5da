//! Per-invocation run context.
//!
//! A [`RunContext`] is created once by the orchestrator and passed by `&mut`
//! to every phase. Its settings are immutable; only the phase history, the
//! decision trace, warnings and the stash entry accumulate.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::ConsistencyCheck;
use crate::reason::ReasonCode;
use crate::types::{
    DecisionEntry, DecisionTrace, Mode, Phase, PhaseRecord, PhaseStatus, Policy, ResolvedInputs,
    RunId, StashEntry, UpstreamRef,
};

/// Everything the caller decides before a run starts.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub repo_root: PathBuf,
    pub evidence_root: PathBuf,
    /// Directory the engine was invoked from; must equal the repository top level.
    pub invocation_dir: PathBuf,
    pub mode: Mode,
    pub policy: Policy,
    pub upstream: UpstreamRef,
    /// Regular expression the remote URL must match.
    pub expected_remote_url: Option<String>,
    /// Explicit git executable; resolved from `PATH` when `None`.
    pub git_program: Option<PathBuf>,
    /// Directories (and their descendants) the engine refuses to run in.
    pub restricted_dirs: Vec<PathBuf>,
    pub consistency_check: Option<ConsistencyCheck>,
}

impl RunSettings {
    /// Local branch the run synchronizes: the upstream's branch name.
    pub fn expected_branch(&self) -> &str {
        &self.upstream.branch
    }

    fn resolved_inputs(&self) -> ResolvedInputs {
        ResolvedInputs {
            repo_root: self.repo_root.clone(),
            evidence_root: self.evidence_root.clone(),
            invocation_dir: self.invocation_dir.clone(),
            mode: self.mode,
            policy: self.policy.clone(),
            expected_upstream: self.upstream.to_string(),
            expected_remote_url: self.expected_remote_url.clone(),
            consistency_check: self.consistency_check.is_some(),
        }
    }
}

#[derive(Debug)]
pub struct RunContext {
    run_id: RunId,
    started_at: DateTime<Utc>,
    settings: RunSettings,
    phases: Vec<PhaseRecord>,
    trace: DecisionTrace,
    warnings: Vec<String>,
    stash: Option<StashEntry>,
}

impl RunContext {
    pub fn new(settings: RunSettings, now: DateTime<Utc>, pid: u32) -> Self {
        let trace = DecisionTrace {
            inputs: settings.resolved_inputs(),
            entries: Vec::new(),
        };
        Self {
            run_id: RunId::generate(now, pid),
            started_at: now,
            settings,
            phases: Vec::new(),
            trace,
            warnings: Vec::new(),
            stash: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    pub fn policy(&self) -> &Policy {
        &self.settings.policy
    }

    pub fn phases(&self) -> &[PhaseRecord] {
        &self.phases
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.phases.iter().find(|r| r.phase == phase)
    }

    pub fn trace(&self) -> &DecisionTrace {
        &self.trace
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn stash(&self) -> Option<&StashEntry> {
        self.stash.as_ref()
    }

    /// Record a phase outcome.
    ///
    /// One entry per phase: a second record for the same phase replaces the
    /// first only when it is a failure.
    pub fn record(
        &mut self,
        phase: Phase,
        status: PhaseStatus,
        reason: Option<ReasonCode>,
        detail: Option<String>,
    ) {
        let record = PhaseRecord {
            phase,
            status,
            at: Utc::now(),
            reason,
            detail,
        };
        match self.phases.iter_mut().find(|r| r.phase == phase) {
            Some(existing) if status == PhaseStatus::Fail => *existing = record,
            Some(_) => {}
            None => self.phases.push(record),
        }
    }

    /// Mark every pipeline phase after `failed` that has no record yet as skipped.
    pub fn skip_remaining(&mut self, failed: Phase) {
        let Some(pos) = Phase::PIPELINE.iter().position(|p| *p == failed) else {
            // INIT/EXCEPTION: nothing in the pipeline ran.
            for phase in Phase::PIPELINE {
                self.skip_if_unrecorded(phase);
            }
            return;
        };
        for phase in &Phase::PIPELINE[pos + 1..] {
            self.skip_if_unrecorded(*phase);
        }
    }

    fn skip_if_unrecorded(&mut self, phase: Phase) {
        if self.phase(phase).is_none() {
            self.record(phase, PhaseStatus::Skip, Some(ReasonCode::PriorFailure), None);
        }
    }

    pub fn push_decision(&mut self, entry: DecisionEntry) {
        self.trace.entries.push(entry);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(run_id = %self.run_id, "{warning}");
        self.warnings.push(warning);
    }

    pub fn set_stash(&mut self, entry: StashEntry) {
        self.stash = Some(entry);
    }
}
