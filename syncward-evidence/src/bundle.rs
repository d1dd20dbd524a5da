//! Per-run evidence bundle.
//!
//! Evidence emission is best-effort by construction: a failure to write one
//! artifact is logged and collected, and never prevents the remaining
//! artifacts (or the stdout marker stream) from being produced.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use syncward_core::{
    DecisionTrace, LockRecord, Mode, PhaseRecord, RunId, RunStatus, StashEntry, SummaryRecord,
};

use crate::capture::CommandCapture;
use crate::error::{io_err, EvidenceError};
use crate::layout::{
    EvidenceLayout, MANIFEST_FILE, MARKERS_FILE, RUN_FILE, STATUS_DIFF_FILE, STDERR_FILE,
    STDOUT_FILE, SUMMARY_FILE, TRACE_FILE,
};
use crate::manifest::Manifest;
use crate::marker::{Marker, MarkerEvent};
use crate::writer::{append_text, render_json, write_json_atomic, write_text_atomic};

/// Index entry for one captured subprocess; full output lives in the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureIndex {
    pub seq: u32,
    pub label: String,
    pub argv: Vec<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u128,
}

/// `run.json`: the phase history and run-level facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub mode: Mode,
    pub repo_root: PathBuf,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash: Option<StashEntry>,
    pub warnings: Vec<String>,
    pub commands: Vec<CaptureIndex>,
}

/// Everything `finalize` persists.
#[derive(Debug, Clone, Copy)]
pub struct FinalBundle<'a> {
    pub trace: &'a DecisionTrace,
    pub run: &'a RunRecord,
    pub summary: &'a SummaryRecord,
}

/// Outcome of [`EvidenceWriter::finalize`].
#[derive(Debug, Default)]
pub struct FinalizeReport {
    pub summary_written: bool,
    pub errors: Vec<String>,
}

impl FinalizeReport {
    pub fn is_complete(&self) -> bool {
        self.summary_written && self.errors.is_empty()
    }
}

#[derive(Debug)]
pub struct EvidenceWriter {
    layout: EvidenceLayout,
    run_id: RunId,
    run_dir: PathBuf,
    echo: bool,
    commands: Vec<CaptureIndex>,
    errors: Vec<String>,
    finalized: bool,
}

impl EvidenceWriter {
    /// Prepare `runs/<run_id>/`. A failure to create the directory is
    /// recorded; markers still reach stdout when `echo` is set.
    pub fn create(layout: EvidenceLayout, run_id: RunId, echo: bool) -> Self {
        let run_dir = layout.run_dir(&run_id);
        let mut writer = Self {
            layout,
            run_id,
            run_dir,
            echo,
            commands: Vec::new(),
            errors: Vec::new(),
            finalized: false,
        };
        if let Err(err) = std::fs::create_dir_all(&writer.run_dir) {
            writer.note(io_err(&writer.run_dir, err));
        }
        if let Err(err) = writer.layout.ensure_ignored() {
            writer.note(err);
        }
        writer
    }

    pub fn layout(&self) -> &EvidenceLayout {
        &self.layout
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn run_dir_rel(&self) -> PathBuf {
        self.layout.run_dir_rel(&self.run_id)
    }

    pub fn commands(&self) -> &[CaptureIndex] {
        &self.commands
    }

    /// Print `marker` to stdout (when echoing) and append it to `markers.log`.
    pub fn emit(&mut self, marker: &Marker) {
        let line = marker.render();
        if self.echo {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let _ = writeln!(lock, "{line}");
            let _ = lock.flush();
        }
        let path = self.run_dir.join(MARKERS_FILE);
        if let Err(err) = append_text(&path, &format!("{line}\n")) {
            self.note(err);
        }
    }

    /// Append a subprocess's output verbatim to the combined logs.
    pub fn capture(&mut self, capture: &CommandCapture) {
        let seq = self.commands.len() as u32 + 1;
        let header = capture.header(seq);
        let out = self.run_dir.join(STDOUT_FILE);
        let err = self.run_dir.join(STDERR_FILE);
        if let Err(e) = append_text(&out, &section(&header, &capture.stdout)) {
            self.note(e);
        }
        if let Err(e) = append_text(&err, &section(&header, &capture.stderr)) {
            self.note(e);
        }
        self.commands.push(CaptureIndex {
            seq,
            label: capture.label.clone(),
            argv: capture.argv.clone(),
            exit_code: capture.exit_code,
            duration_ms: capture.duration_ms,
        });
    }

    /// Append free-form diagnostic text (e.g. an exception message) to `stderr.log`.
    pub fn append_stderr(&mut self, text: &str) {
        let path = self.run_dir.join(STDERR_FILE);
        if let Err(e) = append_text(&path, &section("==> [engine]\n", text)) {
            self.note(e);
        }
    }

    pub fn write_status_diff(&mut self, diff: &str) {
        let path = self.run_dir.join(STATUS_DIFF_FILE);
        if let Err(e) = write_text_atomic(&path, diff) {
            self.note(e);
        }
    }

    /// Persist the terminal artifacts. Order is fixed: decision trace, run
    /// record, `summary`/`run-end` markers, manifest (which covers the summary
    /// bytes rendered up front), `LATEST`, and the summary last of all. Calling this twice is a no-op that reports an error.
    pub fn finalize(&mut self, bundle: FinalBundle<'_>) -> FinalizeReport {
        if self.finalized {
            return FinalizeReport {
                summary_written: false,
                errors: vec!["evidence already finalized for this run".to_string()],
            };
        }
        self.finalized = true;

        if let Err(e) = write_json_atomic(&self.run_dir.join(TRACE_FILE), bundle.trace) {
            self.note(e);
        }
        if let Err(e) = write_json_atomic(&self.run_dir.join(RUN_FILE), bundle.run) {
            self.note(e);
        }

        let summary = bundle.summary;
        self.emit(
            &Marker::new(MarkerEvent::Summary)
                .field("run_id", &summary.run_id)
                .field("status", summary.status)
                .field("reason", summary.reason)
                .field_opt("detail", summary.detail.as_deref())
                .field("next_action", &summary.next_action)
                .field("evidence", summary.evidence_dir.display())
                .field("warnings", summary.warnings.len())
                .field_opt("stash", summary.stash.as_ref().map(|s| s.reference.as_str())),
        );
        let duration_ms = (summary.finished_at - summary.started_at)
            .num_milliseconds()
            .max(0);
        self.emit(
            &Marker::new(MarkerEvent::RunEnd)
                .field("run_id", &summary.run_id)
                .field("status", summary.status)
                .field("exit_code", summary.status.exit_code())
                .field("duration_ms", duration_ms),
        );

        let summary_path = self.run_dir.join(SUMMARY_FILE);
        let summary_text = match render_json(&summary_path, bundle.summary) {
            Ok(text) => Some(text),
            Err(e) => {
                self.note(e);
                None
            }
        };

        match Manifest::build(&self.run_id, &self.run_dir) {
            Ok(mut manifest) => {
                if let Some(text) = &summary_text {
                    manifest.record(SUMMARY_FILE, text.as_bytes());
                }
                if let Err(e) = write_json_atomic(&self.run_dir.join(MANIFEST_FILE), &manifest) {
                    self.note(e);
                }
            }
            Err(e) => self.note(e),
        }

        let pointer = format!("{}\n", pointer_text(&self.run_dir_rel()));
        if let Err(e) = write_text_atomic(&self.layout.latest_pointer_path(), &pointer) {
            self.note(e);
        }

        let summary_written = match summary_text {
            Some(text) => match write_text_atomic(&summary_path, &text) {
                Ok(()) => true,
                Err(e) => {
                    self.note(e);
                    false
                }
            },
            None => false,
        };

        FinalizeReport {
            summary_written,
            errors: self.errors.clone(),
        }
    }

    fn note(&mut self, err: EvidenceError) {
        tracing::error!(run_id = %self.run_id, error = %err, "evidence write failed");
        self.errors.push(err.to_string());
    }
}

fn section(header: &str, body: &str) -> String {
    let body = body.strip_prefix('\u{feff}').unwrap_or(body);
    let mut out = String::with_capacity(header.len() + body.len() + 1);
    out.push_str(header);
    out.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Forward-slash form so the pointer is byte-identical across platforms.
fn pointer_text(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use syncward_core::{Phase, PhaseStatus, Policy, ReasonCode, ResolvedInputs};
    use tempfile::TempDir;

    fn trace() -> DecisionTrace {
        DecisionTrace {
            inputs: ResolvedInputs {
                repo_root: PathBuf::from("/repo"),
                evidence_root: PathBuf::from("/ev"),
                invocation_dir: PathBuf::from("/repo"),
                mode: Mode::DryRun,
                policy: Policy::default(),
                expected_upstream: "origin/main".into(),
                expected_remote_url: None,
                consistency_check: false,
            },
            entries: vec![],
        }
    }

    fn records(run_id: &RunId, rel: PathBuf, abs: PathBuf) -> (RunRecord, SummaryRecord) {
        let now = Utc::now();
        let run = RunRecord {
            run_id: run_id.clone(),
            mode: Mode::DryRun,
            repo_root: PathBuf::from("/repo"),
            status: RunStatus::Pass,
            started_at: now,
            finished_at: now,
            phases: vec![PhaseRecord {
                phase: Phase::Precheck,
                status: PhaseStatus::Ok,
                at: now,
                reason: None,
                detail: None,
            }],
            lock: None,
            stash: None,
            warnings: vec![],
            commands: vec![],
        };
        let summary = SummaryRecord {
            run_id: run_id.clone(),
            status: RunStatus::Pass,
            reason: ReasonCode::Ok,
            detail: None,
            next_action: "none".into(),
            evidence_dir: rel,
            evidence_dir_abs: abs,
            warnings: vec![],
            stash: None,
            started_at: now,
            finished_at: now,
        };
        (run, summary)
    }

    #[test]
    fn finalize_writes_every_artifact_and_pointer() {
        let tmp = TempDir::new().unwrap();
        let run_id = RunId::from("r1");
        let mut writer = EvidenceWriter::create(EvidenceLayout::new(tmp.path()), run_id.clone(), false);
        writer.emit(&Marker::new(MarkerEvent::RunStart).field("run_id", &run_id));
        let (run, summary) = records(&run_id, writer.run_dir_rel(), writer.run_dir().to_path_buf());
        let trace = trace();

        let report = writer.finalize(FinalBundle {
            trace: &trace,
            run: &run,
            summary: &summary,
        });
        assert!(report.is_complete(), "errors: {:?}", report.errors);

        let dir = tmp.path().join("runs/r1");
        for file in [SUMMARY_FILE, TRACE_FILE, RUN_FILE, MANIFEST_FILE, MARKERS_FILE] {
            assert!(dir.join(file).exists(), "missing {file}");
        }
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("LATEST")).unwrap(),
            "runs/r1\n"
        );
    }

    #[test]
    fn summary_and_run_end_markers_appear_exactly_once() {
        let tmp = TempDir::new().unwrap();
        let run_id = RunId::from("r2");
        let mut writer = EvidenceWriter::create(EvidenceLayout::new(tmp.path()), run_id.clone(), false);
        let (run, summary) = records(&run_id, writer.run_dir_rel(), writer.run_dir().to_path_buf());
        let trace = trace();
        let bundle = FinalBundle {
            trace: &trace,
            run: &run,
            summary: &summary,
        };
        writer.finalize(bundle);
        let second = writer.finalize(bundle);
        assert!(!second.summary_written);

        let markers = std::fs::read_to_string(tmp.path().join("runs/r2").join(MARKERS_FILE)).unwrap();
        assert_eq!(markers.matches("event=summary").count(), 1);
        assert_eq!(markers.matches("event=run-end").count(), 1);
    }

    #[test]
    fn captures_are_appended_with_headers() {
        let tmp = TempDir::new().unwrap();
        let mut writer =
            EvidenceWriter::create(EvidenceLayout::new(tmp.path()), RunId::from("r3"), false);
        writer.capture(&CommandCapture {
            label: "fetch".into(),
            argv: vec!["git".into(), "fetch".into()],
            exit_code: Some(0),
            stdout: "out\r\n".into(),
            stderr: "From origin".into(),
            started_at: Utc::now(),
            duration_ms: 5,
        });
        let out = std::fs::read_to_string(writer.run_dir().join(STDOUT_FILE)).unwrap();
        let err = std::fs::read_to_string(writer.run_dir().join(STDERR_FILE)).unwrap();
        assert!(out.starts_with("==> [001] fetch"));
        assert!(out.ends_with("out\n"));
        assert!(err.ends_with("From origin\n"));
        assert_eq!(writer.commands().len(), 1);
    }

    #[test]
    fn unwritable_root_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let file_root = tmp.path().join("not-a-dir");
        std::fs::write(&file_root, "x").unwrap();
        let run_id = RunId::from("r4");
        let mut writer = EvidenceWriter::create(EvidenceLayout::new(&file_root), run_id.clone(), false);
        writer.emit(&Marker::new(MarkerEvent::RunStart));
        let (run, summary) = records(&run_id, writer.run_dir_rel(), writer.run_dir().to_path_buf());
        let trace = trace();
        let report = writer.finalize(FinalBundle {
            trace: &trace,
            run: &run,
            summary: &summary,
        });
        assert!(!report.summary_written);
        assert!(!report.errors.is_empty());
    }
}
