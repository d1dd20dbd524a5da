//! The I/O half of a run: the resolved git runner plus the evidence writer.
//!
//! Every git invocation goes through [`Session::git`], so each command's full
//! output lands in the run's `stdout.log`/`stderr.log` before any decision is
//! made from it.

use std::path::{Path, PathBuf};

use syncward_evidence::{CommandCapture, EvidenceWriter, Marker};

use crate::error::EngineError;
use crate::process::run_captured;
use crate::status::parse_left_right;

/// Pins git to non-interactive, untranslated output.
const GIT_ENV: [(&str, &str); 3] = [
    ("GIT_TERMINAL_PROMPT", "0"),
    ("LC_ALL", "C"),
    ("GIT_OPTIONAL_LOCKS", "0"),
];

#[derive(Debug, Clone)]
pub struct Git {
    program: PathBuf,
    work_dir: PathBuf,
}

impl Git {
    pub fn new(program: PathBuf, work_dir: PathBuf) -> Self {
        Self { program, work_dir }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn run(&self, label: &str, args: &[&str]) -> Result<CommandCapture, EngineError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        run_captured(label, &self.program, &args, &self.work_dir, &GIT_ENV)
    }
}

pub struct Session<'a> {
    evidence: &'a mut EvidenceWriter,
    git: Option<Git>,
}

impl<'a> Session<'a> {
    pub fn new(evidence: &'a mut EvidenceWriter) -> Self {
        Self { evidence, git: None }
    }

    pub fn set_git(&mut self, git: Git) {
        self.git = Some(git);
    }

    pub fn evidence(&mut self) -> &mut EvidenceWriter {
        self.evidence
    }

    pub fn emit(&mut self, marker: &Marker) {
        self.evidence.emit(marker);
    }

    /// Record a capture produced outside git (e.g. the consistency check).
    pub fn record(&mut self, capture: &CommandCapture) {
        self.evidence.capture(capture);
    }

    /// Run a git subcommand and record its output. Non-zero exits are data.
    pub fn git(&mut self, label: &str, args: &[&str]) -> Result<CommandCapture, EngineError> {
        let git = self.git.as_ref().ok_or(EngineError::GitNotResolved)?;
        let capture = git.run(label, args)?;
        self.evidence.capture(&capture);
        Ok(capture)
    }

    /// Like [`Session::git`], but a non-zero exit is a fault.
    pub fn git_ok(&mut self, label: &str, args: &[&str]) -> Result<CommandCapture, EngineError> {
        let capture = self.git(label, args)?;
        if capture.success() {
            Ok(capture)
        } else {
            Err(EngineError::GitQuery {
                label: label.to_string(),
                code: capture.exit_code,
                message: capture.headline(),
            })
        }
    }

    /// Full porcelain status snapshot, untracked files listed individually.
    pub fn status_snapshot(&mut self, label: &str) -> Result<String, EngineError> {
        Ok(self
            .git_ok(label, &["status", "--porcelain=v1", "--untracked-files=all"])?
            .stdout)
    }

    /// `Some(branch)` when HEAD is a symbolic ref, `None` when detached.
    pub fn current_branch(&mut self, label: &str) -> Result<Option<String>, EngineError> {
        let cap = self.git(label, &["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        match cap.exit_code {
            Some(0) => Ok(Some(cap.stdout.trim().to_string())),
            Some(1) => Ok(None),
            code => Err(EngineError::GitQuery {
                label: label.to_string(),
                code,
                message: cap.headline(),
            }),
        }
    }

    /// Object id `rev` resolves to, or `None` when it does not exist.
    pub fn resolve_ref(&mut self, label: &str, rev: &str) -> Result<Option<String>, EngineError> {
        let cap = self.git(label, &["rev-parse", "--verify", "--quiet", rev])?;
        let id = cap.stdout.trim();
        Ok((cap.success() && !id.is_empty()).then(|| id.to_string()))
    }

    /// Commits `(ahead, behind)` of `local` relative to `upstream`.
    pub fn ahead_behind(
        &mut self,
        label: &str,
        local: &str,
        upstream: &str,
    ) -> Result<(u32, u32), EngineError> {
        let range = format!("{local}...{upstream}");
        let cap = self.git_ok(label, &["rev-list", "--left-right", "--count", &range])?;
        parse_left_right(&cap.stdout).ok_or_else(|| EngineError::GitOutput {
            label: label.to_string(),
            output: cap.stdout.clone(),
        })
    }

    /// Absolute path of the repository's git directory.
    pub fn git_dir(&mut self, label: &str) -> Result<PathBuf, EngineError> {
        let cap = self.git_ok(label, &["rev-parse", "--git-dir"])?;
        let raw = PathBuf::from(cap.stdout.trim());
        if raw.is_absolute() {
            return Ok(raw);
        }
        let base = self
            .git
            .as_ref()
            .map(|g| g.work_dir().to_path_buf())
            .ok_or(EngineError::GitNotResolved)?;
        Ok(base.join(raw))
    }
}
