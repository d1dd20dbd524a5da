//! Subprocess execution with verbatim capture, and git executable discovery.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use chrono::Utc;

use syncward_evidence::CommandCapture;

use crate::error::EngineError;

/// Run `program args..` in `cwd` and capture everything it printed.
///
/// Only a failure to start is an error; a non-zero exit is returned as data.
pub fn run_captured(
    label: &str,
    program: &Path,
    args: &[String],
    cwd: &Path,
    env: &[(&str, &str)],
) -> Result<CommandCapture, EngineError> {
    let started_at = Utc::now();
    let clock = Instant::now();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }
    let output = cmd.output().map_err(|source| EngineError::Spawn {
        program: program.to_path_buf(),
        source,
    })?;

    let capture = CommandCapture {
        label: label.to_string(),
        argv: std::iter::once(program.display().to_string())
            .chain(args.iter().cloned())
            .collect(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        started_at,
        duration_ms: clock.elapsed().as_millis(),
    };
    tracing::debug!(
        label,
        exit = ?capture.exit_code,
        duration_ms = capture.duration_ms as u64,
        "command finished"
    );
    Ok(capture)
}

/// Locate the git executable.
///
/// An explicit path containing a separator must name an existing file; a bare
/// name (or the default `git`) is searched on `PATH`.
pub fn resolve_git(explicit: Option<&Path>) -> Option<PathBuf> {
    let wanted = explicit.unwrap_or_else(|| Path::new("git"));
    if wanted.components().count() > 1 || wanted.is_absolute() {
        return wanted.is_file().then(|| wanted.to_path_buf());
    }
    search_path(wanted)
}

fn search_path(name: &Path) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) && candidate.extension().is_none() {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}
