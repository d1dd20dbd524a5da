//! Verbatim record of one subprocess invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCapture {
    /// Short label such as `status-before` or `pull`.
    pub label: String,
    pub argv: Vec<String>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
}

impl CommandCapture {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First non-empty stderr line, falling back to stdout; used in marker details.
    pub fn headline(&self) -> String {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
            .to_string()
    }

    /// Section header used in the combined stdout/stderr logs.
    pub(crate) fn header(&self, seq: u32) -> String {
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        format!(
            "==> [{seq:03}] {} | {} | exit={code} | {}ms | {}\n",
            self.label,
            self.argv.join(" "),
            self.duration_ms,
            self.started_at.to_rfc3339(),
        )
    }
}
