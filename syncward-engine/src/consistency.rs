//! Optional secondary consistency checker.
//!
//! The checker is any program that prints marker lines of the form
//! `<PREFIX>|event=...|status=PASS`. The last such line carrying a `status`
//! field decides the verdict, together with the exit code.

use syncward_core::ConsistencyCheck;
use syncward_evidence::{CommandCapture, ParsedMarker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckVerdict {
    pub passed: bool,
    pub exit_code: Option<i32>,
    /// Value of the deciding `status=` field, if any line carried one.
    pub token: Option<String>,
    pub detail: String,
}

pub fn evaluate(check: &ConsistencyCheck, capture: &CommandCapture) -> CheckVerdict {
    let token = capture
        .stdout
        .lines()
        .filter_map(|line| ParsedMarker::parse(line.trim_end(), &check.token_prefix))
        .filter_map(|marker| marker.get("status").map(str::to_string))
        .last();
    let token_pass = token
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("PASS"));
    let passed = capture.success() && token_pass;
    let detail = match (&token, capture.exit_code) {
        (None, code) => format!("no {} status line (exit {})", check.token_prefix, code_str(code)),
        (Some(t), code) => format!("status={t} exit={}", code_str(code)),
    };
    CheckVerdict {
        passed,
        exit_code: capture.exit_code,
        token,
        detail,
    }
}

fn code_str(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}
