//! Marker-line micro-protocol.
//!
//! Each marker is one line: a stable prefix followed by pipe-delimited
//! `key=value` fields, the first of which is always `event`:
//!
//! ```text
//! SYNCWARD|event=lock-result|run_id=20261016T101500123Z-4242|status=OK|reason=ok
//! ```
//!
//! Values never contain `|`, CR or LF; [`Marker::field`] replaces them.

use std::fmt;

use syncward_core::Phase;

pub const MARKER_PREFIX: &str = "SYNCWARD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEvent {
    RunStart,
    PrecheckResult,
    LockResult,
    StashResult,
    SwitchResult,
    FetchResult,
    PullResult,
    PostcheckResult,
    CheckResult,
    LockRelease,
    Summary,
    RunEnd,
    Exception,
}

impl MarkerEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkerEvent::RunStart => "run-start",
            MarkerEvent::PrecheckResult => "precheck-result",
            MarkerEvent::LockResult => "lock-result",
            MarkerEvent::StashResult => "stash-result",
            MarkerEvent::SwitchResult => "switch-result",
            MarkerEvent::FetchResult => "fetch-result",
            MarkerEvent::PullResult => "pull-result",
            MarkerEvent::PostcheckResult => "postcheck-result",
            MarkerEvent::CheckResult => "check-result",
            MarkerEvent::LockRelease => "lock-release",
            MarkerEvent::Summary => "summary",
            MarkerEvent::RunEnd => "run-end",
            MarkerEvent::Exception => "exception",
        }
    }

    /// Result event emitted when a pipeline phase settles.
    pub fn for_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Precheck => Some(MarkerEvent::PrecheckResult),
            Phase::Lock => Some(MarkerEvent::LockResult),
            Phase::Stash => Some(MarkerEvent::StashResult),
            Phase::Switch => Some(MarkerEvent::SwitchResult),
            Phase::Fetch => Some(MarkerEvent::FetchResult),
            Phase::Pull => Some(MarkerEvent::PullResult),
            Phase::Postcheck => Some(MarkerEvent::PostcheckResult),
            Phase::Init | Phase::Summary | Phase::Exception => None,
        }
    }
}

impl fmt::Display for MarkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A marker line under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    event: MarkerEvent,
    fields: Vec<(String, String)>,
}

impl Marker {
    pub fn new(event: MarkerEvent) -> Self {
        Self {
            event,
            fields: Vec::new(),
        }
    }

    pub fn event(&self) -> MarkerEvent {
        self.event
    }

    /// Append `key=value`. Keys are expected to be static identifiers.
    pub fn field(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.fields
            .push((key.to_string(), sanitize_value(&value.to_string())));
        self
    }

    /// Append `key=value` only when `value` is present.
    pub fn field_opt(self, key: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// Rendered line without trailing newline.
    pub fn render(&self) -> String {
        let mut line = format!("{MARKER_PREFIX}|event={}", self.event);
        for (key, value) in &self.fields {
            line.push('|');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn sanitize_value(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '|' => '/',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// A marker line parsed back into its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarker {
    pub prefix: String,
    pub fields: Vec<(String, String)>,
}

impl ParsedMarker {
    /// Parse `line` if it starts with `prefix|`. Segments without `=` are ignored.
    pub fn parse(line: &str, prefix: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let rest = line.strip_prefix(prefix)?.strip_prefix('|')?;
        let fields = rest
            .split('|')
            .filter_map(|segment| segment.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .collect();
        Some(Self {
            prefix: prefix.to_string(),
            fields,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn event(&self) -> Option<&str> {
        self.get("event")
    }
}
