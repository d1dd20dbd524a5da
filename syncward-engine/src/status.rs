//! Parsing of `git status --porcelain=v1` and `rev-list --left-right --count`.

use syncward_core::TreeClass;

/// Two-letter porcelain codes that denote an unmerged path.
const UNMERGED_CODES: [&str; 7] = ["DD", "AU", "UD", "UA", "DU", "AA", "UU"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub tracked: Vec<String>,
    pub untracked: Vec<String>,
    pub unmerged: Vec<String>,
}

impl StatusSummary {
    pub fn parse(porcelain: &str) -> Self {
        let mut summary = Self::default();
        for line in porcelain.lines() {
            if line.len() < 3 {
                continue;
            }
            let (code, rest) = line.split_at(2);
            let path = rest.trim_start().to_string();
            if code == "??" {
                summary.untracked.push(path);
            } else if code == "!!" {
                // Ignored files are not part of the worktree state.
            } else if UNMERGED_CODES.contains(&code) {
                summary.unmerged.push(path);
            } else {
                summary.tracked.push(path);
            }
        }
        summary
    }

    /// Unmerged paths count as tracked modifications.
    pub fn tracked_dirty(&self) -> usize {
        self.tracked.len() + self.unmerged.len()
    }

    pub fn classify(&self) -> TreeClass {
        if self.tracked_dirty() > 0 {
            TreeClass::TrackedDirty
        } else if !self.untracked.is_empty() {
            TreeClass::UntrackedOnly
        } else {
            TreeClass::Clean
        }
    }
}

/// Parse `"<left>\t<right>"` into `(ahead, behind)`.
pub fn parse_left_right(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((ahead, behind))
}
