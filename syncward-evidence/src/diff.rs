//! Unified diff of working-tree status snapshots.

use similar::TextDiff;

/// Unified diff between two status snapshots, or `None` when they are
/// byte-identical.
pub fn status_diff(before: &str, after: &str) -> Option<String> {
    if before.as_bytes() == after.as_bytes() {
        return None;
    }
    let unified = TextDiff::from_lines(before, after)
        .unified_diff()
        .header("a/status.before", "b/status.after")
        .context_radius(3)
        .to_string();
    Some(unified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_snapshots_have_no_diff() {
        assert!(status_diff(" M src/lib.rs\n", " M src/lib.rs\n").is_none());
        assert!(status_diff("", "").is_none());
    }

    #[test]
    fn changed_snapshot_produces_unified_diff() {
        let diff = status_diff("", "?? new.txt\n").expect("diff");
        assert!(diff.contains("--- a/status.before"));
        assert!(diff.contains("+++ b/status.after"));
        assert!(diff.contains("+?? new.txt"));
    }
}
