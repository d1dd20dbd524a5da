//! Byte-stable text writers.
//!
//! ## `write_text_atomic`: protocol
//!
//! 1. Normalise content: drop a leading BOM, CRLF and lone CR become LF.
//! 2. Ensure the parent directory exists.
//! 3. Write to `<path>.syncward.tmp`.
//! 4. Rename to final path (atomic on POSIX).
//! 5. On rename failure remove the tmp file and report the target path.
//!
//! Append-only logs go through [`append_text`], which applies the same
//! normalisation so every evidence artifact is UTF-8, BOM-free and LF-only.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{io_err, json_err, EvidenceError};

const BOM: char = '\u{feff}';

/// Normalise text for evidence: no BOM, LF line endings only.
pub fn normalize_text(content: &str) -> String {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Atomically replace `path` with normalised `content`.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), EvidenceError> {
    let tmp = PathBuf::from(format!("{}.syncward.tmp", path.display()));
    write_text_atomic_with_tmp(path, content, &tmp)
}

fn write_text_atomic_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<(), EvidenceError> {
    let normalized = normalize_text(content);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, normalized.as_bytes()).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!(path = %path.display(), "wrote evidence file");
    Ok(())
}

/// Pretty JSON with a trailing newline, exactly as [`write_json_atomic`]
/// puts it on disk. `path` only labels errors.
pub fn render_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<String, EvidenceError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| json_err(path, e))?;
    json.push('\n');
    Ok(normalize_text(&json))
}

/// Serialize `value` as pretty JSON with a trailing newline and write it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), EvidenceError> {
    write_text_atomic(path, &render_json(path, value)?)
}

/// Append normalised `content` to `path`, creating it if needed.
pub fn append_text(path: &Path, content: &str) -> Result<(), EvidenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(normalize_text(content).as_bytes())
        .map_err(|e| io_err(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn normalize_strips_bom_and_carriage_returns() {
        assert_eq!(normalize_text("\u{feff}a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(normalize_text("plain\n"), "plain\n");
    }

    #[test]
    fn crlf_content_lands_as_lf() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("summary.json");
        write_text_atomic(&path, "line1\r\nline2\r\n").unwrap();
        let disk = fs::read(&path).unwrap();
        assert_eq!(disk, b"line1\nline2\n");
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.json");
        write_text_atomic(&path, "{}").unwrap();
        let tmp_path = PathBuf::from(format!("{}.syncward.tmp", path.display()));
        assert!(!tmp_path.exists(), ".syncward.tmp must be cleaned up");
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("runs").join("r1").join("summary.json");
        write_text_atomic(&path, "{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn json_has_trailing_newline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("value.json");
        write_json_atomic(&path, &serde_json::json!({"a": 1})).unwrap();
        let disk = fs::read_to_string(&path).unwrap();
        assert!(disk.ends_with("}\n"), "got {disk:?}");
    }

    #[test]
    fn append_accumulates_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("markers.log");
        append_text(&path, "one\r\n").unwrap();
        append_text(&path, "two\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("summary.json");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("summary.json.syncward.tmp");

        let result = write_text_atomic_with_tmp(&path, "new content", &tmp_path);

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // Root may bypass directory permissions; only assert when it did fail.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
            assert!(!tmp_path.exists(), ".syncward.tmp should be cleaned up");
        }
    }
}
