//! Line-oriented mutation of flat text files.
//!
//! Every persistent file this tool touches (the config store, dnsmasq-style
//! snippets, exports lists) is treated as an ordered sequence of lines. All
//! mutations are whole-file rewrites; there is no OS-level atomicity and no
//! locking between concurrent invocations (last writer wins).

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::write_file_with_dirs;

/// Read a file as a list of lines with terminators stripped.
///
/// A missing file is an empty file, not an error.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(content.lines().map(str::to_string).collect())
}

/// Overwrite a file with the given lines, each newline-terminated.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut content = lines.join("\n");
    content.push('\n');
    write_file_with_dirs(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Replace every line containing `marker` with `new_line`, wholesale.
///
/// If no line matches, `new_line` is appended as a new final line. All
/// matching lines are replaced, not just the first, so duplicate entries
/// collapse to copies of `new_line`.
pub fn replace_line_or_append(path: &Path, marker: &str, new_line: &str) -> Result<()> {
    let mut lines = read_lines(path)?;
    let mut found = false;

    for line in lines.iter_mut() {
        if line.contains(marker) {
            *line = new_line.to_string();
            found = true;
        }
    }

    if !found {
        lines.push(new_line.to_string());
    }

    write_lines(path, &lines)
}

/// In every line containing `marker`, replace just that substring in place.
///
/// The rest of each matched line is untouched. Unlike
/// [`replace_line_or_append`], nothing is appended when no line matches;
/// the file is left as-is and that is a normal outcome.
pub fn replace_fragment(path: &Path, marker: &str, replacement: &str) -> Result<()> {
    let mut lines = read_lines(path)?;
    let mut found = false;

    for line in lines.iter_mut() {
        if line.contains(marker) {
            *line = line.replace(marker, replacement);
            found = true;
        }
    }

    if found {
        write_lines(path, &lines)?;
    }
    Ok(())
}

/// Check whether any line of the file contains `marker`.
pub fn contains_marker(path: &Path, marker: &str) -> Result<bool> {
    Ok(read_lines(path)?.iter().any(|line| line.contains(marker)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let result = read_lines(&dir.path().join("absent")).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        let original = lines(&["first", "second", "third"]);

        write_lines(&path, &original).unwrap();
        assert_eq!(read_lines(&path).unwrap(), original);

        // File on disk ends with exactly one trailing newline.
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with("third\n"));
        assert!(!raw.ends_with("\n\n"));
    }

    #[test]
    fn test_replace_line_replaces_whole_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        write_lines(&path, &lines(&["a", "b", "c"])).unwrap();

        replace_line_or_append(&path, "b", "X").unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines(&["a", "X", "c"]));
    }

    #[test]
    fn test_replace_line_appends_when_unmatched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        write_lines(&path, &lines(&["a", "b", "c"])).unwrap();

        replace_line_or_append(&path, "z", "X").unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines(&["a", "b", "c", "X"]));
    }

    #[test]
    fn test_replace_line_replaces_all_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        write_lines(&path, &lines(&["opt=1", "other", "opt=2"])).unwrap();

        replace_line_or_append(&path, "opt", "opt=3").unwrap();
        assert_eq!(
            read_lines(&path).unwrap(),
            lines(&["opt=3", "other", "opt=3"])
        );
    }

    #[test]
    fn test_replace_line_on_missing_file_creates_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent");

        replace_line_or_append(&path, "anything", "X").unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines(&["X"]));
    }

    #[test]
    fn test_replace_fragment_keeps_rest_of_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        write_lines(&path, &lines(&["root=/dev/nbd0 rw", "quiet"])).unwrap();

        replace_fragment(&path, "/dev/nbd0", "/dev/nbd1").unwrap();
        assert_eq!(
            read_lines(&path).unwrap(),
            lines(&["root=/dev/nbd1 rw", "quiet"])
        );
    }

    #[test]
    fn test_replace_fragment_no_match_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        write_lines(&path, &lines(&["ab", "cd"])).unwrap();

        replace_fragment(&path, "z", "Q").unwrap();
        assert_eq!(read_lines(&path).unwrap(), lines(&["ab", "cd"]));
    }

    #[test]
    fn test_contains_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        write_lines(&path, &lines(&["alpha", "beta"])).unwrap();

        assert!(contains_marker(&path, "eta").unwrap());
        assert!(!contains_marker(&path, "gamma").unwrap());
        assert!(!contains_marker(&dir.path().join("absent"), "x").unwrap());
    }
}
