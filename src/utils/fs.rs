//! Filesystem helpers for durable state files.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Write a JSON document atomically: serialize to a temp file in the same
/// directory, then rename over the destination. A crash between write and
/// rename leaves the previous version intact.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value).context("serializing state file")?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Read the last `limit` lines of a newline-delimited file without loading
/// the whole file: scan backwards in fixed-size chunks from the end until
/// enough newlines have been seen.
pub fn tail_lines(path: &Path, limit: usize) -> anyhow::Result<Vec<String>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };

    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(Vec::new());
    }

    const CHUNK: u64 = 8192;
    let mut pos = len;
    let mut newlines = 0usize;
    let mut start = 0u64;

    'scan: while pos > 0 {
        let read_len = CHUNK.min(pos);
        pos -= read_len;
        file.seek(SeekFrom::Start(pos))?;
        let mut buf = vec![0u8; read_len as usize];
        file.read_exact(&mut buf)?;

        for (i, byte) in buf.iter().enumerate().rev() {
            // The trailing newline terminates the last record, skip it.
            let at_end = pos + i as u64 == len - 1;
            if *byte == b'\n' && !at_end {
                newlines += 1;
                if newlines >= limit {
                    start = pos + i as u64 + 1;
                    break 'scan;
                }
            }
        }
    }

    file.seek(SeekFrom::Start(start))?;
    let reader = BufReader::new(file);
    let mut lines = Vec::with_capacity(limit);
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_write_json_atomic_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &serde_json::json!({"v": 1})).unwrap();
        write_json_atomic(&path, &serde_json::json!({"v": 2})).unwrap();

        let loaded: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded["v"], 2);
    }

    #[test]
    fn test_crash_before_rename_preserves_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &serde_json::json!({"v": 1})).unwrap();

        // Simulate a crash after the temp write but before the rename: the
        // orphaned temp file must not affect the durable document.
        let mut tmp = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        tmp.write_all(b"{\"v\": 99").unwrap();
        std::mem::forget(tmp);

        let loaded: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded["v"], 1);
    }

    #[test]
    fn test_tail_lines_returns_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut f = File::create(&path).unwrap();
        for i in 0..50 {
            writeln!(f, "{{\"n\":{i}}}").unwrap();
        }

        let lines = tail_lines(&path, 3).unwrap();
        assert_eq!(lines, vec!["{\"n\":47}", "{\"n\":48}", "{\"n\":49}"]);
    }

    #[test]
    fn test_tail_lines_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let lines = tail_lines(&dir.path().join("absent.jsonl"), 5).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_tail_lines_fewer_than_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "only").unwrap();

        let lines = tail_lines(&path, 10).unwrap();
        assert_eq!(lines, vec!["only"]);
    }
}
