//! WAL Replay
//!
//! Reads a log back at open time, tolerating the torn trailing record a
//! crash mid-append can leave behind.

use std::fs::OpenOptions;
use std::path::Path;

use super::record::WalRecord;
use crate::error::{Error, Result};

/// Summary of a replay pass
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayReport {
    /// Records successfully decoded
    pub records: usize,

    /// Whether a torn trailing record was discarded and the file
    /// truncated back to the last complete record
    pub truncated: bool,
}

/// Replay the log at `path`, returning decoded records in append order.
///
/// A missing file replays to nothing. The trailing record counts as torn
/// when it is unterminated or fails to parse; it is silently discarded
/// and the file truncated back to the last complete record. A bad line
/// anywhere else is fatal corruption. Blank lines are skipped.
pub fn replay(path: &Path) -> Result<(Vec<WalRecord>, ReplayReport)> {
    let mut report = ReplayReport::default();

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((Vec::new(), report));
        }
        Err(e) => return Err(e.into()),
    };

    // Byte ranges of each LF-terminated line, plus any unterminated tail.
    let mut lines: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for (i, byte) in data.iter().enumerate() {
        if *byte == b'\n' {
            lines.push((start, i));
            start = i + 1;
        }
    }
    let tail_start = start;
    let has_tail = tail_start < data.len();

    let mut records = Vec::new();
    let mut keep = data.len();
    let mut torn = false;

    for (idx, (line_start, line_end)) in lines.iter().enumerate() {
        let raw = &data[*line_start..*line_end];
        let is_final = idx + 1 == lines.len() && !has_tail;

        let parsed = std::str::from_utf8(raw)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                let text = text.trim();
                if text.is_empty() {
                    Ok(None)
                } else {
                    WalRecord::from_line(text).map(Some).map_err(|e| e.to_string())
                }
            });

        match parsed {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(reason) if is_final => {
                tracing::warn!(line = idx + 1, %reason, "discarding torn trailing WAL record");
                keep = *line_start;
                torn = true;
            }
            Err(reason) => {
                return Err(Error::CorruptLog {
                    line: idx + 1,
                    reason,
                });
            }
        }
    }

    if has_tail {
        tracing::warn!(
            bytes = data.len() - tail_start,
            "discarding unterminated WAL tail"
        );
        keep = tail_start;
        torn = true;
    }

    if torn && keep < data.len() {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(keep as u64)?;
        file.sync_all()?;
        report.truncated = true;
    }

    report.records = records.len();
    Ok((records, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_wal(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("wal.log");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let (records, report) = replay(&dir.path().join("absent.log")).unwrap();
        assert!(records.is_empty());
        assert!(!report.truncated);
    }

    #[test]
    fn test_replay_valid_records_in_order() {
        let dir = tempdir().unwrap();
        let path = write_wal(
            &dir,
            concat!(
                "{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}\n",
                "{\"op\":\"delete\",\"key\":\"a\"}\n",
                "{\"op\":\"bulk_set\",\"items\":[[\"b\",\"2\"],[\"c\",\"3\"]]}\n",
            ),
        );

        let (records, report) = replay(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].op_name(), "set");
        assert_eq!(records[1].op_name(), "delete");
        assert_eq!(records[2].op_name(), "bulk_set");
        assert!(!report.truncated);
    }

    #[test]
    fn test_torn_trailing_line_discarded_and_truncated() {
        let dir = tempdir().unwrap();
        let path = write_wal(
            &dir,
            "{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}\n{\"op\":\"set\",\"ke",
        );

        let (records, report) = replay(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert!(report.truncated);

        // File is cut back to the last complete record.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}\n");
    }

    #[test]
    fn test_torn_terminated_garbage_line_discarded() {
        let dir = tempdir().unwrap();
        let path = write_wal(
            &dir,
            "{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}\nnot json at all\n",
        );

        let (records, report) = replay(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert!(report.truncated);
    }

    #[test]
    fn test_mid_file_corruption_is_fatal() {
        let dir = tempdir().unwrap();
        let path = write_wal(
            &dir,
            concat!(
                "{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}\n",
                "garbage\n",
                "{\"op\":\"set\",\"key\":\"b\",\"value\":\"2\"}\n",
            ),
        );

        match replay(&path) {
            Err(Error::CorruptLog { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected CorruptLog, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_lines_skipped() {
        let dir = tempdir().unwrap();
        let path = write_wal(
            &dir,
            "{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}\n\n{\"op\":\"set\",\"key\":\"b\",\"value\":\"2\"}\n",
        );

        let (records, report) = replay(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!report.truncated);
    }

    #[test]
    fn test_replay_is_idempotent_after_truncation() {
        let dir = tempdir().unwrap();
        let path = write_wal(
            &dir,
            "{\"op\":\"set\",\"key\":\"a\",\"value\":\"1\"}\n{\"op\":\"set\",\"ke",
        );

        let (first, report) = replay(&path).unwrap();
        assert!(report.truncated);

        let (second, report) = replay(&path).unwrap();
        assert!(!report.truncated);
        assert_eq!(first, second);
    }
}
