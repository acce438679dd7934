//! WAL Writer
//!
//! Appends records to the write-ahead log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::record::WalRecord;
use crate::error::Result;

/// Appends records to the write-ahead log
///
/// One serialized record per line. [`append`](WalWriter::append) leaves
/// the bytes in the OS page cache; [`sync`](WalWriter::sync) forces them
/// to durable storage. Acknowledged mutations must go through
/// [`append_durable`](WalWriter::append_durable).
pub struct WalWriter {
    file: File,
    path: PathBuf,
}

impl WalWriter {
    /// Open the log for appending, creating it (and its parent
    /// directory) if missing. Existing records are preserved.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append a record without forcing it to disk
    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let mut line = record.to_line()?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// fsync the log file
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Append a record and fsync before returning
    pub fn append_durable(&mut self, record: &WalRecord) -> Result<()> {
        self.append(record)?;
        self.sync()
    }

    /// Path of the underlying log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
