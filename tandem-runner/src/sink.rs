//! JSONL record sink: one `RunRecord` per line.
//!
//! Writes are buffered and best-effort. A failed write is logged and the run
//! carries on; the engine never learns about it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use tandem_core::engine::{RecordSink, RunRecord};

pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
    failed: u64,
}

impl JsonlSink {
    /// Create (or append to) the file at `path`, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            failed: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records that could not be written.
    pub fn failed(&self) -> u64 {
        self.failed
    }
}

impl RecordSink for JsonlSink {
    fn record(&mut self, record: &RunRecord) {
        let written = serde_json::to_writer(&mut self.writer, record)
            .map_err(io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(e) = written {
            self.failed += 1;
            warn!(path = %self.path.display(), error = %e, "record not written");
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "record sink flush failed");
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Read a JSONL record file back, skipping lines that do not parse.
pub fn read_records(path: &Path) -> io::Result<Vec<RunRecord>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
