//! Append-only event sink
//!
//! Owns the lifecycle of one session log file. Every record is written as
//! a single newline-terminated JSON line and forced to stable storage
//! before the call returns, so a crash after any successful write leaves
//! the file valid up to and including that record.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::data::LogRecord;
use crate::error::{Result, TrackerError};

pub struct EventSink {
    file: Option<File>,
    path: PathBuf,
}

impl EventSink {
    /// Create the log file at `path`. The path is collision-resistant by
    /// construction (second-granularity session id), so an existing file
    /// is an error rather than something to overwrite.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrackerError::file("create log directory", parent, e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| TrackerError::file("open log file", path, e))?;

        debug!("Opened event sink at {:?}", path);

        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and sync it to stable storage.
    pub fn write_record(&mut self, record: &LogRecord) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| TrackerError::file(
                "write record",
                &self.path,
                std::io::Error::new(std::io::ErrorKind::NotConnected, "sink is closed"),
            ))?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        file.write_all(line.as_bytes())
            .map_err(|e| TrackerError::file("write record", &self.path, e))?;
        file.sync_data()
            .map_err(|e| TrackerError::file("sync record", &self.path, e))?;

        Ok(())
    }

    /// Close the sink. Idempotent; a second close is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|e| TrackerError::file("close log file", &self.path, e))?;
            debug!("Closed event sink at {:?}", self.path);
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EventBody, KeyEvent};
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_log_path(name: &str) -> PathBuf {
        let seq = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir()
            .join(format!("obs-input-tracker-sink-{}-{}", std::process::id(), seq))
            .join(format!("{}.jsonl", name))
    }

    fn key_record(ts: f64, key: &str) -> LogRecord {
        LogRecord {
            timestamp: ts,
            absolute_time: 1735732800.0 + ts,
            body: EventBody::KeyDown(KeyEvent { key: key.to_string() }),
        }
    }

    #[test]
    fn writes_one_parsable_line_per_record() {
        let path = temp_log_path("lines");
        let mut sink = EventSink::create(&path).unwrap();
        sink.write_record(&key_record(0.1, "a")).unwrap();
        sink.write_record(&key_record(0.2, "b")).unwrap();
        sink.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let _: LogRecord = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn close_is_idempotent() {
        let path = temp_log_path("close");
        let mut sink = EventSink::create(&path).unwrap();
        sink.write_record(&key_record(0.1, "a")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(!sink.is_open());
    }

    #[test]
    fn write_after_close_is_an_error() {
        let path = temp_log_path("after-close");
        let mut sink = EventSink::create(&path).unwrap();
        sink.close().unwrap();
        assert!(sink.write_record(&key_record(0.1, "a")).is_err());
    }

    #[test]
    fn create_fails_on_existing_file() {
        let path = temp_log_path("exists");
        let _first = EventSink::create(&path).unwrap();
        assert!(EventSink::create(&path).is_err());
    }
}
