//! Error types for the tracker core

use std::path::PathBuf;
use thiserror::Error;

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors surfaced by the recording core.
///
/// Every variant carries enough context (operation, path, cause) to be
/// shown to an operator without a backtrace.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// A session is already recording; start requests are rejected, not restarted
    #[error("a recording session is already active")]
    AlreadyRecording,

    /// Log file could not be opened or written
    #[error("log file error during {operation} ({path:?}): {source}")]
    File {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The recorder control link is unreachable or rejected us
    #[error("recorder link error during {operation}: {message}")]
    Connection {
        operation: &'static str,
        message: String,
    },

    /// An input source could not be armed
    #[error("input source '{source_name}' unavailable: {reason}")]
    Device {
        source_name: &'static str,
        reason: String,
    },

    /// A record failed to serialize
    #[error("failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TrackerError {
    pub(crate) fn file(operation: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::File {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn connection(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            operation,
            message: err.to_string(),
        }
    }
}
