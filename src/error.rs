//! Error types for the cmdhist CLI.
//!
//! One `thiserror` enum for the whole crate, with category-based exit
//! codes so shell scripts can branch on the failure class:
//! 1 internal, 2 database, 3 not-found, 4 validation, 5 daemon,
//! 7 configuration, 8 I/O.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cmdhist operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cmdhist operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Command record not found: {id}")]
    RecordNotFound { id: i64 },

    #[error("There is already a running daemon (PID={pid})")]
    DaemonRunning { pid: i32 },

    #[error("Old daemon (PID={pid}) did not exit within {timeout_secs}s")]
    DaemonRestartTimeout { pid: i32, timeout_secs: u64 },

    #[error("Record path is outside the record tree: {path}")]
    RecordPathOutsideTree { path: PathBuf },

    #[error("Shell '{shell}' is not supported (supported: {supported})")]
    UnsupportedShell { shell: String, supported: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Category-based process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Other(_) => 1,
            Self::Database(_) => 2,
            Self::RecordNotFound { .. } => 3,
            Self::InvalidArgument(_) => 4,
            Self::DaemonRunning { .. } | Self::DaemonRestartTimeout { .. } => 5,
            Self::Config(_) | Self::RecordPathOutsideTree { .. } | Self::UnsupportedShell { .. } => {
                7
            }
            Self::Io(_) | Self::Json(_) | Self::Watch(_) => 8,
        }
    }
}
