use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    /// A leftover socket file could not be removed. Fatal at startup.
    #[error("Failed to remove stale status socket {path}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not bind status socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write status report: {0}")]
    Write(#[from] io::Error),

    #[error("Timed out after {0:?} writing status report")]
    WriteTimeout(Duration),

    #[error("Health check time {0} is out of range")]
    InvalidTimestamp(i64),
}
