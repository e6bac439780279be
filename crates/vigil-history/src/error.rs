//! Error types for the history store.

use thiserror::Error;

/// Result type alias for history store operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors that can occur during history store operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to open history log: {0}")]
    Open(String),

    #[error("malformed history log at line {line}: {source}")]
    Replay {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize entry: {0}")]
    Serialize(String),

    #[error("log write error: {0}")]
    Write(String),

    #[error("history store is closed")]
    Closed,
}
