//! History error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("No history entry with key: {0}")]
    KeyNotFound(String),

    #[error("History has no current entry")]
    NoCurrentEntry,

    #[error("Plan is stale: history changed since it was made")]
    StalePlan,

    #[error("Invalid history snapshot: {0}")]
    InvalidSnapshot(String),
}
