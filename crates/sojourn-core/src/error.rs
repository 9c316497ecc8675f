//! Core error types
//!
//! Construction, configuration and persistence failures. Navigations
//! themselves report through [`sojourn_transition::NavigationError`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] sojourn_storage::StorageError),

    #[error("History error: {0}")]
    History(#[from] sojourn_history::HistoryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No tokio runtime available to run deferred navigation work")]
    NoRuntime,
}
