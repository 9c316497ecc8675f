//! Navigation error types
//!
//! Mirrors the DOMException kinds a navigation can reject with. `Clone`
//! because one error is delivered to every clone of a shared future.

use std::sync::Arc;
use thiserror::Error;

use sojourn_history::HistoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    InvalidState,
    Abort,
    Handler,
}

#[derive(Error, Debug, Clone)]
pub enum NavigationError {
    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    #[error("AbortError: {0}")]
    Abort(String),

    /// Failure produced by a deferred action registered during the navigate event
    #[error("Navigation handler failed: {0}")]
    Handler(Arc<anyhow::Error>),
}

impl NavigationError {
    pub fn handler(error: anyhow::Error) -> Self {
        NavigationError::Handler(Arc::new(error))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NavigationError::Syntax(_) => ErrorKind::Syntax,
            NavigationError::InvalidState(_) => ErrorKind::InvalidState,
            NavigationError::Abort(_) => ErrorKind::Abort,
            NavigationError::Handler(_) => ErrorKind::Handler,
        }
    }

    pub fn is_abort(&self) -> bool {
        self.kind() == ErrorKind::Abort
    }
}

impl From<HistoryError> for NavigationError {
    fn from(error: HistoryError) -> Self {
        NavigationError::InvalidState(error.to_string())
    }
}

impl From<url::ParseError> for NavigationError {
    fn from(error: url::ParseError) -> Self {
        NavigationError::Syntax(error.to_string())
    }
}
