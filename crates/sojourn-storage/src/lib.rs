//! Sojourn Storage Layer
//!
//! SQLite persistence for session history so a restarted engine can pick up
//! the entry list and cursor where it left off. Multi-row writes go through
//! [`Database::transaction`].

mod database;
mod error;
mod migrations;

pub use database::Database;
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
