//! Sojourn Session History
//!
//! The ordered list of history entries and the cursor into it.
//! Every change to the list is planned first and committed later, so the
//! navigation pipeline can fire its intent event against a prospective
//! entry before anything is mutated.

mod entry;
mod error;
mod kind;
mod store;

pub use entry::{EntryEvent, EntryEventKind, EntrySnapshot, HistoryEntry};
pub use error::HistoryError;
pub use kind::NavigationType;
pub use store::{CommitOutcome, EntryStore, HistoryPlan, DEFAULT_MAX_ENTRIES};

pub type Result<T> = std::result::Result<T, HistoryError>;
