//! Sojourn Core
//!
//! The session-history transition engine behind a `Navigation` object.
//! Every request to change the current entry runs through one serialized
//! pipeline:
//! ```text
//! resolve target → interrupt active transition → navigate (cancelable)
//!   → navigateto → commit → navigatefrom / currententrychange / dispose
//!   → await deferrals → finish + navigatesuccess | navigateerror
//! ```
//! URL resolution, same-document classification and rendering are host
//! concerns, plugged in through the traits in [`host`].

mod config;
mod error;
mod events;
pub mod host;
mod intent;
mod navigation;
mod notifier;
mod persistence;

pub use config::Config;
pub use error::CoreError;
pub use events::{
    CurrentEntryChangeEvent, NavigateErrorEvent, NavigateSuccessEvent, NavigationEvent,
    NavigationEventKind,
};
pub use host::{DocumentClassifier, FragmentClassifier, RenderHandler, StandardUrlResolver, UrlResolver};
pub use intent::{
    DeferredAction, Destination, FocusReset, FormData, NavigateEvent, NavigateOptions,
    NavigationOptions, ReloadOptions, ScrollRestoration, TransitionWhileOptions,
};
pub use navigation::{Navigation, NavigationBuilder};
pub use persistence::{HistoryRepository, HistorySnapshot};

// Re-export the building blocks
pub use sojourn_events::{Listener, ListenerId};
pub use sojourn_history::{EntryEvent, EntryEventKind, EntrySnapshot, HistoryEntry, NavigationType};
pub use sojourn_storage::{Database, StorageError};
pub use sojourn_transition::{
    AbortSignal, ErrorKind, NavigationError, NavigationFuture, NavigationOutcome,
    NavigationResult, Transition, TransitionPhase,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
