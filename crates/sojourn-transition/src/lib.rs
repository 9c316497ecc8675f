//! Sojourn Transitions
//!
//! At most one transition is in flight. It spans a commit phase and a
//! deferral phase, each observable through a promise:
//! ```text
//! Pending ──commit──▶ Committed ──deferrals ok──▶ Finished
//!    │                    │
//!    │                    └──deferral error / interrupt──▶ Errored
//!    └──interrupt / cancel──▶ Interrupted ──────────────────▶ Errored
//! ```

mod controller;
mod error;
mod phase;
mod promise;
mod signal;
mod transition;

pub use controller::TransitionController;
pub use error::{ErrorKind, NavigationError};
pub use phase::TransitionPhase;
pub use promise::{NavigationFuture, NavigationOutcome, NavigationResult};
pub use signal::{AbortController, AbortSignal};
pub use transition::Transition;

pub type Result<T> = std::result::Result<T, NavigationError>;
