//! The in-flight transition object

use parking_lot::Mutex;
use std::sync::Arc;

use sojourn_history::{HistoryEntry, NavigationType};

use crate::error::NavigationError;
use crate::phase::TransitionPhase;
use crate::promise::{promise, NavigationFuture, NavigationOutcome, Settler};
use crate::signal::{AbortController, AbortSignal};
use crate::Result;

struct TransitionInner {
    id: u64,
    navigation_type: NavigationType,
    from: HistoryEntry,
    phase: Mutex<TransitionPhase>,
    committed_settler: Mutex<Settler>,
    finished_settler: Mutex<Settler>,
    committed: NavigationFuture,
    finished: NavigationFuture,
    abort: AbortController,
}

/// Handle to one transition. Clones share state.
#[derive(Clone)]
pub struct Transition {
    inner: Arc<TransitionInner>,
}

impl Transition {
    pub(crate) fn new(id: u64, navigation_type: NavigationType, from: HistoryEntry) -> Self {
        let (committed_settler, committed) = promise();
        let (finished_settler, finished) = promise();

        Self {
            inner: Arc::new(TransitionInner {
                id,
                navigation_type,
                from,
                phase: Mutex::new(TransitionPhase::Pending),
                committed_settler: Mutex::new(committed_settler),
                finished_settler: Mutex::new(finished_settler),
                committed,
                finished,
                abort: AbortController::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn navigation_type(&self) -> NavigationType {
        self.inner.navigation_type
    }

    /// Entry that was current when the transition began
    pub fn from(&self) -> &HistoryEntry {
        &self.inner.from
    }

    pub fn phase(&self) -> TransitionPhase {
        *self.inner.phase.lock()
    }

    pub fn committed(&self) -> NavigationFuture {
        self.inner.committed.clone()
    }

    pub fn finished(&self) -> NavigationFuture {
        self.inner.finished.clone()
    }

    pub fn signal(&self) -> AbortSignal {
        self.inner.abort.signal()
    }

    pub fn same_transition(&self, other: &Transition) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn advance(&self, to: TransitionPhase) -> Result<()> {
        let mut phase = self.inner.phase.lock();
        if !phase.can_transition_to(to) {
            return Err(NavigationError::InvalidState(format!(
                "transition {} cannot move from {} to {}",
                self.inner.id, *phase, to
            )));
        }

        let current = *phase;
        tracing::debug!(
            transition_id = self.inner.id,
            navigation_type = %self.inner.navigation_type,
            from = %current,
            to = %to,
            "Transition phase change"
        );

        *phase = to;
        Ok(())
    }

    pub(crate) fn settle_committed(&self, outcome: NavigationOutcome) -> bool {
        self.inner.committed_settler.lock().settle(outcome)
    }

    pub(crate) fn settle_finished(&self, outcome: NavigationOutcome) -> bool {
        self.inner.finished_settler.lock().settle(outcome)
    }

    pub(crate) fn abort_signal(&self, reason: NavigationError) {
        self.inner.abort.abort(reason);
    }

    /// Drive the transition to `Errored`, rejecting whichever promises are
    /// still open. A committed promise that already resolved stays resolved.
    pub(crate) fn fail(&self, error: NavigationError) {
        {
            let mut phase = self.inner.phase.lock();
            if phase.is_terminal() {
                return;
            }
            if *phase == TransitionPhase::Pending {
                *phase = TransitionPhase::Interrupted;
            }
            if phase.can_transition_to(TransitionPhase::Errored) {
                let current = *phase;
                tracing::debug!(
                    transition_id = self.inner.id,
                    from = %current,
                    error = %error,
                    "Transition failed"
                );
                *phase = TransitionPhase::Errored;
            }
        }

        self.settle_committed(Err(error.clone()));
        self.settle_finished(Err(error));
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.inner.id)
            .field("navigation_type", &self.inner.navigation_type)
            .field("from", &self.inner.from.key())
            .field("phase", &self.phase())
            .finish()
    }
}
