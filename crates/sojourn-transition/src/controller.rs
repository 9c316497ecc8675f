//! Transition controller
//!
//! Owns the single active-transition slot. Starting a transition interrupts
//! the previous one; settling a transition that is no longer active is
//! refused so a superseded navigation can never touch its successor.

use sojourn_history::{HistoryEntry, NavigationType};

use crate::error::NavigationError;
use crate::phase::TransitionPhase;
use crate::transition::Transition;
use crate::Result;

const INTERRUPTED_REASON: &str = "navigation was interrupted by a newer navigation";

#[derive(Debug, Default)]
pub struct TransitionController {
    active: Option<Transition>,
    next_id: u64,
}

impl TransitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<Transition> {
        self.active.clone()
    }

    pub fn is_active(&self, transition: &Transition) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.same_transition(transition))
    }

    /// Start a transition away from `from`.
    ///
    /// Any active transition is interrupted first and handed back so the
    /// caller can report it.
    pub fn begin(
        &mut self,
        navigation_type: NavigationType,
        from: HistoryEntry,
    ) -> (Transition, Option<Transition>) {
        let interrupted = self.interrupt_active(INTERRUPTED_REASON);

        self.next_id += 1;
        let transition = Transition::new(self.next_id, navigation_type, from);
        self.active = Some(transition.clone());

        tracing::debug!(
            transition_id = transition.id(),
            navigation_type = %navigation_type,
            interrupted = ?interrupted.as_ref().map(Transition::id),
            "Began transition"
        );

        (transition, interrupted)
    }

    /// Abort the active transition, if any: its signal fires and its open
    /// promises reject with an AbortError carrying `reason`.
    pub fn interrupt_active(&mut self, reason: &str) -> Option<Transition> {
        let transition = self.active.take()?;
        let error = NavigationError::Abort(reason.to_string());

        tracing::info!(
            transition_id = transition.id(),
            phase = %transition.phase(),
            reason,
            "Interrupting transition"
        );

        transition.abort_signal(error.clone());
        transition.fail(error);
        Some(transition)
    }

    /// The destination became current.
    pub fn resolve_committed(&mut self, transition: &Transition, entry: HistoryEntry) -> Result<()> {
        self.ensure_active(transition)?;
        transition.advance(TransitionPhase::Committed)?;
        transition.settle_committed(Ok(entry));
        Ok(())
    }

    /// Every deferral completed; the slot is released.
    pub fn resolve_finished(&mut self, transition: &Transition, entry: HistoryEntry) -> Result<()> {
        self.ensure_active(transition)?;
        transition.advance(TransitionPhase::Finished)?;
        self.active = None;
        transition.settle_finished(Ok(entry));
        Ok(())
    }

    /// A deferral (or the commit itself) failed; the slot is released.
    /// An already-resolved committed promise is left alone.
    pub fn reject_finished(&mut self, transition: &Transition, error: NavigationError) -> Result<()> {
        self.ensure_active(transition)?;
        self.active = None;
        transition.fail(error);
        Ok(())
    }

    /// The intent was canceled before anything was committed: both promises
    /// reject and the signal fires.
    pub fn cancel(&mut self, transition: &Transition, error: NavigationError) -> Result<()> {
        self.ensure_active(transition)?;
        if transition.phase().is_past_commit() {
            return Err(NavigationError::InvalidState(
                "cannot cancel a transition that already committed".to_string(),
            ));
        }
        self.active = None;
        transition.abort_signal(error.clone());
        transition.fail(error);
        Ok(())
    }

    fn ensure_active(&self, transition: &Transition) -> Result<()> {
        if self.is_active(transition) {
            Ok(())
        } else {
            Err(NavigationError::InvalidState(format!(
                "transition {} is no longer active",
                transition.id()
            )))
        }
    }
}
