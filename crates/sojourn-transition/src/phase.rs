//! Transition phase state machine

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    /// Intent dispatched, nothing committed yet
    Pending,
    /// New current entry installed, deferrals outstanding
    Committed,
    /// Abandoned before commit (canceled, superseded, or the commit failed)
    Interrupted,
    /// Every deferral settled successfully
    Finished,
    /// The deferral phase failed or was aborted
    Errored,
}

impl TransitionPhase {
    pub fn can_transition_to(&self, target: TransitionPhase) -> bool {
        matches!(
            (self, target),
            (TransitionPhase::Pending, TransitionPhase::Committed)
                | (TransitionPhase::Pending, TransitionPhase::Interrupted)
                | (TransitionPhase::Committed, TransitionPhase::Finished)
                | (TransitionPhase::Committed, TransitionPhase::Errored)
                | (TransitionPhase::Interrupted, TransitionPhase::Errored)
        )
    }

    /// Whether the committed promise has been settled by the time this phase is reached
    pub fn is_past_commit(&self) -> bool {
        !matches!(self, TransitionPhase::Pending)
    }

    /// Both promises have settled; nothing moves the transition any further
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransitionPhase::Finished | TransitionPhase::Errored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPhase::Pending => "pending",
            TransitionPhase::Committed => "committed",
            TransitionPhase::Interrupted => "interrupted",
            TransitionPhase::Finished => "finished",
            TransitionPhase::Errored => "errored",
        }
    }
}

impl std::fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(TransitionPhase::Pending.can_transition_to(TransitionPhase::Committed));
        assert!(TransitionPhase::Pending.can_transition_to(TransitionPhase::Interrupted));
        assert!(TransitionPhase::Committed.can_transition_to(TransitionPhase::Finished));
        assert!(TransitionPhase::Committed.can_transition_to(TransitionPhase::Errored));
        assert!(TransitionPhase::Interrupted.can_transition_to(TransitionPhase::Errored));
    }

    #[test]
    fn test_invalid_transitions() {
        // Nothing re-enters pending
        assert!(!TransitionPhase::Committed.can_transition_to(TransitionPhase::Pending));
        assert!(!TransitionPhase::Errored.can_transition_to(TransitionPhase::Pending));
        // Commit and interrupt are exclusive
        assert!(!TransitionPhase::Interrupted.can_transition_to(TransitionPhase::Committed));
        assert!(!TransitionPhase::Committed.can_transition_to(TransitionPhase::Interrupted));
        // An interrupted transition never finishes successfully
        assert!(!TransitionPhase::Interrupted.can_transition_to(TransitionPhase::Finished));
        assert!(!TransitionPhase::Pending.can_transition_to(TransitionPhase::Finished));
        assert!(!TransitionPhase::Finished.can_transition_to(TransitionPhase::Errored));
    }

    #[test]
    fn test_terminal_phases() {
        let all = [
            TransitionPhase::Pending,
            TransitionPhase::Committed,
            TransitionPhase::Interrupted,
            TransitionPhase::Finished,
            TransitionPhase::Errored,
        ];
        for phase in all {
            let stuck = all.iter().all(|&to| !phase.can_transition_to(to));
            assert_eq!(phase.is_terminal(), stuck, "{}", phase);
        }
    }
}
