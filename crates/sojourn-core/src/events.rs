//! Engine-level events

use sojourn_events::Event;
use sojourn_history::{HistoryEntry, NavigationType};
use sojourn_transition::NavigationError;

use crate::intent::{IntentOutcome, NavigateEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationEventKind {
    Navigate,
    NavigateSuccess,
    NavigateError,
    CurrentEntryChange,
}

impl NavigationEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationEventKind::Navigate => "navigate",
            NavigationEventKind::NavigateSuccess => "navigatesuccess",
            NavigationEventKind::NavigateError => "navigateerror",
            NavigationEventKind::CurrentEntryChange => "currententrychange",
        }
    }
}

impl std::fmt::Display for NavigationEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NavigateSuccessEvent {
    pub navigation_type: NavigationType,
    pub entry: HistoryEntry,
}

#[derive(Debug, Clone)]
pub struct NavigateErrorEvent {
    pub navigation_type: NavigationType,
    pub error: NavigationError,
}

/// The current entry changed. Fired once per commit.
#[derive(Debug, Clone)]
pub struct CurrentEntryChangeEvent {
    pub navigation_type: NavigationType,
    /// The entry that was current before the commit
    pub from: HistoryEntry,
}

#[derive(Debug)]
pub enum NavigationEvent {
    Navigate(NavigateEvent),
    NavigateSuccess(NavigateSuccessEvent),
    NavigateError(NavigateErrorEvent),
    CurrentEntryChange(CurrentEntryChangeEvent),
}

impl NavigationEvent {
    pub fn as_navigate(&self) -> Option<&NavigateEvent> {
        match self {
            NavigationEvent::Navigate(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_success(&self) -> Option<&NavigateSuccessEvent> {
        match self {
            NavigationEvent::NavigateSuccess(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&NavigateErrorEvent> {
        match self {
            NavigationEvent::NavigateError(event) => Some(event),
            _ => None,
        }
    }

    pub(crate) fn into_intent_outcome(self) -> IntentOutcome {
        match self {
            NavigationEvent::Navigate(intent) => intent.into_outcome(),
            _ => IntentOutcome::default(),
        }
    }

    pub fn as_current_entry_change(&self) -> Option<&CurrentEntryChangeEvent> {
        match self {
            NavigationEvent::CurrentEntryChange(event) => Some(event),
            _ => None,
        }
    }
}

impl Event for NavigationEvent {
    type Kind = NavigationEventKind;

    fn kind(&self) -> NavigationEventKind {
        match self {
            NavigationEvent::Navigate(_) => NavigationEventKind::Navigate,
            NavigationEvent::NavigateSuccess(_) => NavigationEventKind::NavigateSuccess,
            NavigationEvent::NavigateError(_) => NavigationEventKind::NavigateError,
            NavigationEvent::CurrentEntryChange(_) => NavigationEventKind::CurrentEntryChange,
        }
    }
}
