//! Event notifier
//!
//! Every notification the pipeline emits goes through here, so the order
//! in which engine and entry listeners observe a transition lives in one
//! place. Callers must not hold engine locks while calling in.

use sojourn_events::{EventTarget, Listener, ListenerId};
use sojourn_history::{EntryEventKind, HistoryEntry, NavigationType};
use sojourn_transition::NavigationError;

use crate::events::{
    CurrentEntryChangeEvent, NavigateErrorEvent, NavigateSuccessEvent, NavigationEvent,
    NavigationEventKind,
};
use crate::intent::{IntentOutcome, NavigateEvent};

#[derive(Debug, Default)]
pub(crate) struct Notifier {
    target: EventTarget<NavigationEvent>,
}

impl Notifier {
    pub fn add_listener<F>(&self, kind: NavigationEventKind, listener: F) -> ListenerId
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        self.target.add_listener(kind, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.target.remove_listener(id)
    }

    pub fn set_handler(&self, kind: NavigationEventKind, handler: Option<Listener<NavigationEvent>>) {
        self.target.set_handler(kind, handler)
    }

    /// Dispatch the intent and collect what listeners did to it.
    pub fn navigate(&self, intent: NavigateEvent) -> IntentOutcome {
        tracing::debug!(
            navigation_type = %intent.navigation_type(),
            url = ?intent.destination().url().map(|u| u.as_str()),
            "Dispatching navigate"
        );
        let event = NavigationEvent::Navigate(intent);
        self.target.dispatch(&event);
        event.into_intent_outcome()
    }

    pub fn navigate_to(&self, entry: &HistoryEntry) {
        entry.fire(EntryEventKind::NavigateTo);
    }

    /// Commit notifications: the old current entry, the engine, then every
    /// discarded entry in index order. `currententrychange` is skipped once
    /// `still_active` reports that a `navigatefrom` listener started a newer
    /// navigation; that navigation reports its own change.
    pub fn committed(
        &self,
        navigation_type: NavigationType,
        previous: &HistoryEntry,
        disposed: &[HistoryEntry],
        still_active: impl Fn() -> bool,
    ) {
        previous.fire(EntryEventKind::NavigateFrom);

        if still_active() {
            self.target
                .dispatch(&NavigationEvent::CurrentEntryChange(CurrentEntryChangeEvent {
                    navigation_type,
                    from: previous.clone(),
                }));
        }

        for entry in disposed {
            entry.fire(EntryEventKind::Dispose);
        }
    }

    pub fn success(&self, navigation_type: NavigationType, entry: &HistoryEntry) {
        entry.fire(EntryEventKind::Finish);
        self.target
            .dispatch(&NavigationEvent::NavigateSuccess(NavigateSuccessEvent {
                navigation_type,
                entry: entry.clone(),
            }));
    }

    pub fn error(&self, navigation_type: NavigationType, error: NavigationError) {
        tracing::debug!(navigation_type = %navigation_type, %error, "Dispatching navigateerror");
        self.target
            .dispatch(&NavigationEvent::NavigateError(NavigateErrorEvent {
                navigation_type,
                error,
            }));
    }
}
