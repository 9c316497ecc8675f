//! Navigation intent
//!
//! The `NavigateEvent` handed to `navigate` listeners. It describes where
//! the navigation is headed and lets listeners cancel it or attach
//! deferred work that the transition waits on after commit.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

use sojourn_history::{HistoryEntry, HistoryPlan, NavigationType};
use sojourn_transition::{AbortSignal, NavigationError};

/// Work a listener asks the transition to wait for.
pub type DeferredAction = BoxFuture<'static, anyhow::Result<()>>;

/// Options shared by every navigation request.
#[derive(Debug, Clone, Default)]
pub struct NavigationOptions {
    /// Opaque value passed through to listeners
    pub info: Option<Value>,
    pub user_initiated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NavigateOptions {
    pub state: Option<Value>,
    /// Replace the current entry instead of pushing a new one
    pub replace: bool,
    pub info: Option<Value>,
    pub user_initiated: bool,
    /// Set when the navigation submits a form
    pub form_data: Option<FormData>,
}

impl NavigateOptions {
    pub fn replace() -> Self {
        Self {
            replace: true,
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReloadOptions {
    /// New state for the reloaded entry; `None` keeps the current one
    pub state: Option<Value>,
    pub info: Option<Value>,
    pub user_initiated: bool,
}

/// Ordered name/value pairs of a submitted form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value submitted under `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusReset {
    #[default]
    AfterTransition,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrollRestoration {
    #[default]
    AfterTransition,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionWhileOptions {
    pub focus_reset: FocusReset,
    pub scroll_restoration: ScrollRestoration,
}

/// Where a navigation is headed.
///
/// `key`, `id` and `index` describe an existing entry and are only set for
/// traversals.
#[derive(Debug, Clone)]
pub struct Destination {
    url: Option<Url>,
    key: Option<String>,
    id: Option<String>,
    index: Option<usize>,
    same_document: bool,
    state: Option<Value>,
    entry: HistoryEntry,
}

impl Destination {
    pub(crate) fn from_plan(plan: &HistoryPlan) -> Self {
        let entry = plan.entry().clone();
        let existing = plan.navigation_type() == NavigationType::Traverse;
        Self {
            url: entry.url().cloned(),
            key: existing.then(|| entry.key().to_string()),
            id: existing.then(|| plan.destination_id()),
            index: existing.then(|| plan.destination_index()),
            same_document: plan.same_document(),
            state: plan.destination_state(),
            entry,
        }
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn same_document(&self) -> bool {
        self.same_document
    }

    /// Copy of the state the destination will carry
    pub fn state(&self) -> Option<Value> {
        self.state.clone()
    }

    /// The entry that becomes current on commit. Listeners registered on it
    /// before commit receive its `navigateto`.
    pub fn entry(&self) -> &HistoryEntry {
        &self.entry
    }
}

pub(crate) struct IntentParams {
    pub navigation_type: NavigationType,
    pub destination: Destination,
    pub signal: AbortSignal,
    pub user_initiated: bool,
    pub hash_change: bool,
    pub can_transition: bool,
    pub form_data: Option<FormData>,
    pub info: Option<Value>,
}

pub struct NavigateEvent {
    navigation_type: NavigationType,
    destination: Destination,
    signal: AbortSignal,
    user_initiated: bool,
    hash_change: bool,
    can_transition: bool,
    form_data: Option<FormData>,
    info: Option<Value>,
    canceled: AtomicBool,
    deferrals: Mutex<Vec<DeferredAction>>,
    options: Mutex<TransitionWhileOptions>,
}

/// What the listeners decided, read back once dispatch is over.
#[derive(Default)]
pub(crate) struct IntentOutcome {
    pub canceled: bool,
    pub deferrals: Vec<DeferredAction>,
    pub options: TransitionWhileOptions,
}

impl NavigateEvent {
    pub(crate) fn new(params: IntentParams) -> Self {
        Self {
            navigation_type: params.navigation_type,
            destination: params.destination,
            signal: params.signal,
            user_initiated: params.user_initiated,
            hash_change: params.hash_change,
            can_transition: params.can_transition,
            form_data: params.form_data,
            info: params.info,
            canceled: AtomicBool::new(false),
            deferrals: Mutex::new(Vec::new()),
            options: Mutex::new(TransitionWhileOptions::default()),
        }
    }

    pub fn navigation_type(&self) -> NavigationType {
        self.navigation_type
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Fires when this navigation is interrupted or canceled.
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    pub fn user_initiated(&self) -> bool {
        self.user_initiated
    }

    pub fn hash_change(&self) -> bool {
        self.hash_change
    }

    pub fn can_transition(&self) -> bool {
        self.can_transition
    }

    pub fn cancelable(&self) -> bool {
        true
    }

    pub fn form_data(&self) -> Option<&FormData> {
        self.form_data.as_ref()
    }

    pub fn info(&self) -> Option<&Value> {
        self.info.as_ref()
    }

    /// Cancel the navigation. Nothing is committed and both of its
    /// futures reject with an abort error.
    pub fn prevent_default(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn default_prevented(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Keep the transition open until `action` completes.
    pub fn transition_while<F>(&self, action: F) -> Result<(), NavigationError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.transition_while_with(action, TransitionWhileOptions::default())
    }

    /// Like [`transition_while`](Self::transition_while); the options of
    /// the last call win.
    pub fn transition_while_with<F>(
        &self,
        action: F,
        options: TransitionWhileOptions,
    ) -> Result<(), NavigationError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if !self.can_transition {
            return Err(NavigationError::InvalidState(
                "this navigation cannot be transitioned by a listener".to_string(),
            ));
        }
        if self.default_prevented() {
            return Err(NavigationError::InvalidState(
                "the navigation was canceled".to_string(),
            ));
        }

        self.deferrals.lock().push(Box::pin(action));
        *self.options.lock() = options;
        Ok(())
    }

    /// Whether any listener attached deferred work
    pub fn is_intercepted(&self) -> bool {
        !self.deferrals.lock().is_empty()
    }

    pub fn transition_options(&self) -> TransitionWhileOptions {
        *self.options.lock()
    }

    pub(crate) fn into_outcome(self) -> IntentOutcome {
        IntentOutcome {
            canceled: self.canceled.into_inner(),
            deferrals: self.deferrals.into_inner(),
            options: self.options.into_inner(),
        }
    }
}

impl std::fmt::Debug for NavigateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigateEvent")
            .field("navigation_type", &self.navigation_type)
            .field("destination", &self.destination.url().map(Url::as_str))
            .field("user_initiated", &self.user_initiated)
            .field("hash_change", &self.hash_change)
            .field("can_transition", &self.can_transition)
            .field("canceled", &self.default_prevented())
            .field("deferrals", &self.deferrals.lock().len())
            .finish()
    }
}
