//! Navigation engine
//!
//! Owns the entry list and the transition slot, and runs every request
//! through the same pipeline. Locks are only held for bookkeeping; no
//! listener is ever invoked while one is held, so listeners may call back
//! into the engine (including starting another navigation). When both are
//! needed, the transition slot is locked before the entry store.

use chrono::Utc;
use futures_util::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use url::Url;

use sojourn_events::{Listener, ListenerId};
use sojourn_history::{EntryStore, HistoryEntry, NavigationType};
use sojourn_storage::Database;
use sojourn_transition::{
    NavigationError, NavigationResult, Transition, TransitionController, TransitionPhase,
};

use crate::config::Config;
use crate::error::CoreError;
use crate::events::{NavigationEvent, NavigationEventKind};
use crate::host::{
    self, DocumentClassifier, FragmentClassifier, RenderHandler, StandardUrlResolver, UrlResolver,
};
use crate::intent::{
    DeferredAction, Destination, FormData, IntentParams, NavigateEvent, NavigateOptions,
    NavigationOptions, ReloadOptions,
};
use crate::notifier::Notifier;
use crate::persistence::{HistoryRepository, HistorySnapshot};
use crate::Result;

const CANCELED_REASON: &str = "navigation was canceled by a navigate listener";
const ROLLED_BACK_REASON: &str = "navigation was rolled back";

enum Target {
    Push { url: Url, state: Option<Value> },
    Replace { url: Url, state: Option<Value> },
    Reload { state: Option<Value> },
    Traverse { key: String },
}

struct Request {
    target: Target,
    info: Option<Value>,
    user_initiated: bool,
    form_data: Option<FormData>,
}

struct NavigationInner {
    config: Config,
    store: RwLock<EntryStore>,
    transitions: Mutex<TransitionController>,
    notifier: Notifier,
    resolver: Arc<dyn UrlResolver>,
    classifier: Arc<dyn DocumentClassifier>,
    renderer: Option<Arc<dyn RenderHandler>>,
    repository: Option<HistoryRepository>,
    runtime: Handle,
}

/// The session history of one browsing context.
///
/// Cloning is cheap; every clone drives the same engine.
#[derive(Clone)]
pub struct Navigation {
    inner: Arc<NavigationInner>,
}

pub struct NavigationBuilder {
    config: Config,
    resolver: Arc<dyn UrlResolver>,
    classifier: Arc<dyn DocumentClassifier>,
    renderer: Option<Arc<dyn RenderHandler>>,
    repository: Option<HistoryRepository>,
    runtime: Option<Handle>,
}

impl NavigationBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resolver: Arc::new(StandardUrlResolver),
            classifier: Arc::new(FragmentClassifier),
            renderer: None,
            repository: None,
            runtime: None,
        }
    }

    pub fn resolver(mut self, resolver: impl UrlResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn classifier(mut self, classifier: impl DocumentClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn renderer(mut self, renderer: impl RenderHandler + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Persist through `repository` instead of opening `database_path`.
    pub fn repository(mut self, repository: HistoryRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Runtime that deferred actions are spawned on. Defaults to the
    /// runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Navigation> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| CoreError::NoRuntime)?,
        };

        let repository = match (self.repository, &self.config.database_path) {
            (Some(repository), _) => Some(repository),
            (None, Some(path)) => Some(HistoryRepository::new(Database::open(path)?)),
            (None, None) => None,
        };

        let mut store = EntryStore::new(self.config.max_entries);
        let saved = match &repository {
            Some(repository) => repository.load()?,
            None => None,
        };

        let restored = match saved {
            Some(snapshot) => {
                store.restore(snapshot.entries, snapshot.current_index)?;
                true
            }
            None => {
                let url = self
                    .resolver
                    .resolve(None, &self.config.initial_url)
                    .map_err(|e| CoreError::Config(format!("initial_url: {}", e)))?;
                let plan = store.plan_push(url, self.config.initial_state.clone(), false);
                store.commit(plan)?;
                false
            }
        };

        tracing::info!(
            entries = store.len(),
            restored,
            persistent = repository.is_some(),
            "Navigation initialized"
        );

        let navigation = Navigation {
            inner: Arc::new(NavigationInner {
                config: self.config,
                store: RwLock::new(store),
                transitions: Mutex::new(TransitionController::new()),
                notifier: Notifier::default(),
                resolver: self.resolver,
                classifier: self.classifier,
                renderer: self.renderer,
                repository,
                runtime,
            }),
        };

        if !restored {
            navigation.persist();
        }
        Ok(navigation)
    }
}

impl Navigation {
    pub fn new(config: Config) -> Result<Self> {
        NavigationBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> NavigationBuilder {
        NavigationBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.store.read().entries()
    }

    pub fn current_entry(&self) -> Option<HistoryEntry> {
        self.inner.store.read().current()
    }

    /// The in-flight transition, if any
    pub fn transition(&self) -> Option<Transition> {
        self.inner.transitions.lock().active()
    }

    pub fn can_go_back(&self) -> bool {
        self.inner.store.read().can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.inner.store.read().can_go_forward()
    }

    /// Navigate to `url`, resolved against the current entry's URL.
    pub fn navigate(&self, url: &str, options: NavigateOptions) -> NavigationResult {
        let base = self.current_entry().and_then(|e| e.url().cloned());
        let url = match self.inner.resolver.resolve(base.as_ref(), url) {
            Ok(url) => url,
            Err(error) => return reject(error),
        };

        let target = if options.replace {
            Target::Replace {
                url,
                state: options.state,
            }
        } else {
            Target::Push {
                url,
                state: options.state,
            }
        };

        self.run(Request {
            target,
            info: options.info,
            user_initiated: options.user_initiated,
            form_data: options.form_data,
        })
    }

    pub fn reload(&self, options: ReloadOptions) -> NavigationResult {
        self.run(Request {
            target: Target::Reload {
                state: options.state,
            },
            info: options.info,
            user_initiated: options.user_initiated,
            form_data: None,
        })
    }

    /// Move to the entry with `key`. Already being there is not a
    /// navigation: the result resolves at once and nothing fires.
    pub fn traverse_to(&self, key: &str, options: NavigationOptions) -> NavigationResult {
        if let Some(current) = self.current_entry().filter(|e| e.key() == key) {
            return NavigationResult::resolved(current);
        }

        self.run(Request {
            target: Target::Traverse {
                key: key.to_string(),
            },
            info: options.info,
            user_initiated: options.user_initiated,
            form_data: None,
        })
    }

    pub fn back(&self, options: NavigationOptions) -> NavigationResult {
        let key = {
            let store = self.inner.store.read();
            store
                .current_index()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| store.entry_at(i))
                .map(|e| e.key().to_string())
        };

        match key {
            Some(key) => self.traverse_to(&key, options),
            None => reject(NavigationError::InvalidState(
                "cannot go back: there is no previous entry".to_string(),
            )),
        }
    }

    pub fn forward(&self, options: NavigationOptions) -> NavigationResult {
        let key = {
            let store = self.inner.store.read();
            store
                .current_index()
                .and_then(|i| store.entry_at(i + 1))
                .map(|e| e.key().to_string())
        };

        match key {
            Some(key) => self.traverse_to(&key, options),
            None => reject(NavigationError::InvalidState(
                "cannot go forward: there is no next entry".to_string(),
            )),
        }
    }

    /// Swap the current entry's state. Not a navigation; nothing fires.
    pub fn update_current_entry(&self, state: Value) -> std::result::Result<(), NavigationError> {
        self.inner.store.write().update_current_state(state)?;
        self.persist();
        Ok(())
    }

    /// Undo the in-flight transition.
    ///
    /// Before commit (or when the transition left the current entry in
    /// place) the transition is just aborted. After a push or traversal the
    /// engine traverses back to where it started; after a replace the old
    /// URL and state are put back into the slot.
    pub fn rollback(&self, options: NavigationOptions) -> NavigationResult {
        let Some(transition) = self.transition() else {
            return reject(NavigationError::InvalidState(
                "there is no transition to roll back".to_string(),
            ));
        };
        let Some(current) = self.current_entry() else {
            return reject(NavigationError::InvalidState(
                "history has no current entry".to_string(),
            ));
        };
        let from = transition.from().clone();

        if transition.phase() == TransitionPhase::Pending || from == current {
            let interrupted = self.inner.transitions.lock().interrupt_active(ROLLED_BACK_REASON);
            if let Some(interrupted) = interrupted {
                self.report_aborted(&interrupted);
            }
            return NavigationResult::resolved(current);
        }

        if from.key() == current.key() {
            let Some(url) = from.url().cloned() else {
                return reject(NavigationError::InvalidState(
                    "the replaced entry has no URL to restore".to_string(),
                ));
            };
            return self.run(Request {
                target: Target::Replace {
                    url,
                    state: from.state(),
                },
                info: options.info,
                user_initiated: options.user_initiated,
                form_data: None,
            });
        }

        if from.is_disposed() {
            return reject(NavigationError::InvalidState(format!(
                "entry {} is no longer in the history",
                from.key()
            )));
        }

        self.traverse_to(from.key(), options)
    }

    pub fn add_listener<F>(&self, kind: NavigationEventKind, listener: F) -> ListenerId
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        self.inner.notifier.add_listener(kind, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.notifier.remove_listener(id)
    }

    /// `onnavigate`, `onnavigatesuccess`, `onnavigateerror`, `oncurrententrychange`
    pub fn set_handler(&self, kind: NavigationEventKind, handler: Option<Listener<NavigationEvent>>) {
        self.inner.notifier.set_handler(kind, handler)
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        let (entries, current_index) = self.inner.store.read().snapshot();
        HistorySnapshot {
            entries,
            current_index,
            saved_at: Utc::now(),
        }
    }

    fn run(&self, request: Request) -> NavigationResult {
        let Request {
            target,
            info,
            user_initiated,
            form_data,
        } = request;

        // Resolve the target against the list as it is now
        let (from, plan) = {
            let store = self.inner.store.read();
            let Some(from) = store.current() else {
                return reject(NavigationError::InvalidState(
                    "history has no current entry".to_string(),
                ));
            };

            let classifier = &self.inner.classifier;
            let planned = match target {
                Target::Push { url, state } => {
                    let same_document =
                        classifier.is_same_document(from.url(), &url, NavigationType::Push);
                    Ok(store.plan_push(url, state, same_document))
                }
                Target::Replace { url, state } => {
                    let same_document =
                        classifier.is_same_document(from.url(), &url, NavigationType::Replace);
                    store.plan_replace(url, state, same_document)
                }
                Target::Reload { state } => {
                    let same_document = from.url().is_some_and(|url| {
                        classifier.is_same_document(Some(url), url, NavigationType::Reload)
                    });
                    store.plan_reload(state, same_document)
                }
                Target::Traverse { key } => store.plan_traverse(&key),
            };

            match planned {
                Ok(plan) => (from, plan),
                Err(error) => return reject(error.into()),
            }
        };

        let navigation_type = plan.navigation_type();
        let destination_url = plan.entry().url().cloned();
        let hash_change = matches!(navigation_type, NavigationType::Push | NavigationType::Replace)
            && match (from.url(), destination_url.as_ref()) {
                (Some(current), Some(destination)) => host::is_fragment_change(current, destination),
                _ => false,
            };
        let can_transition = host::can_transition(
            from.url(),
            destination_url.as_ref(),
            navigation_type,
            plan.same_document(),
        );

        let (transition, interrupted) = self
            .inner
            .transitions
            .lock()
            .begin(navigation_type, from.clone());
        let result = NavigationResult::new(transition.committed(), transition.finished());

        if let Some(interrupted) = interrupted {
            self.report_aborted(&interrupted);
        }
        if self.superseded(&transition) {
            return result;
        }

        let outcome = self.inner.notifier.navigate(NavigateEvent::new(IntentParams {
            navigation_type,
            destination: Destination::from_plan(&plan),
            signal: transition.signal(),
            user_initiated,
            hash_change,
            can_transition,
            form_data,
            info,
        }));

        // A listener started another navigation, which took over
        if self.superseded(&transition) {
            tracing::debug!(transition_id = transition.id(), "Navigation superseded during dispatch");
            return result;
        }

        if outcome.canceled {
            let error = NavigationError::Abort(CANCELED_REASON.to_string());
            let canceled = self.inner.transitions.lock().cancel(&transition, error.clone());
            if canceled.is_ok() {
                tracing::info!(transition_id = transition.id(), "Navigation canceled");
                self.inner.notifier.error(navigation_type, error);
            }
            return result;
        }

        self.inner.notifier.navigate_to(plan.entry());

        let mut plan = plan;
        if !outcome.deferrals.is_empty() {
            plan.set_same_document(true);
        }

        // The activity check, the commit and the committed promise happen
        // under one guard so no other navigation can begin in between.
        let committed = {
            let mut transitions = self.inner.transitions.lock();
            if !transitions.is_active(&transition) {
                return result;
            }
            let applied = self.inner.store.write().commit(plan);
            match applied {
                Ok(commit) => match transitions.resolve_committed(&transition, commit.current.clone()) {
                    Ok(()) => Ok(commit),
                    Err(error) => {
                        tracing::warn!(transition_id = transition.id(), %error, "Commit outlived its transition");
                        Err(None)
                    }
                },
                Err(error) => {
                    let error = NavigationError::from(error);
                    let rejected = transitions.reject_finished(&transition, error.clone());
                    Err(rejected.ok().map(|()| error))
                }
            }
        };
        let commit = match committed {
            Ok(commit) => commit,
            Err(Some(error)) => {
                self.inner.notifier.error(navigation_type, error);
                return result;
            }
            Err(None) => return result,
        };

        self.persist();

        let previous = commit.previous.clone().unwrap_or(from);
        self.inner
            .notifier
            .committed(navigation_type, &previous, &commit.disposed, || {
                !self.superseded(&transition)
            });

        // A navigatefrom listener started another navigation, which now owns
        // rendering and the deferral phase
        if self.superseded(&transition) {
            tracing::debug!(transition_id = transition.id(), "Navigation superseded after commit");
            return result;
        }

        tracing::debug!(
            transition_id = transition.id(),
            focus_reset = ?outcome.options.focus_reset,
            scroll_restoration = ?outcome.options.scroll_restoration,
            "Transition committed"
        );

        let mut deferrals = outcome.deferrals;
        if let Some(renderer) = &self.inner.renderer {
            deferrals.extend(renderer.render(&commit.current, navigation_type));
        }

        if deferrals.is_empty() {
            self.finish(&transition, &commit.current, Ok(()));
        } else {
            self.await_deferrals(transition, commit.current, deferrals);
        }

        result
    }

    /// Run every deferral as its own task; the transition finishes with
    /// the first failure or once all succeed, unless it is aborted first.
    fn await_deferrals(
        &self,
        transition: Transition,
        entry: HistoryEntry,
        deferrals: Vec<DeferredAction>,
    ) {
        let runtime = &self.inner.runtime;
        let handles: Vec<_> = deferrals.into_iter().map(|action| runtime.spawn(action)).collect();

        tracing::debug!(
            transition_id = transition.id(),
            deferrals = handles.len(),
            "Awaiting deferred actions"
        );

        let signal = transition.signal();
        let navigation = self.clone();
        runtime.spawn(async move {
            let all = try_join_all(handles.into_iter().map(|handle| async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(anyhow::anyhow!("deferred action did not complete: {}", e)),
                }
            }));

            tokio::select! {
                reason = signal.aborted() => {
                    tracing::debug!(transition_id = transition.id(), %reason, "Stopped awaiting deferred actions");
                }
                result = all => {
                    let outcome = result.map(|_| ()).map_err(NavigationError::handler);
                    navigation.finish(&transition, &entry, outcome);
                }
            }
        });
    }

    fn finish(
        &self,
        transition: &Transition,
        entry: &HistoryEntry,
        outcome: std::result::Result<(), NavigationError>,
    ) {
        let navigation_type = transition.navigation_type();
        let settled = {
            let mut transitions = self.inner.transitions.lock();
            match &outcome {
                Ok(()) => transitions.resolve_finished(transition, entry.clone()),
                Err(error) => transitions.reject_finished(transition, error.clone()),
            }
        };

        if let Err(error) = settled {
            tracing::warn!(
                transition_id = transition.id(),
                %error,
                "Discarding result of superseded transition"
            );
            return;
        }

        match outcome {
            Ok(()) => {
                tracing::info!(
                    transition_id = transition.id(),
                    navigation_type = %navigation_type,
                    key = %entry.key(),
                    "Navigation finished"
                );
                self.inner.notifier.success(navigation_type, entry);
            }
            Err(error) => {
                tracing::info!(transition_id = transition.id(), %error, "Navigation failed");
                self.inner.notifier.error(navigation_type, error);
            }
        }
    }

    fn report_aborted(&self, transition: &Transition) {
        let error = transition
            .signal()
            .reason()
            .unwrap_or_else(|| NavigationError::Abort("navigation was aborted".to_string()));
        self.inner.notifier.error(transition.navigation_type(), error);
    }

    fn superseded(&self, transition: &Transition) -> bool {
        !self.inner.transitions.lock().is_active(transition)
    }

    fn persist(&self) {
        let Some(repository) = &self.inner.repository else {
            return;
        };
        if let Err(e) = repository.save(&self.snapshot()) {
            tracing::error!("Failed to persist history: {}", e);
        }
    }
}

impl std::fmt::Debug for Navigation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transitions = self.inner.transitions.lock();
        let store = self.inner.store.read();
        f.debug_struct("Navigation")
            .field("entries", &store.len())
            .field("current_index", &store.current_index())
            .field("transition", &transitions.active().map(|t| t.id()))
            .finish()
    }
}

fn reject(error: NavigationError) -> NavigationResult {
    tracing::debug!(%error, "Navigation rejected before it began");
    NavigationResult::rejected(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::TransitionWhileOptions;
    use sojourn_history::EntryEventKind;
    use sojourn_transition::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    type Log = Arc<Mutex<Vec<String>>>;

    fn navigation() -> Navigation {
        Navigation::new(Config::new("https://example.com/a")).unwrap()
    }

    fn label(entry: &HistoryEntry) -> String {
        entry
            .url()
            .map(|u| u.path().trim_start_matches('/').to_string())
            .unwrap_or_default()
    }

    fn record_engine(nav: &Navigation, log: &Log) {
        for kind in [
            NavigationEventKind::Navigate,
            NavigationEventKind::NavigateSuccess,
            NavigationEventKind::NavigateError,
            NavigationEventKind::CurrentEntryChange,
        ] {
            let log = Arc::clone(log);
            nav.add_listener(kind, move |event| {
                let line = match event {
                    NavigationEvent::Navigate(e) => format!("navigate:{}", e.navigation_type()),
                    NavigationEvent::NavigateSuccess(e) => {
                        format!("navigatesuccess:{}", e.navigation_type)
                    }
                    NavigationEvent::NavigateError(e) => format!("navigateerror:{}", e.navigation_type),
                    NavigationEvent::CurrentEntryChange(e) => {
                        format!("currententrychange:{}", e.navigation_type)
                    }
                };
                log.lock().push(line);
            });
        }
    }

    fn record_entry(entry: &HistoryEntry, name: &str, log: &Log) {
        for kind in [
            EntryEventKind::NavigateTo,
            EntryEventKind::NavigateFrom,
            EntryEventKind::Finish,
            EntryEventKind::Dispose,
        ] {
            let log = Arc::clone(log);
            let name = name.to_string();
            entry.add_listener(kind, move |event| {
                log.lock().push(format!("{}:{}", name, event.kind));
            });
        }
    }

    /// Record entry events on every entry a push creates.
    fn record_pushed_entries(nav: &Navigation, log: &Log) {
        let log = Arc::clone(log);
        nav.add_listener(NavigationEventKind::Navigate, move |event| {
            if let Some(intent) = event.as_navigate() {
                if intent.navigation_type() == NavigationType::Push {
                    let entry = intent.destination().entry();
                    record_entry(entry, &label(entry), &log);
                }
            }
        });
    }

    /// Intercept pushes to `path` with a deferral that never completes.
    fn stall_pushes_to(nav: &Navigation, path: &'static str) {
        nav.add_listener(NavigationEventKind::Navigate, move |event| {
            let Some(intent) = event.as_navigate() else {
                return;
            };
            if intent.destination().url().is_some_and(|u| u.path() == path) {
                intent
                    .transition_while(async {
                        futures_util::future::pending::<()>().await;
                        anyhow::Ok(())
                    })
                    .unwrap();
            }
        });
    }

    fn drain(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock())
    }

    #[tokio::test]
    async fn test_initial_entry() {
        let nav = navigation();
        let entries = nav.entries();
        assert_eq!(entries.len(), 1);

        let current = nav.current_entry().unwrap();
        assert_eq!(current.index(), Some(0));
        assert_eq!(current.url().unwrap().as_str(), "https://example.com/a");
        assert!(nav.transition().is_none());
        assert!(!nav.can_go_back());
        assert!(!nav.can_go_forward());
    }

    #[tokio::test]
    async fn test_push_back_push_scenario() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);
        record_pushed_entries(&nav, &log);
        let a = nav.current_entry().unwrap();
        record_entry(&a, "a", &log);

        // push /b
        let result = nav.navigate("/b", NavigateOptions::default());
        let b = result.committed.await.unwrap();
        assert_eq!(result.finished.await.unwrap(), b);
        assert_eq!(nav.entries(), vec![a.clone(), b.clone()]);
        assert_eq!(
            drain(&log),
            vec![
                "navigate:push",
                "b:navigateto",
                "a:navigatefrom",
                "currententrychange:push",
                "b:finish",
                "navigatesuccess:push",
            ]
        );

        // back to a
        let result = nav.back(NavigationOptions::default());
        assert_eq!(result.finished.await.unwrap(), a);
        assert_eq!(nav.current_entry().unwrap(), a);
        assert!(nav.can_go_forward());
        assert_eq!(
            drain(&log),
            vec![
                "navigate:traverse",
                "a:navigateto",
                "b:navigatefrom",
                "currententrychange:traverse",
                "a:finish",
                "navigatesuccess:traverse",
            ]
        );

        // push /c discards b
        let result = nav.navigate("/c", NavigateOptions::default());
        let c = result.finished.await.unwrap();
        assert_eq!(nav.entries(), vec![a.clone(), c.clone()]);
        assert!(b.is_disposed());
        assert_eq!(b.index(), None);
        assert_eq!(
            drain(&log),
            vec![
                "navigate:push",
                "c:navigateto",
                "a:navigatefrom",
                "currententrychange:push",
                "b:dispose",
                "c:finish",
                "navigatesuccess:push",
            ]
        );
    }

    #[tokio::test]
    async fn test_push_keeps_cursor_at_tail() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_pushed_entries(&nav, &log);
        for path in ["/b", "/c", "/d"] {
            nav.navigate(path, NavigateOptions::default())
                .finished
                .await
                .unwrap();
            let current = nav.current_entry().unwrap();
            assert_eq!(current.index(), Some(nav.entries().len() - 1));
        }

        nav.back(NavigationOptions::default()).finished.await.unwrap();
        nav.back(NavigationOptions::default()).finished.await.unwrap();
        drain(&log);
        nav.navigate("/e", NavigateOptions::default())
            .finished
            .await
            .unwrap();

        let paths: Vec<String> = nav.entries().iter().map(label).collect();
        assert_eq!(paths, vec!["a", "b", "e"]);
        assert_eq!(nav.current_entry().unwrap().index(), Some(2));

        // The forward entries go exactly once, in index order
        let disposed: Vec<String> = drain(&log)
            .into_iter()
            .filter(|line| line.ends_with(":dispose"))
            .collect();
        assert_eq!(disposed, vec!["c:dispose", "d:dispose"]);
    }

    #[tokio::test]
    async fn test_replace_keeps_key_and_slot() {
        let nav = navigation();
        nav.navigate("/b", NavigateOptions::default())
            .finished
            .await
            .unwrap();
        let before = nav.current_entry().unwrap();
        let disposed = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&disposed);
        before.add_listener(EntryEventKind::Dispose, move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        let after = nav
            .navigate("/c", NavigateOptions::replace().with_state(serde_json::json!(7)))
            .finished
            .await
            .unwrap();

        assert_eq!(after.key(), before.key());
        assert_ne!(after.id(), before.id());
        assert_eq!(after.index(), Some(1));
        assert_eq!(after.state(), Some(serde_json::json!(7)));
        assert_eq!(nav.entries().len(), 2);
        assert!(before.is_disposed());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reload_mints_new_id() {
        let nav = navigation();
        let current = nav.current_entry().unwrap();
        let key = current.key().to_string();
        let id = current.id();

        let reloaded = nav
            .reload(ReloadOptions {
                state: Some(serde_json::json!({"v": 2})),
                ..ReloadOptions::default()
            })
            .finished
            .await
            .unwrap();

        assert_eq!(reloaded, current);
        assert_eq!(reloaded.key(), key);
        assert_ne!(reloaded.id(), id);
        assert_eq!(reloaded.state(), Some(serde_json::json!({"v": 2})));
        assert_eq!(nav.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_traverse_to_unknown_key_rejects_without_mutation() {
        let nav = navigation();
        nav.navigate("/b", NavigateOptions::default())
            .finished
            .await
            .unwrap();
        let log: Log = Arc::default();
        record_engine(&nav, &log);
        let before = nav.entries();

        let result = nav.traverse_to("missing", NavigationOptions::default());
        let committed = result.committed.await.unwrap_err();
        let finished = result.finished.await.unwrap_err();

        assert_eq!(committed.kind(), ErrorKind::InvalidState);
        assert_eq!(finished.kind(), ErrorKind::InvalidState);
        assert_eq!(nav.entries(), before);
        assert_eq!(nav.current_entry().unwrap(), before[1]);
        assert!(drain(&log).is_empty());
    }

    #[tokio::test]
    async fn test_traverse_to_current_key_is_immediate() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);
        let current = nav.current_entry().unwrap();

        let result = nav.traverse_to(current.key(), NavigationOptions::default());
        assert_eq!(result.committed.await.unwrap(), current);
        assert_eq!(result.finished.await.unwrap(), current);
        assert!(drain(&log).is_empty());
    }

    #[tokio::test]
    async fn test_back_and_forward_at_the_edges() {
        let nav = navigation();
        let err = nav.back(NavigationOptions::default()).finished.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = nav
            .forward(NavigationOptions::default())
            .committed
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        nav.navigate("/b", NavigateOptions::default())
            .finished
            .await
            .unwrap();
        nav.back(NavigationOptions::default()).finished.await.unwrap();
        let b = nav.forward(NavigationOptions::default()).finished.await.unwrap();
        assert_eq!(label(&b), "b");
    }

    #[tokio::test]
    async fn test_malformed_url_is_a_syntax_error() {
        let nav = navigation();
        let result = nav.navigate("https://exa mple.com/", NavigateOptions::default());
        assert_eq!(result.committed.await.unwrap_err().kind(), ErrorKind::Syntax);
        assert_eq!(nav.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_deferral_holds_transition_open() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);

        let gate = Arc::new(Notify::new());
        let g = Arc::clone(&gate);
        nav.add_listener(NavigationEventKind::Navigate, move |event| {
            let g = Arc::clone(&g);
            event
                .as_navigate()
                .unwrap()
                .transition_while(async move {
                    g.notified().await;
                    anyhow::Ok(())
                })
                .unwrap();
        });

        let result = nav.navigate("/b", NavigateOptions::default());

        // Committed synchronously, still waiting on the deferral
        let current = nav.current_entry().unwrap();
        assert_eq!(label(&current), "b");
        assert!(current.same_document());
        let transition = nav.transition().unwrap();
        assert_eq!(transition.phase(), TransitionPhase::Committed);
        assert_eq!(transition.from().url().unwrap().path(), "/a");
        assert_eq!(result.committed.clone().await.unwrap(), current);
        assert_eq!(drain(&log), vec!["navigate:push", "currententrychange:push"]);

        gate.notify_one();
        assert_eq!(result.finished.await.unwrap(), current);
        assert!(nav.transition().is_none());
        assert_eq!(transition.phase(), TransitionPhase::Finished);
        assert_eq!(drain(&log), vec!["navigatesuccess:push"]);
    }

    #[tokio::test]
    async fn test_new_navigation_interrupts_pending_deferrals() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);
        stall_pushes_to(&nav, "/b");

        let first = nav.navigate("/b", NavigateOptions::default());
        let signal = nav.transition().unwrap().signal();
        let second = nav.navigate("/c", NavigateOptions::default());

        let b = first.committed.await.unwrap();
        assert_eq!(label(&b), "b");
        assert!(first.finished.await.unwrap_err().is_abort());
        assert!(signal.is_aborted());

        let c = second.finished.await.unwrap();
        assert_eq!(nav.current_entry().unwrap(), c);
        assert_eq!(
            drain(&log),
            vec![
                "navigate:push",
                "currententrychange:push",
                "navigateerror:push",
                "navigate:push",
                "currententrychange:push",
                "navigatesuccess:push",
            ]
        );
    }

    #[tokio::test]
    async fn test_prevent_default_cancels() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);
        nav.add_listener(NavigationEventKind::Navigate, |event| {
            event.as_navigate().unwrap().prevent_default();
        });

        let result = nav.navigate("/b", NavigateOptions::default());
        assert!(result.committed.await.unwrap_err().is_abort());
        assert!(result.finished.await.unwrap_err().is_abort());

        assert_eq!(nav.entries().len(), 1);
        assert_eq!(label(&nav.current_entry().unwrap()), "a");
        assert!(nav.transition().is_none());
        assert_eq!(drain(&log), vec!["navigate:push", "navigateerror:push"]);
    }

    #[tokio::test]
    async fn test_failed_deferral_keeps_commit() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);
        nav.add_listener(NavigationEventKind::Navigate, |event| {
            event
                .as_navigate()
                .unwrap()
                .transition_while(async { Err::<(), _>(anyhow::anyhow!("boom")) })
                .unwrap();
        });

        let result = nav.navigate("/b", NavigateOptions::default());
        let b = result.committed.await.unwrap();
        let err = result.finished.await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Handler);
        assert!(err.to_string().contains("boom"));
        assert_eq!(nav.current_entry().unwrap(), b);
        assert!(nav.transition().is_none());
        assert_eq!(
            drain(&log),
            vec!["navigate:push", "currententrychange:push", "navigateerror:push"]
        );
    }

    #[tokio::test]
    async fn test_failed_deferral_does_not_wait_for_pending_siblings() {
        let nav = navigation();
        nav.add_listener(NavigationEventKind::Navigate, |event| {
            let intent = event.as_navigate().unwrap();
            intent
                .transition_while(async {
                    futures_util::future::pending::<()>().await;
                    anyhow::Ok(())
                })
                .unwrap();
            intent
                .transition_while(async { Err::<(), _>(anyhow::anyhow!("boom")) })
                .unwrap();
        });

        let result = nav.navigate("/b", NavigateOptions::default());
        let finished = tokio::time::timeout(Duration::from_secs(2), result.finished)
            .await
            .expect("finished should settle once one deferral fails");
        let err = finished.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Handler);
        assert!(err.to_string().contains("boom"));
        assert!(nav.transition().is_none());
    }

    #[tokio::test]
    async fn test_cross_origin_cannot_be_transitioned() {
        let nav = navigation();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        nav.add_listener(NavigationEventKind::Navigate, move |event| {
            let intent = event.as_navigate().unwrap();
            let refused = intent
                .transition_while_with(async { anyhow::Ok(()) }, TransitionWhileOptions::default())
                .is_err();
            *s.lock() = Some((intent.can_transition(), refused));
        });

        let other = nav
            .navigate("https://other.org/x", NavigateOptions::default())
            .finished
            .await
            .unwrap();

        assert_eq!(*seen.lock(), Some((false, true)));
        assert_eq!(other.url().unwrap().host_str(), Some("other.org"));
        assert!(!other.same_document());
    }

    #[tokio::test]
    async fn test_fragment_navigation() {
        let nav = navigation();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        nav.add_listener(NavigationEventKind::Navigate, move |event| {
            let intent = event.as_navigate().unwrap();
            *s.lock() = Some((intent.hash_change(), intent.destination().same_document()));
        });

        let before = nav.current_entry().unwrap();
        let entry = nav
            .navigate("#section", NavigateOptions::default())
            .finished
            .await
            .unwrap();

        assert_eq!(*seen.lock(), Some((true, true)));
        assert!(entry.same_document());
        assert_ne!(entry.key(), before.key());
        assert_eq!(entry.url().unwrap().as_str(), "https://example.com/a#section");
    }

    #[tokio::test]
    async fn test_navigation_from_listener_supersedes_outer() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);

        let inner = nav.clone();
        nav.add_listener(NavigationEventKind::Navigate, move |event| {
            let intent = event.as_navigate().unwrap();
            if intent.destination().url().is_some_and(|u| u.path() == "/b") {
                inner.navigate("/c", NavigateOptions::default());
            }
        });

        let outer = nav.navigate("/b", NavigateOptions::default());
        assert!(outer.committed.await.unwrap_err().is_abort());

        let paths: Vec<String> = nav.entries().iter().map(label).collect();
        assert_eq!(paths, vec!["a", "c"]);
        assert_eq!(
            drain(&log),
            vec![
                "navigate:push",
                "navigateerror:push",
                "navigate:push",
                "currententrychange:push",
                "navigatesuccess:push",
            ]
        );
    }

    struct RecordingRenderer(Log);

    impl RenderHandler for RecordingRenderer {
        fn render(&self, entry: &HistoryEntry, _: NavigationType) -> Option<DeferredAction> {
            self.0.lock().push(label(entry));
            None
        }
    }

    #[tokio::test]
    async fn test_navigation_from_navigatefrom_listener_takes_over() {
        let rendered: Log = Arc::default();
        let nav = Navigation::builder(Config::new("https://example.com/a"))
            .renderer(RecordingRenderer(Arc::clone(&rendered)))
            .build()
            .unwrap();
        let log: Log = Arc::default();
        record_engine(&nav, &log);

        let inner = nav.clone();
        nav.current_entry()
            .unwrap()
            .add_listener(EntryEventKind::NavigateFrom, move |_| {
                inner.navigate("/c", NavigateOptions::default());
            });

        let outer = nav.navigate("/b", NavigateOptions::default());
        let b = outer.committed.await.unwrap();
        assert_eq!(label(&b), "b");
        assert!(outer.finished.await.unwrap_err().is_abort());

        let paths: Vec<String> = nav.entries().iter().map(label).collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
        assert_eq!(label(&nav.current_entry().unwrap()), "c");
        assert!(nav.transition().is_none());

        // Only the inner navigation renders and reports an entry change
        assert_eq!(drain(&rendered), vec!["c"]);
        assert_eq!(
            drain(&log),
            vec![
                "navigate:push",
                "navigateerror:push",
                "navigate:push",
                "currententrychange:push",
                "navigatesuccess:push",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_navigations_commit_consistently() {
        let nav = navigation();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let nav = nav.clone();
                tokio::task::spawn_blocking(move || {
                    nav.navigate(&format!("/n{}", i), NavigateOptions::default())
                })
            })
            .collect();

        let mut committed = Vec::new();
        for task in tasks {
            let result = task.await.unwrap();
            if let Ok(entry) = result.committed.await {
                committed.push(entry);
            }
        }

        // An entry is in the list exactly when its committed promise resolved
        let entries = nav.entries();
        assert!(!committed.is_empty());
        assert_eq!(entries.len(), committed.len() + 1);
        for entry in &committed {
            assert!(entries.contains(entry), "{} missing from the list", label(entry));
        }
        assert_eq!(nav.current_entry().unwrap().index(), Some(entries.len() - 1));
        assert!(format!("{:?}", nav).contains("Navigation"));
    }

    #[tokio::test]
    async fn test_update_current_entry_fires_nothing() {
        let nav = navigation();
        let log: Log = Arc::default();
        record_engine(&nav, &log);
        let current = nav.current_entry().unwrap();
        record_entry(&current, "a", &log);
        let id = current.id();

        nav.update_current_entry(serde_json::json!({"scroll": 120}))
            .unwrap();

        assert_eq!(current.state(), Some(serde_json::json!({"scroll": 120})));
        assert_eq!(current.id(), id);
        assert_eq!(current.index(), Some(0));
        assert!(drain(&log).is_empty());
    }

    #[tokio::test]
    async fn test_rollback_after_push() {
        let nav = navigation();
        stall_pushes_to(&nav, "/b");
        let a = nav.current_entry().unwrap();

        let push = nav.navigate("/b", NavigateOptions::default());
        push.committed.clone().await.unwrap();

        let rollback = nav.rollback(NavigationOptions::default());
        assert_eq!(rollback.finished.await.unwrap(), a);
        assert!(push.finished.await.unwrap_err().is_abort());
        assert_eq!(nav.current_entry().unwrap(), a);
        // Rolling back a push traverses; the pushed entry stays forward
        assert!(nav.can_go_forward());
    }

    #[tokio::test]
    async fn test_rollback_after_replace_restores_url_and_state() {
        let nav = navigation();
        nav.update_current_entry(serde_json::json!("original")).unwrap();
        nav.add_listener(NavigationEventKind::Navigate, |event| {
            let intent = event.as_navigate().unwrap();
            if intent.navigation_type() == NavigationType::Replace
                && intent.destination().url().is_some_and(|u| u.path() == "/b")
            {
                intent
                    .transition_while(futures_util::future::pending())
                    .unwrap();
            }
        });

        let replace = nav.navigate("/b", NavigateOptions::replace());
        replace.committed.clone().await.unwrap();
        assert_eq!(label(&nav.current_entry().unwrap()), "b");

        let restored = nav
            .rollback(NavigationOptions::default())
            .finished
            .await
            .unwrap();
        assert_eq!(label(&restored), "a");
        assert_eq!(restored.state(), Some(serde_json::json!("original")));
        assert_eq!(nav.entries().len(), 1);
        assert!(replace.finished.await.unwrap_err().is_abort());
    }

    #[tokio::test]
    async fn test_rollback_without_transition() {
        let nav = navigation();
        let err = nav
            .rollback(NavigationOptions::default())
            .finished
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_size_limit_disposes_oldest() {
        let config = Config {
            max_entries: 3,
            ..Config::new("https://example.com/a")
        };
        let nav = Navigation::new(config).unwrap();
        let a = nav.current_entry().unwrap();

        for path in ["/b", "/c", "/d"] {
            nav.navigate(path, NavigateOptions::default())
                .finished
                .await
                .unwrap();
        }

        let paths: Vec<String> = nav.entries().iter().map(label).collect();
        assert_eq!(paths, vec!["b", "c", "d"]);
        assert!(a.is_disposed());
        assert_eq!(nav.current_entry().unwrap().index(), Some(2));
    }

    #[tokio::test]
    async fn test_handler_slot_replaces_previous_handler() {
        let nav = navigation();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        nav.set_handler(
            NavigationEventKind::NavigateSuccess,
            Some(Arc::new(move |_: &NavigationEvent| {
                f.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let s = Arc::clone(&second);
        nav.set_handler(
            NavigationEventKind::NavigateSuccess,
            Some(Arc::new(move |_: &NavigationEvent| {
                s.fetch_add(1, Ordering::SeqCst);
            })),
        );

        nav.navigate("/b", NavigateOptions::default())
            .finished
            .await
            .unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        nav.set_handler(NavigationEventKind::NavigateSuccess, None);
        nav.navigate("/c", NavigateOptions::default())
            .finished
            .await
            .unwrap();
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    struct Renderer;

    impl RenderHandler for Renderer {
        fn render(&self, entry: &HistoryEntry, _: NavigationType) -> Option<DeferredAction> {
            let broken = entry.url().is_some_and(|u| u.path() == "/broken");
            let action: DeferredAction = Box::pin(async move {
                if broken {
                    anyhow::bail!("render failed");
                }
                Ok(())
            });
            Some(action)
        }
    }

    #[tokio::test]
    async fn test_render_handler_joins_deferral_phase() {
        let nav = Navigation::builder(Config::new("https://example.com/a"))
            .renderer(Renderer)
            .build()
            .unwrap();

        let ok = nav.navigate("/b", NavigateOptions::default());
        assert_eq!(label(&ok.finished.await.unwrap()), "b");

        let broken = nav.navigate("/broken", NavigateOptions::default());
        let entry = broken.committed.await.unwrap();
        let err = broken.finished.await.unwrap_err();
        assert!(err.to_string().contains("render failed"));
        assert_eq!(nav.current_entry().unwrap(), entry);
    }

    #[tokio::test]
    async fn test_history_survives_restart() {
        let db = Database::open_in_memory().unwrap();
        let config = Config::new("https://example.com/a");

        let nav = Navigation::builder(config.clone())
            .repository(HistoryRepository::new(db.clone()))
            .build()
            .unwrap();
        nav.navigate("/b", NavigateOptions::default())
            .finished
            .await
            .unwrap();
        nav.navigate("/c", NavigateOptions::default())
            .finished
            .await
            .unwrap();
        nav.back(NavigationOptions::default()).finished.await.unwrap();
        nav.update_current_entry(serde_json::json!({"scroll": 3}))
            .unwrap();
        let keys: Vec<String> = nav.entries().iter().map(|e| e.key().to_string()).collect();

        let restored = Navigation::builder(config)
            .repository(HistoryRepository::new(db))
            .build()
            .unwrap();
        let restored_keys: Vec<String> = restored
            .entries()
            .iter()
            .map(|e| e.key().to_string())
            .collect();

        assert_eq!(restored_keys, keys);
        let current = restored.current_entry().unwrap();
        assert_eq!(label(&current), "b");
        assert_eq!(current.state(), Some(serde_json::json!({"scroll": 3})));
        assert!(restored.can_go_forward());
    }

    #[tokio::test]
    async fn test_invalid_initial_url() {
        match Navigation::new(Config::new("not a url")) {
            Err(CoreError::Config(_)) => {}
            other => panic!("expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_requires_runtime() {
        match Navigation::new(Config::default()) {
            Err(CoreError::NoRuntime) => {}
            other => panic!("expected NoRuntime, got {:?}", other),
        }
    }
}
