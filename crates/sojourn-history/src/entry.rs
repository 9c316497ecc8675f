//! History entry handle
//!
//! A `HistoryEntry` is a shared handle: clones refer to the same slot
//! content and the same listener registry, and equality is identity.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use sojourn_events::{Event, EventTarget, Listener, ListenerId};

use crate::error::HistoryError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryEventKind {
    /// The entry is the destination of a navigation that has not committed yet
    NavigateTo,
    /// The entry stopped being current
    NavigateFrom,
    /// The navigation that made this entry current finished successfully
    Finish,
    /// The entry was removed from the list and will not come back
    Dispose,
}

impl EntryEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryEventKind::NavigateTo => "navigateto",
            EntryEventKind::NavigateFrom => "navigatefrom",
            EntryEventKind::Finish => "finish",
            EntryEventKind::Dispose => "dispose",
        }
    }
}

impl std::fmt::Display for EntryEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct EntryEvent {
    pub kind: EntryEventKind,
    pub entry: HistoryEntry,
}

impl Event for EntryEvent {
    type Kind = EntryEventKind;

    fn kind(&self) -> EntryEventKind {
        self.kind
    }
}

/// Serializable copy of an entry, used for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: String,
    pub id: String,
    pub url: Option<String>,
    pub index: usize,
    pub same_document: bool,
    pub state: Option<Value>,
    pub created_at: DateTime<Utc>,
}

struct EntrySlot {
    id: String,
    index: Option<usize>,
    same_document: bool,
    state: Option<Value>,
    disposed: bool,
}

struct EntryInner {
    key: String,
    url: Option<Url>,
    created_at: DateTime<Utc>,
    slot: RwLock<EntrySlot>,
    events: EventTarget<EntryEvent>,
}

#[derive(Clone)]
pub struct HistoryEntry {
    inner: Arc<EntryInner>,
}

impl HistoryEntry {
    /// A brand-new slot: fresh key and id, not yet placed in any list.
    pub(crate) fn new(url: Option<Url>, state: Option<Value>, same_document: bool) -> Self {
        Self::in_slot(Uuid::new_v4().to_string(), url, state, same_document)
    }

    /// New content for an existing slot: same key, fresh id.
    pub(crate) fn in_slot(
        key: String,
        url: Option<Url>,
        state: Option<Value>,
        same_document: bool,
    ) -> Self {
        Self {
            inner: Arc::new(EntryInner {
                key,
                url,
                created_at: Utc::now(),
                slot: RwLock::new(EntrySlot {
                    id: Uuid::new_v4().to_string(),
                    index: None,
                    same_document,
                    state,
                    disposed: false,
                }),
                events: EventTarget::new(),
            }),
        }
    }

    pub(crate) fn from_snapshot(snapshot: EntrySnapshot) -> Result<Self> {
        let url = snapshot
            .url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| HistoryError::InvalidSnapshot(format!("entry {}: {}", snapshot.key, e)))?;

        Ok(Self {
            inner: Arc::new(EntryInner {
                key: snapshot.key,
                url,
                created_at: snapshot.created_at,
                slot: RwLock::new(EntrySlot {
                    id: snapshot.id,
                    index: Some(snapshot.index),
                    same_document: snapshot.same_document,
                    state: snapshot.state,
                    disposed: false,
                }),
                events: EventTarget::new(),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn id(&self) -> String {
        self.inner.slot.read().id.clone()
    }

    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Position in the list; `None` before commit and after disposal
    pub fn index(&self) -> Option<usize> {
        self.inner.slot.read().index
    }

    pub fn same_document(&self) -> bool {
        self.inner.slot.read().same_document
    }

    /// Copy of the state payload
    pub fn state(&self) -> Option<Value> {
        self.inner.slot.read().state.clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.slot.read().disposed
    }

    /// Identity comparison; two handles to the same entry
    pub fn same_entry(&self, other: &HistoryEntry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn add_listener<F>(&self, kind: EntryEventKind, listener: F) -> ListenerId
    where
        F: Fn(&EntryEvent) + Send + Sync + 'static,
    {
        self.inner.events.add_listener(kind, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    /// `onnavigateto` / `onnavigatefrom` / `onfinish` / `ondispose`
    pub fn set_handler(&self, kind: EntryEventKind, handler: Option<Listener<EntryEvent>>) {
        self.inner.events.set_handler(kind, handler)
    }

    /// Notify this entry's listeners. Returns the number of callbacks run.
    pub fn fire(&self, kind: EntryEventKind) -> usize {
        tracing::debug!(key = %self.key(), event = %kind, "Entry event");
        self.inner.events.dispatch(&EntryEvent {
            kind,
            entry: self.clone(),
        })
    }

    pub fn snapshot(&self) -> Option<EntrySnapshot> {
        let slot = self.inner.slot.read();
        let index = slot.index?;
        Some(EntrySnapshot {
            key: self.inner.key.clone(),
            id: slot.id.clone(),
            url: self.inner.url.as_ref().map(|u| u.to_string()),
            index,
            same_document: slot.same_document,
            state: slot.state.clone(),
            created_at: self.inner.created_at,
        })
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.inner.slot.write().index = Some(index);
    }

    pub(crate) fn set_state(&self, state: Option<Value>) {
        self.inner.slot.write().state = state;
    }

    pub(crate) fn set_same_document(&self, same_document: bool) {
        self.inner.slot.write().same_document = same_document;
    }

    pub(crate) fn assign_id(&self, id: String) {
        self.inner.slot.write().id = id;
    }

    /// Detach from the list. Listeners stay registered so `dispose` can reach them.
    pub(crate) fn dispose(&self) {
        let mut slot = self.inner.slot.write();
        slot.index = None;
        slot.disposed = true;
    }
}

impl PartialEq for HistoryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.same_entry(other)
    }
}

impl Eq for HistoryEntry {}

impl std::fmt::Debug for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.slot.read();
        f.debug_struct("HistoryEntry")
            .field("key", &self.inner.key)
            .field("id", &slot.id)
            .field("url", &self.inner.url.as_ref().map(Url::as_str))
            .field("index", &slot.index)
            .field("same_document", &slot.same_document)
            .field("disposed", &slot.disposed)
            .finish()
    }
}
