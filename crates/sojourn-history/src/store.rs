//! Entry store
//!
//! Owns the entry list and the current index. Mutation is two-phase:
//! `plan_*` computes the prospective change without touching the list,
//! [`EntryStore::commit`] applies it in one step. A plan records the list
//! generation it was made against and is refused once the list has moved on.

use serde_json::Value;
use url::Url;

use crate::entry::{EntrySnapshot, HistoryEntry};
use crate::error::HistoryError;
use crate::kind::NavigationType;
use crate::Result;

/// Chromium caps joint session history at 50 entries.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone)]
pub(crate) enum PlannedChange {
    /// Discard entries at `splice_from..`, then append `entry`
    Push {
        entry: HistoryEntry,
        splice_from: usize,
    },
    /// Swap the entry at `index` for `entry` (same key)
    Replace { entry: HistoryEntry, index: usize },
    /// Give `entry` a new id and, if supplied, a new state
    Reload {
        entry: HistoryEntry,
        id: String,
        state: Option<Value>,
    },
    /// Move the cursor to `index`
    Traverse { entry: HistoryEntry, index: usize },
}

/// A prospective change to the entry list. Nothing happens until it is committed.
#[derive(Debug, Clone)]
pub struct HistoryPlan {
    change: PlannedChange,
    same_document: bool,
    generation: u64,
}

impl HistoryPlan {
    pub fn navigation_type(&self) -> NavigationType {
        match self.change {
            PlannedChange::Push { .. } => NavigationType::Push,
            PlannedChange::Replace { .. } => NavigationType::Replace,
            PlannedChange::Reload { .. } => NavigationType::Reload,
            PlannedChange::Traverse { .. } => NavigationType::Traverse,
        }
    }

    /// The entry that becomes current once the plan is committed
    pub fn entry(&self) -> &HistoryEntry {
        match &self.change {
            PlannedChange::Push { entry, .. }
            | PlannedChange::Replace { entry, .. }
            | PlannedChange::Reload { entry, .. }
            | PlannedChange::Traverse { entry, .. } => entry,
        }
    }

    /// Index the destination will occupy (before any size-limit trimming)
    pub fn destination_index(&self) -> usize {
        match &self.change {
            PlannedChange::Push { splice_from, .. } => *splice_from,
            PlannedChange::Replace { index, .. } | PlannedChange::Traverse { index, .. } => *index,
            PlannedChange::Reload { entry, .. } => entry.index().unwrap_or_default(),
        }
    }

    /// Id the destination will carry after commit
    pub fn destination_id(&self) -> String {
        match &self.change {
            PlannedChange::Reload { id, .. } => id.clone(),
            _ => self.entry().id(),
        }
    }

    /// State the destination will carry after commit
    pub fn destination_state(&self) -> Option<Value> {
        match &self.change {
            PlannedChange::Reload {
                entry,
                state: None,
                ..
            } => entry.state(),
            PlannedChange::Reload { state, .. } => state.clone(),
            _ => self.entry().state(),
        }
    }

    pub fn same_document(&self) -> bool {
        self.same_document
    }

    /// Reclassify the destination (e.g. once a navigation has been intercepted).
    /// Ignored for traversals, which keep the entry's own classification.
    pub fn set_same_document(&mut self, same_document: bool) {
        if !matches!(self.change, PlannedChange::Traverse { .. }) {
            self.same_document = same_document;
        }
    }
}

/// What a commit did to the list.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub navigation_type: NavigationType,
    /// Entry that was current before the commit
    pub previous: Option<HistoryEntry>,
    pub current: HistoryEntry,
    /// Entries removed by this commit, in their former index order
    pub disposed: Vec<HistoryEntry>,
}

#[derive(Debug)]
pub struct EntryStore {
    entries: Vec<HistoryEntry>,
    current_index: Option<usize>,
    max_entries: usize,
    generation: u64,
}

impl EntryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            current_index: None,
            max_entries: max_entries.max(1),
            generation: 0,
        }
    }

    /// Snapshot of the list; later commits do not affect the returned vector
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    pub fn current(&self) -> Option<HistoryEntry> {
        self.current_index.and_then(|i| self.entries.get(i)).cloned()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn entry_at(&self, index: usize) -> Option<HistoryEntry> {
        self.entries.get(index).cloned()
    }

    pub fn find_by_key(&self, key: &str) -> Option<HistoryEntry> {
        self.entries.iter().find(|e| e.key() == key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn can_go_back(&self) -> bool {
        self.current_index.is_some_and(|i| i > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.current_index
            .is_some_and(|i| i + 1 < self.entries.len())
    }

    pub fn plan_push(&self, url: Url, state: Option<Value>, same_document: bool) -> HistoryPlan {
        let splice_from = self.current_index.map_or(0, |i| i + 1);
        self.plan(
            PlannedChange::Push {
                entry: HistoryEntry::new(Some(url), state, same_document),
                splice_from,
            },
            same_document,
        )
    }

    pub fn plan_replace(
        &self,
        url: Url,
        state: Option<Value>,
        same_document: bool,
    ) -> Result<HistoryPlan> {
        let (index, current) = self.require_current()?;
        let entry = HistoryEntry::in_slot(current.key().to_string(), Some(url), state, same_document);
        Ok(self.plan(PlannedChange::Replace { entry, index }, same_document))
    }

    /// Re-commit the current entry. `state: None` keeps the existing state.
    pub fn plan_reload(&self, state: Option<Value>, same_document: bool) -> Result<HistoryPlan> {
        let (_, current) = self.require_current()?;
        Ok(self.plan(
            PlannedChange::Reload {
                entry: current,
                id: uuid::Uuid::new_v4().to_string(),
                state,
            },
            same_document,
        ))
    }

    pub fn plan_traverse(&self, key: &str) -> Result<HistoryPlan> {
        let index = self
            .entries
            .iter()
            .position(|e| e.key() == key)
            .ok_or_else(|| HistoryError::KeyNotFound(key.to_string()))?;
        let entry = self.entries[index].clone();
        let same_document = entry.same_document();
        Ok(self.plan(PlannedChange::Traverse { entry, index }, same_document))
    }

    /// Apply a plan. Readers holding an `entries()` snapshot never see a
    /// half-spliced list.
    pub fn commit(&mut self, plan: HistoryPlan) -> Result<CommitOutcome> {
        if plan.generation != self.generation {
            return Err(HistoryError::StalePlan);
        }

        let navigation_type = plan.navigation_type();
        let previous = self.current();
        let mut disposed = Vec::new();

        match plan.change {
            PlannedChange::Push { entry, splice_from } => {
                disposed.extend(self.entries.drain(splice_from.min(self.entries.len())..));
                entry.set_same_document(plan.same_document);
                self.entries.push(entry);

                if self.entries.len() > self.max_entries {
                    let overflow = self.entries.len() - self.max_entries;
                    let trimmed: Vec<HistoryEntry> = self.entries.drain(..overflow).collect();
                    // Trimmed entries sat before the truncated ones
                    disposed.splice(0..0, trimmed);
                }

                for (i, e) in self.entries.iter().enumerate() {
                    e.set_index(i);
                }
                self.current_index = Some(self.entries.len() - 1);
            }
            PlannedChange::Replace { entry, index } => {
                let slot = self
                    .entries
                    .get_mut(index)
                    .ok_or(HistoryError::StalePlan)?;
                entry.set_same_document(plan.same_document);
                entry.set_index(index);
                disposed.push(std::mem::replace(slot, entry));
            }
            PlannedChange::Reload { entry, id, state } => {
                entry.assign_id(id);
                if let Some(state) = state {
                    entry.set_state(Some(state));
                }
                entry.set_same_document(plan.same_document);
            }
            PlannedChange::Traverse { index, .. } => {
                self.current_index = Some(index);
            }
        }

        for e in &disposed {
            e.dispose();
        }
        self.generation += 1;

        let current = self.current().ok_or(HistoryError::NoCurrentEntry)?;

        tracing::info!(
            navigation_type = %navigation_type,
            key = %current.key(),
            index = ?self.current_index,
            disposed = disposed.len(),
            "Committed history change"
        );

        Ok(CommitOutcome {
            navigation_type,
            previous,
            current,
            disposed,
        })
    }

    /// Swap the current entry's state payload. Not a navigation: id, key,
    /// index and the list generation are untouched.
    pub fn update_current_state(&self, state: Value) -> Result<()> {
        let (_, current) = self.require_current()?;
        current.set_state(Some(state));
        Ok(())
    }

    pub fn snapshot(&self) -> (Vec<EntrySnapshot>, Option<usize>) {
        let entries = self
            .entries
            .iter()
            .filter_map(HistoryEntry::snapshot)
            .collect();
        (entries, self.current_index)
    }

    /// Replace the whole list with persisted entries.
    pub fn restore(
        &mut self,
        mut snapshots: Vec<EntrySnapshot>,
        current_index: Option<usize>,
    ) -> Result<()> {
        snapshots.sort_by_key(|s| s.index);

        for (expected, snapshot) in snapshots.iter().enumerate() {
            if snapshot.index != expected {
                return Err(HistoryError::InvalidSnapshot(format!(
                    "expected index {}, found {}",
                    expected, snapshot.index
                )));
            }
        }

        match current_index {
            Some(i) if i >= snapshots.len() => {
                return Err(HistoryError::InvalidSnapshot(format!(
                    "current index {} out of range for {} entries",
                    i,
                    snapshots.len()
                )));
            }
            None if !snapshots.is_empty() => {
                return Err(HistoryError::InvalidSnapshot(
                    "entries without a current index".to_string(),
                ));
            }
            _ => {}
        }

        let mut entries = snapshots
            .into_iter()
            .map(HistoryEntry::from_snapshot)
            .collect::<Result<Vec<_>>>()?;

        // Keep the newest entries if the limit shrank since the snapshot was taken
        let mut current_index = current_index;
        if entries.len() > self.max_entries {
            let overflow = entries.len() - self.max_entries;
            entries.drain(..overflow);
            current_index = current_index.map(|i| i.saturating_sub(overflow));
            for (i, e) in entries.iter().enumerate() {
                e.set_index(i);
            }
        }

        for old in self.entries.drain(..) {
            old.dispose();
        }
        self.entries = entries;
        self.current_index = current_index;
        self.generation += 1;

        tracing::info!(
            entries = self.entries.len(),
            current_index = ?self.current_index,
            "Restored session history"
        );

        Ok(())
    }

    fn plan(&self, change: PlannedChange, same_document: bool) -> HistoryPlan {
        HistoryPlan {
            change,
            same_document,
            generation: self.generation,
        }
    }

    fn require_current(&self) -> Result<(usize, HistoryEntry)> {
        let index = self.current_index.ok_or(HistoryError::NoCurrentEntry)?;
        let entry = self
            .entries
            .get(index)
            .cloned()
            .ok_or(HistoryError::NoCurrentEntry)?;
        Ok((index, entry))
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
