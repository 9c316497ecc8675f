//! Committed / finished promise pair

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use sojourn_history::HistoryEntry;

use crate::error::NavigationError;

pub type NavigationOutcome = std::result::Result<HistoryEntry, NavigationError>;

/// Clonable future settled by the engine; every clone sees the same outcome.
pub type NavigationFuture = Shared<BoxFuture<'static, NavigationOutcome>>;

/// Settling side of a [`NavigationFuture`]. Only the first settle counts.
pub(crate) struct Settler {
    tx: Option<oneshot::Sender<NavigationOutcome>>,
}

impl Settler {
    pub(crate) fn settle(&mut self, outcome: NavigationOutcome) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The receiver lives inside the shared future, which may have been dropped
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.is_none()
    }
}

pub(crate) fn promise() -> (Settler, NavigationFuture) {
    let (tx, rx) = oneshot::channel();
    let fut = async move {
        rx.await.unwrap_or_else(|_| {
            Err(NavigationError::Abort(
                "navigation was dropped before it settled".to_string(),
            ))
        })
    }
    .boxed()
    .shared();
    (Settler { tx: Some(tx) }, fut)
}

fn ready(outcome: NavigationOutcome) -> NavigationFuture {
    future::ready(outcome).boxed().shared()
}

/// Returned by every navigation-initiating operation.
#[derive(Clone)]
pub struct NavigationResult {
    /// Settles once the destination is the current entry
    pub committed: NavigationFuture,
    /// Settles once every deferred action has completed
    pub finished: NavigationFuture,
}

impl NavigationResult {
    pub fn new(committed: NavigationFuture, finished: NavigationFuture) -> Self {
        Self {
            committed,
            finished,
        }
    }

    /// Both futures already rejected with `error`
    pub fn rejected(error: NavigationError) -> Self {
        Self::new(ready(Err(error.clone())), ready(Err(error)))
    }

    /// Both futures already resolved with `entry`
    pub fn resolved(entry: HistoryEntry) -> Self {
        Self::new(ready(Ok(entry.clone())), ready(Ok(entry)))
    }
}

impl std::fmt::Debug for NavigationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationResult")
            .field("committed", &self.committed.peek().map(|r| r.is_ok()))
            .field("finished", &self.finished.peek().map(|r| r.is_ok()))
            .finish()
    }
}
