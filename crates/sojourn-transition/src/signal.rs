//! Abort signalling for in-flight transitions
//!
//! Cooperative only: deferred actions may watch the signal and stop early,
//! but nothing is forcibly cancelled.

use tokio::sync::watch;

use crate::error::NavigationError;

#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<Option<NavigationError>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Abort with `reason`. Returns false if the signal was already aborted.
    pub fn abort(&self, reason: NavigationError) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_aborted(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side handed to navigate listeners and deferred actions.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<Option<NavigationError>>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<NavigationError> {
        self.rx.borrow().clone()
    }

    /// Resolves once the transition is aborted. Never resolves if the
    /// transition completes without being aborted.
    pub async fn aborted(&self) -> NavigationError {
        let mut rx = self.rx.clone();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        match reason {
            Some(reason) => reason,
            None => futures_util::future::pending().await,
        }
    }
}
