//! Pass tracking
//!
//! A new pass over a document supersedes the previous one. `PassTracker`
//! hands out one cancellation token per document and cancels the old token
//! whenever a newer pass begins, so a stale pass stops admitting work.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Handle for one running pass
#[derive(Debug, Clone)]
pub struct PassTicket {
    document: String,
    generation: u64,
    token: CancellationToken,
}

impl PassTicket {
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Token to hand to `RuntimeControls::with_cancellation`
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_superseded(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
pub struct PassTracker {
    current: Mutex<HashMap<String, (u64, CancellationToken)>>,
    generation: Mutex<u64>,
}

impl PassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass over `document`, cancelling any pass still running on it
    pub fn begin(&self, document: &str) -> PassTicket {
        let generation = {
            let mut counter = relock(&self.generation);
            *counter += 1;
            *counter
        };
        let token = CancellationToken::new();

        let previous = relock(&self.current).insert(document.to_string(), (generation, token.clone()));
        if let Some((_, stale)) = previous {
            tracing::debug!("Superseding previous pass over {}", document);
            stale.cancel();
        }

        PassTicket {
            document: document.to_string(),
            generation,
            token,
        }
    }

    /// Forget a finished pass unless a newer one has already replaced it
    pub fn finish(&self, ticket: &PassTicket) {
        let mut current = relock(&self.current);
        if current
            .get(&ticket.document)
            .is_some_and(|(generation, _)| *generation == ticket.generation)
        {
            current.remove(&ticket.document);
        }
    }

    /// Cancel every running pass
    pub fn cancel_all(&self) {
        for (_, (_, token)) in relock(&self.current).drain() {
            token.cancel();
        }
    }

    /// Documents with a pass in progress
    pub fn active(&self) -> usize {
        relock(&self.current).len()
    }
}

/// A panicked holder leaves the map consistent, so keep using it
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pass_cancels_previous() {
        let tracker = PassTracker::new();
        let first = tracker.begin("page.tsx");
        let second = tracker.begin("page.tsx");

        assert!(first.is_superseded());
        assert!(!second.is_superseded());
        assert_eq!(tracker.active(), 1);
    }

    #[test]
    fn test_documents_are_independent() {
        let tracker = PassTracker::new();
        let page = tracker.begin("page.tsx");
        let _form = tracker.begin("form.tsx");
        assert!(!page.is_superseded());
        assert_eq!(tracker.active(), 2);
    }

    #[test]
    fn test_stale_finish_keeps_current_pass() {
        let tracker = PassTracker::new();
        let first = tracker.begin("page.tsx");
        let second = tracker.begin("page.tsx");

        tracker.finish(&first);
        assert_eq!(tracker.active(), 1);

        tracker.finish(&second);
        assert_eq!(tracker.active(), 0);
        assert!(!second.is_superseded());
    }

    #[test]
    fn test_cancel_all() {
        let tracker = PassTracker::new();
        let a = tracker.begin("a.tsx");
        let b = tracker.begin("b.tsx");
        tracker.cancel_all();
        assert!(a.is_superseded() && b.is_superseded());
        assert_eq!(tracker.active(), 0);
    }
}
