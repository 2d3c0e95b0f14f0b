//! Per-pass resolution pool
//!
//! One pool serves exactly one correlation pass. Slots are semaphore permits:
//! acquiring suspends until any in-flight resolution settles, and a slot is
//! released when its task finishes, whatever the outcome. Each resolution
//! races the oracle call against an optional timeout and an optional
//! cancellation token. Losing the race detaches the oracle call rather than
//! aborting it.

use super::controls::ResolutionBounds;
use super::oracle::ResolutionOracle;
use serde::Serialize;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// How one admitted resolution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// The oracle resolved the callee to an action
    Confirmed,
    /// The oracle answered no
    Rejected,
    /// The timeout fired first
    TimedOut,
    /// The pass was cancelled first
    Aborted,
    /// The oracle returned an error or panicked
    Failed,
}

impl ResolutionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ResolutionOutcome::Confirmed)
    }
}

/// A candidate handed to the pool
#[derive(Debug, Clone)]
pub struct ResolutionJob {
    /// Caller's key for the candidate, returned with the outcome
    pub key: usize,
    pub document: Arc<str>,
    pub offset: usize,
}

/// Right to run one resolution; dropping it frees the slot
pub struct PoolSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

pub struct ResolutionPool {
    /// `None` means unlimited concurrency
    permits: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    in_flight: JoinSet<(usize, ResolutionOutcome)>,
    settled: Vec<(usize, ResolutionOutcome)>,
}

impl ResolutionPool {
    /// Legacy pool: no concurrency cap, no timeout, no cancellation
    pub fn unbounded() -> Self {
        Self {
            permits: None,
            timeout: None,
            cancel: None,
            in_flight: JoinSet::new(),
            settled: Vec::new(),
        }
    }

    pub fn bounded(bounds: &ResolutionBounds, cancel: Option<CancellationToken>) -> Self {
        Self {
            permits: Some(Arc::new(Semaphore::new(bounds.concurrency()))),
            timeout: Some(bounds.resolve_timeout()),
            cancel,
            in_flight: JoinSet::new(),
            settled: Vec::new(),
        }
    }

    /// Resolutions admitted but not yet collected
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for a free slot. Returns `None` if the pass is cancelled first.
    pub async fn acquire(&mut self) -> Option<PoolSlot> {
        self.harvest();

        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return None;
        }
        let Some(permits) = self.permits.clone() else {
            return Some(PoolSlot { _permit: None });
        };

        let permit = match &self.cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                permit = permits.acquire_owned() => permit,
            },
            None => permits.acquire_owned().await,
        };
        // The semaphore is owned by this pool and never closed
        permit.ok().map(|permit| PoolSlot { _permit: Some(permit) })
    }

    /// Start a resolution in `slot`
    pub fn spawn(&mut self, slot: PoolSlot, job: ResolutionJob, oracle: Arc<dyn ResolutionOracle>) {
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        self.in_flight.spawn(async move {
            let outcome = race_resolution(oracle, job.document, job.offset, timeout, cancel).await;
            drop(slot);
            (job.key, outcome)
        });
    }

    /// Wait for every admitted resolution and return all outcomes
    pub async fn drain(mut self) -> Vec<(usize, ResolutionOutcome)> {
        while let Some(joined) = self.in_flight.join_next().await {
            self.record(joined);
        }
        self.settled
    }

    /// Keep what has already settled and leave the rest running unobserved
    pub fn abandon(mut self) -> Vec<(usize, ResolutionOutcome)> {
        self.harvest();
        let left = self.in_flight.len();
        if left > 0 {
            tracing::debug!("Leaving {} resolutions to finish in the background", left);
        }
        self.in_flight.detach_all();
        self.settled
    }

    fn harvest(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            self.record(joined);
        }
    }

    fn record(&mut self, joined: Result<(usize, ResolutionOutcome), JoinError>) {
        match joined {
            Ok(settled) => self.settled.push(settled),
            Err(e) => tracing::debug!("Resolution task ended abnormally: {}", e),
        }
    }
}

async fn race_resolution(
    oracle: Arc<dyn ResolutionOracle>,
    document: Arc<str>,
    offset: usize,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
) -> ResolutionOutcome {
    let call = tokio::spawn(async move { oracle.resolve(&document, offset).await });

    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => pending::<()>().await,
        }
    };
    let cancelled = async move {
        match cancel {
            Some(token) => token.cancelled().await,
            None => pending::<()>().await,
        }
    };

    tokio::select! {
        joined = call => match joined {
            Ok(Ok(true)) => ResolutionOutcome::Confirmed,
            Ok(Ok(false)) => ResolutionOutcome::Rejected,
            Ok(Err(e)) => {
                tracing::debug!("Oracle failed at offset {}: {}", offset, e);
                ResolutionOutcome::Failed
            }
            Err(e) => {
                tracing::debug!("Oracle task failed at offset {}: {}", offset, e);
                ResolutionOutcome::Failed
            }
        },
        _ = deadline => ResolutionOutcome::TimedOut,
        _ = cancelled => ResolutionOutcome::Aborted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::oracle::{oracle_error, oracle_fn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job(key: usize) -> ResolutionJob {
        ResolutionJob {
            key,
            document: Arc::from("doc.tsx"),
            offset: key,
        }
    }

    fn sorted(mut outcomes: Vec<(usize, ResolutionOutcome)>) -> Vec<(usize, ResolutionOutcome)> {
        outcomes.sort_by_key(|(key, _)| *key);
        outcomes
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let oracle: Arc<dyn ResolutionOracle> = {
            let (active, peak) = (active.clone(), peak.clone());
            Arc::new(oracle_fn(move |_doc, _offset| {
                let (active, peak) = (active.clone(), peak.clone());
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(true)
                }
            }))
        };

        let bounds = ResolutionBounds { max_concurrent: 2, ..ResolutionBounds::default() };
        let mut pool = ResolutionPool::bounded(&bounds, None);
        for key in 0..7 {
            let slot = pool.acquire().await.expect("not cancelled");
            pool.spawn(slot, job(key), oracle.clone());
        }
        let outcomes = pool.drain().await;

        assert_eq!(outcomes.len(), 7);
        assert!(outcomes.iter().all(|(_, o)| *o == ResolutionOutcome::Confirmed));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_negative() {
        let oracle: Arc<dyn ResolutionOracle> = Arc::new(oracle_fn(|_doc, offset| async move {
            if offset == 0 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(true)
        }));
        let bounds = ResolutionBounds { resolve_timeout_ms: 20, ..ResolutionBounds::default() };
        let mut pool = ResolutionPool::bounded(&bounds, None);
        for key in 0..2 {
            let slot = pool.acquire().await.unwrap();
            pool.spawn(slot, job(key), oracle.clone());
        }

        assert_eq!(
            sorted(pool.drain().await),
            vec![(0, ResolutionOutcome::TimedOut), (1, ResolutionOutcome::Confirmed)]
        );
    }

    #[tokio::test]
    async fn test_oracle_errors_are_isolated() {
        let oracle: Arc<dyn ResolutionOracle> = Arc::new(oracle_fn(|_doc, offset| async move {
            if offset == 1 {
                Err(oracle_error("language server crashed"))
            } else {
                Ok(true)
            }
        }));
        let mut pool = ResolutionPool::unbounded();
        for key in 0..3 {
            let slot = pool.acquire().await.unwrap();
            pool.spawn(slot, job(key), oracle.clone());
        }

        assert_eq!(
            sorted(pool.drain().await),
            vec![
                (0, ResolutionOutcome::Confirmed),
                (1, ResolutionOutcome::Failed),
                (2, ResolutionOutcome::Confirmed),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancellation_aborts_waiting_and_running() {
        let token = CancellationToken::new();
        let oracle: Arc<dyn ResolutionOracle> = Arc::new(oracle_fn(|_doc, _offset| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }));
        let bounds = ResolutionBounds { max_concurrent: 1, ..ResolutionBounds::default() };
        let mut pool = ResolutionPool::bounded(&bounds, Some(token.clone()));

        let slot = pool.acquire().await.unwrap();
        pool.spawn(slot, job(0), oracle.clone());

        // The only slot is taken; cancelling releases the waiter with nothing
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        assert!(pool.acquire().await.is_none());

        assert_eq!(pool.drain().await, vec![(0, ResolutionOutcome::Aborted)]);
    }
}
