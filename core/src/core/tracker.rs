//! In-flight request bookkeeping.
//!
//! Every enqueued request runs as its own tokio task and records its outcome
//! into shared counters when it resolves. The control loop only keeps the
//! join handles; it never waits on them.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::summary::Snapshot;
use crate::core::Outcome;
use crate::http::IssuerRef;

/// Outcome counters shared with every request task.
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    completions: DashMap<u16, u64>,
    cancelled: AtomicU64,
    faulted: AtomicU64,
}

impl OutcomeCounters {
    pub fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Completed(status) => {
                *self.completions.entry(status).or_insert(0) += 1;
            }
            Outcome::TimedOut => {
                self.cancelled.fetch_add(1, Relaxed);
            }
            Outcome::Failed => {
                self.faulted.fetch_add(1, Relaxed);
            }
        }
    }

    fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Relaxed);
    }

    /// Completions per status code, ordered by code.
    pub fn completions(&self) -> BTreeMap<u16, u64> {
        self.completions
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn completed(&self, status: u16) -> u64 {
        self.completions.get(&status).map(|count| *count).unwrap_or(0)
    }

    pub fn total_completed(&self) -> u64 {
        self.completions.iter().map(|entry| *entry.value()).sum()
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Relaxed)
    }

    pub fn faulted(&self) -> u64 {
        self.faulted.load(Relaxed)
    }
}

pub struct RequestTracker {
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<OutcomeCounters>,
    cancel: CancellationToken,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(Vec::new()),
            counters: Arc::new(OutcomeCounters::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Dispatches one request through `issuer` and returns immediately.
    ///
    /// Must be called from within a tokio runtime. The spawned task records
    /// exactly one outcome: the issuer's, or a cancellation if `cancel_all`
    /// wins the race. A panicking issuer is counted as faulted.
    pub fn enqueue(&self, issuer: IssuerRef) {
        let counters = Arc::clone(&self.counters);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let issued = AssertUnwindSafe(issuer.issue()).catch_unwind();

            tokio::select! {
                biased;
                result = issued => match result {
                    Ok(outcome) => counters.record(outcome),
                    Err(_) => {
                        warn!("Request issuer panicked; counting the request as faulted");
                        counters.record(Outcome::Failed);
                    }
                },
                _ = cancel.cancelled() => counters.record_cancelled(),
            }
        });

        self.in_flight.lock().push(handle);
    }

    /// Drops every handle whose task has finished. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut in_flight = self.in_flight.lock();
        let before = in_flight.len();
        in_flight.retain(|handle| !handle.is_finished());
        before - in_flight.len()
    }

    /// Number of held handles, including finished ones not yet cleaned up.
    pub fn active_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Signals every outstanding request, and any enqueued later, to stop.
    pub fn cancel_all(&self) {
        debug!("Cancelling {} outstanding request(s)", self.active_count());
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Takes every held handle and waits for its task to finish.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.in_flight.lock());
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("Request task ended abnormally: {}", e);
            }
        }
    }

    pub fn counters(&self) -> &OutcomeCounters {
        &self.counters
    }

    /// Point-in-time view of the counters for reporting.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            active: self.active_count(),
            completions: self.counters.completions(),
            cancelled: self.counters.cancelled(),
            faulted: self.counters.faulted(),
        }
    }
}
