//! Test issuers that never touch the network.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::RequestIssuer;
use crate::core::Outcome;

/// Resolves immediately with a fixed outcome.
pub struct StaticIssuer {
    outcome: Outcome,
    calls: AtomicUsize,
}

impl StaticIssuer {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestIssuer for StaticIssuer {
    async fn issue(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
    }
}

/// Holds every request until a permit is released for it.
pub struct GatedIssuer {
    gate: Semaphore,
    outcome: Outcome,
}

impl GatedIssuer {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            gate: Semaphore::new(0),
            outcome,
        }
    }

    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }
}

#[async_trait]
impl RequestIssuer for GatedIssuer {
    async fn issue(&self) -> Outcome {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.outcome
    }
}

pub struct PanickingIssuer;

#[async_trait]
impl RequestIssuer for PanickingIssuer {
    async fn issue(&self) -> Outcome {
        panic!("transport blew up");
    }
}
