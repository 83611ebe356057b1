use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::summary::Snapshot;
use crate::core::tracker::RequestTracker;
use crate::SinkRef;

/// Periodic consumer of tracker state.
///
/// Each tick drops finished handles from the tracker and, when a sink is
/// attached, pushes a fresh snapshot to it. Stopping it publishes one last
/// snapshot. Without a sink it still runs, as the tracker's only cleanup.
pub struct Reporter {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl Reporter {
    pub fn spawn(tracker: Arc<RequestTracker>, sink: Option<SinkRef>, every: Duration) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let every = every.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick(&tracker, sink.as_ref()),
                }
            }

            tick(&tracker, sink.as_ref());
        });

        Self { stop, handle }
    }

    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            warn!("Reporter task ended abnormally: {}", e);
        }
    }
}

fn tick(tracker: &RequestTracker, sink: Option<&SinkRef>) {
    match sink {
        Some(sink) => {
            publish(tracker, sink);
        }
        None => {
            tracker.cleanup();
        }
    }
}

/// Cleans up the tracker, then hands the resulting snapshot to the sink.
pub fn publish(tracker: &RequestTracker, sink: &SinkRef) -> Snapshot {
    tracker.cleanup();
    let snapshot = tracker.snapshot();
    sink.on_snapshot(&snapshot);
    snapshot
}
