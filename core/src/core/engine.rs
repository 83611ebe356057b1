use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::reporter::Reporter;
use crate::core::summary::RunSummary;
use crate::core::throttle::RateController;
use crate::core::tracker::RequestTracker;
use crate::error::Result;
use crate::http::IssuerRef;
use crate::{GeneratorConfig, SinkRef};

/// How often finished requests are cleaned up when no interval is configured.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(500);

/// How the pause between control cycles is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Computed once from the starting rate and kept for the whole run.
    #[default]
    Fixed,
    /// Recomputed from the current rate after every cycle.
    Recompute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Dispatched(u32),
    Stopping,
}

/// Adaptive load generator control loop.
///
/// Each cycle:
/// 1. Recovers the rate if the tracker is under the ceiling
/// 2. Throttles the rate if the next batch would overshoot the ceiling
/// 3. Checks the stop signal
/// 4. Dispatches one batch of fire-and-forget requests
/// 5. Sleeps for the pacing interval
pub struct LoadGenerator {
    controller: RateController,
    tracker: Arc<RequestTracker>,
    issuer: IssuerRef,
    wait_mode: WaitMode,
    fixed_wait: Duration,
    state: GeneratorState,
    cycles: u64,
    target: String,
    sink: Option<SinkRef>,
    cleanup_interval: Duration,
    reporter: Option<Reporter>,
}

impl LoadGenerator {
    /// Creates a generator in the `Running` state.
    ///
    /// The fixed pacing interval is taken here, before the first cycle.
    pub fn new(controller: RateController, issuer: IssuerRef, wait_mode: WaitMode) -> Self {
        let fixed_wait = controller.wait_interval();
        Self {
            controller,
            tracker: Arc::new(RequestTracker::new()),
            issuer,
            wait_mode,
            fixed_wait,
            state: GeneratorState::Running,
            cycles: 0,
            target: String::new(),
            sink: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            reporter: None,
        }
    }

    pub fn from_config(config: &GeneratorConfig, issuer: IssuerRef) -> Result<Self> {
        config.validate()?;
        let controller = RateController::with_tuning(
            config.batches_per_second,
            config.desired_rate,
            config.max_outstanding,
            config.recovery_fraction,
            config.throttle_factor,
        )?;
        Ok(Self::new(controller, issuer, config.wait_mode)
            .with_target(&config.target)
            .with_cleanup_interval(config.report_interval()))
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    /// Attaches a sink that receives a snapshot every `interval` while running.
    pub fn with_reporter(mut self, sink: SinkRef, interval: Duration) -> Self {
        self.sink = Some(sink);
        self.cleanup_interval = interval;
        self
    }

    /// Sets how often finished requests are dropped from the tracker.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Runs one control cycle without sleeping.
    pub fn cycle(&mut self, stop_requested: bool) -> CycleOutcome {
        if self.state != GeneratorState::Running {
            return CycleOutcome::Stopping;
        }

        self.controller.recover_if_stable(self.tracker.active_count());
        self.controller.throttle_if_overloaded(self.tracker.active_count());

        if stop_requested {
            info!("Stop requested after {} cycle(s)", self.cycles);
            self.state = GeneratorState::Stopping;
            return CycleOutcome::Stopping;
        }

        let batch = self.controller.batch_size();
        for _ in 0..batch {
            self.tracker.enqueue(Arc::clone(&self.issuer));
        }
        self.cycles += 1;

        debug!(
            "Cycle {}: dispatched {} at {} req/s ({} held)",
            self.cycles,
            batch,
            self.controller.current_rate(),
            self.tracker.active_count()
        );
        CycleOutcome::Dispatched(batch)
    }

    /// Pause to take after the current cycle.
    pub fn pacing(&self) -> Duration {
        match self.wait_mode {
            WaitMode::Fixed => self.fixed_wait,
            WaitMode::Recompute => self.controller.wait_interval(),
        }
    }

    /// Drives cycles until `shutdown` fires, then stops and summarizes.
    pub async fn run(mut self, shutdown: CancellationToken) -> RunSummary {
        let started = Instant::now();

        self.reporter = Some(Reporter::spawn(
            Arc::clone(&self.tracker),
            self.sink.clone(),
            self.cleanup_interval,
        ));

        info!(
            "Generating {} req/s in {} batch(es)/s, ceiling {} outstanding, {:?} pacing of {:?}",
            self.controller.desired_rate(),
            self.controller.batches_per_second(),
            self.controller.max_outstanding(),
            self.wait_mode,
            self.pacing()
        );
        debug!(
            "Recovery step {} req/s, throttle factor {}",
            self.controller.recovery_step(),
            self.controller.throttle_factor()
        );

        while let CycleOutcome::Dispatched(_) = self.cycle(shutdown.is_cancelled()) {
            let wait = self.pacing();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        self.finish().await;

        self.tracker.cleanup();
        RunSummary {
            target: self.target.clone(),
            cycles: self.cycles,
            desired_rate: self.controller.desired_rate(),
            final_rate: self.controller.current_rate(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
            snapshot: self.tracker.snapshot(),
        }
    }

    /// Cancels outstanding requests and releases the reporter.
    pub async fn finish(&mut self) {
        if self.state == GeneratorState::Stopped {
            return;
        }
        self.state = GeneratorState::Stopping;

        if let Some(sink) = &self.sink {
            sink.on_log(
                "phase",
                &format!(
                    "[*] Stopping: cancelling {} outstanding request(s)",
                    self.tracker.active_count()
                ),
            );
        }
        self.tracker.cancel_all();
        self.tracker.settle().await;
        if let Some(reporter) = self.reporter.take() {
            reporter.stop().await;
        }

        self.state = GeneratorState::Stopped;
        info!("Load generator stopped");
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn controller(&self) -> &RateController {
        &self.controller
    }

    pub fn tracker(&self) -> Arc<RequestTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
