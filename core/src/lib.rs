pub mod core;
pub mod error;
pub mod http;
pub mod utils;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

pub use crate::core::engine::{CycleOutcome, GeneratorState, LoadGenerator, WaitMode};
pub use crate::core::reporter::Reporter;
pub use crate::core::summary::{RunSummary, Snapshot};
pub use crate::core::throttle::RateController;
pub use crate::core::tracker::{OutcomeCounters, RequestTracker};
pub use crate::core::Outcome;
pub use crate::error::GeneratorError;
pub use crate::http::{classify, HttpIssuer, IssuerRef, RequestIssuer};

/// Run configuration shared by the CLI and JSON config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorConfig {
    pub target: String,
    pub batches_per_second: u32,
    pub desired_rate: u32,
    pub max_outstanding: usize,
    pub recovery_fraction: f64,
    pub throttle_factor: f64,
    pub wait_mode: WaitMode,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub proxy: String,
    pub headers: String,
    pub report_interval_ms: u64,
    pub output: Option<String>,
    /// Stop after this many seconds; run until interrupted when unset.
    pub duration: Option<u64>,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            batches_per_second: 20,
            desired_rate: 50,
            max_outstanding: 1000,
            recovery_fraction: crate::core::throttle::DEFAULT_RECOVERY_FRACTION,
            throttle_factor: crate::core::throttle::DEFAULT_THROTTLE_FACTOR,
            wait_mode: WaitMode::Fixed,
            timeout: 10,
            proxy: String::new(),
            headers: String::new(),
            report_interval_ms: 500,
            output: None,
            duration: None,
            verbose: false,
            dry_run: false,
        }
    }
}

impl GeneratorConfig {
    pub fn from_file(path: &Path) -> Result<Self, GeneratorError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Checks everything a run needs before any state is built.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        RateController::with_tuning(
            self.batches_per_second,
            self.desired_rate,
            self.max_outstanding,
            self.recovery_fraction,
            self.throttle_factor,
        )?;
        http::parse_target(&self.target)?;
        if self.timeout == 0 {
            return Err(GeneratorError::InvalidConfiguration(
                "timeout must be at least one second".to_string(),
            ));
        }
        if self.report_interval_ms == 0 {
            return Err(GeneratorError::InvalidConfiguration(
                "report interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn header_list(&self) -> Vec<String> {
        if self.headers.is_empty() {
            Vec::new()
        } else {
            self.headers
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }
    }

    pub fn parsed_headers(&self) -> Vec<(String, String)> {
        parse_custom_headers(&self.header_list())
    }

    pub fn proxy_ref(&self) -> Option<&str> {
        if self.proxy.is_empty() { None } else { Some(&self.proxy) }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

pub fn parse_custom_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter().filter_map(|h| {
        let mut parts = h.splitn(2, ':');
        let key = parts.next()?.trim().to_string();
        let val = parts.next().unwrap_or("").trim().to_string();
        if key.is_empty() { return None; }
        Some((key, val))
    }).collect()
}

/// Output abstraction for the generator.
/// The CLI renders to the terminal; tests record what they receive.
pub trait GeneratorEventSink: Send + Sync {
    fn on_log(&self, level: &str, message: &str);
    fn on_snapshot(&self, snapshot: &Snapshot);
}

pub type SinkRef = Arc<dyn GeneratorEventSink>;

/// Terminal sink that redraws the counter block in place.
pub struct ConsoleSink {
    board: ProgressBar,
}

impl ConsoleSink {
    pub fn new_ref() -> Arc<Self> {
        let board = ProgressBar::new_spinner();
        board.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        board.enable_steady_tick(Duration::from_millis(120));
        Arc::new(Self { board })
    }

    /// Leaves the last counter block on screen.
    pub fn finish(&self) {
        self.board.finish();
    }
}

impl GeneratorEventSink for ConsoleSink {
    fn on_log(&self, level: &str, message: &str) {
        use colored::*;
        let colored = match level {
            "success" => message.green().to_string(),
            "error"   => message.red().to_string(),
            "warn"    => message.yellow().to_string(),
            "phase"   => message.bright_cyan().bold().to_string(),
            _         => message.to_string(),
        };
        self.board.println(colored);
    }

    fn on_snapshot(&self, snapshot: &Snapshot) {
        let block = snapshot
            .render_lines()
            .into_iter()
            .map(|line| style_line(line, snapshot))
            .collect::<Vec<_>>()
            .join("\n  ");
        self.board.set_message(block);
    }
}

fn style_line(line: String, snapshot: &Snapshot) -> String {
    use colored::*;
    let label = line.trim_start();
    if label.starts_with("Created") {
        line.bold().to_string()
    } else if label.starts_with("Status Code") {
        line.green().to_string()
    } else if label.starts_with("Faulted") && snapshot.faulted > 0 {
        line.red().to_string()
    } else if label.starts_with("Cancelled") && snapshot.cancelled > 0 {
        line.yellow().to_string()
    } else {
        line
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::Mutex;
    use std::sync::Arc;

    use super::{GeneratorEventSink, Snapshot};

    /// Sink that keeps everything it is given.
    #[derive(Default)]
    pub struct RecordingSink {
        logs: Mutex<Vec<(String, String)>>,
        snapshots: Mutex<Vec<Snapshot>>,
    }

    impl RecordingSink {
        pub fn new_ref() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn snapshots(&self) -> Vec<Snapshot> {
            self.snapshots.lock().clone()
        }

        pub fn logs(&self) -> Vec<(String, String)> {
            self.logs.lock().clone()
        }
    }

    impl GeneratorEventSink for RecordingSink {
        fn on_log(&self, level: &str, message: &str) {
            self.logs.lock().push((level.to_string(), message.to_string()));
        }

        fn on_snapshot(&self, snapshot: &Snapshot) {
            self.snapshots.lock().push(snapshot.clone());
        }
    }
}
