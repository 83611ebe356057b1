//! Read models handed to reporters: live snapshots and the end-of-run summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const LABEL_WIDTH: usize = 34;
const COUNT_WIDTH: usize = 4;

/// Counter values at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub active: usize,
    pub completions: BTreeMap<u16, u64>,
    pub cancelled: u64,
    pub faulted: u64,
}

impl Snapshot {
    pub fn total_completed(&self) -> u64 {
        self.completions.values().sum()
    }

    /// Every request dispatched so far, whatever its state.
    pub fn total_created(&self) -> u64 {
        self.active as u64 + self.faulted + self.cancelled + self.total_completed()
    }

    /// Plain-text counter block, one entry per line.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = vec![
            counter_line("Created", self.total_created()),
            counter_line("  Completed", self.total_completed()),
            counter_line("  Faulted", self.faulted),
            counter_line("  Cancelled", self.cancelled),
        ];
        for (status, count) in &self.completions {
            lines.push(counter_line(
                &format!("    Status Code {}", status_label(*status)),
                *count,
            ));
        }
        lines.push(counter_line("  Active Requests", self.active as u64));
        lines
    }
}

/// `200 OK`, `503 Service Unavailable`, or the bare code when unknown.
pub fn status_label(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(|reason| format!("{} {}", status, reason))
        .unwrap_or_else(|| status.to_string())
}

fn counter_line(label: &str, count: u64) -> String {
    format!(
        "{:<label_width$}: {:>count_width$}",
        label,
        count,
        label_width = LABEL_WIDTH,
        count_width = COUNT_WIDTH
    )
}

/// Final state of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub target: String,
    pub cycles: u64,
    pub desired_rate: u32,
    pub final_rate: u32,
    pub elapsed_seconds: f64,
    pub snapshot: Snapshot,
}

impl RunSummary {
    /// Atomic write: serialize to .tmp, then rename over the real file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(ok: u64, bad_request: u64) -> Snapshot {
        let mut completions = BTreeMap::new();
        completions.insert(200, ok);
        completions.insert(400, bad_request);
        Snapshot {
            active: 7,
            completions,
            cancelled: 2,
            faulted: 3,
        }
    }

    #[test]
    fn test_totals() {
        let snapshot = sample_snapshot(123, 3435);
        assert_eq!(snapshot.total_completed(), 3558);
        assert_eq!(snapshot.total_created(), 3558 + 7 + 2 + 3);
    }

    #[test]
    fn test_render_has_line_per_status() {
        let lines = sample_snapshot(2100, 300).render_lines();

        let ok = lines.iter().find(|l| l.contains("Status Code 200 OK"));
        let bad = lines.iter().find(|l| l.contains("Status Code 400 Bad Request"));
        assert!(ok.is_some_and(|l| l.ends_with("2100")));
        assert!(bad.is_some_and(|l| l.ends_with(" 300")));
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("Created"));
        assert!(lines[6].contains("Active Requests"));
    }

    #[test]
    fn test_render_order() {
        let lines = sample_snapshot(5, 6).render_lines();
        let labels: Vec<&str> = lines
            .iter()
            .map(|l| l.split(':').next().unwrap_or("").trim())
            .collect();
        assert_eq!(
            labels,
            vec![
                "Created",
                "Completed",
                "Faulted",
                "Cancelled",
                "Status Code 200 OK",
                "Status Code 400 Bad Request",
                "Active Requests",
            ]
        );
    }

    #[test]
    fn test_counts_are_right_aligned() {
        assert!(counter_line("x", 1).ends_with(":    1"));
        assert!(counter_line("x", 22).ends_with(":   22"));
        assert!(counter_line("x", 4444).ends_with(": 4444"));
        assert!(counter_line("x", 55555).ends_with(": 55555"));
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(200), "200 OK");
        assert_eq!(status_label(503), "503 Service Unavailable");
        assert_eq!(status_label(599), "599");
    }

    #[test]
    fn test_empty_snapshot_renders_zeroes() {
        let lines = Snapshot::default().render_lines();
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().all(|l| l.ends_with("   0")));
    }

    #[test]
    fn test_summary_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = RunSummary {
            target: "http://localhost/".to_string(),
            cycles: 12,
            desired_rate: 50,
            final_rate: 47,
            elapsed_seconds: 0.6,
            snapshot: sample_snapshot(10, 1),
        };

        summary.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = RunSummary::load(&path).unwrap();
        assert_eq!(loaded.cycles, 12);
        assert_eq!(loaded.final_rate, 47);
        assert_eq!(loaded.snapshot, summary.snapshot);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"desiredRate\": 50"));
    }
}
