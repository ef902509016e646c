// SPDX-License-Identifier: GPL-3.0-only

//! Health status file for external supervisors
//!
//! A small JSON document rewritten atomically on start, every few seconds
//! while running, and on stop:
//!
//! ```json
//! {"timestamp":"2026-01-01T12:00:00+01:00","pid":812,"status":"running","fps":23.9,"state":"camera","power":"active"}
//! ```

use crate::app::power::PowerState;
use crate::app::state::AppState;
use crate::config::write_atomic;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    timestamp: String,
    pid: u32,
    status: HealthStatus,
    fps: f32,
    state: AppState,
    power: PowerState,
}

/// Tick-rate meter over a sliding window of tick timestamps
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window: usize,
    ticks: std::collections::VecDeque<Instant>,
}

impl FpsMeter {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            ticks: std::collections::VecDeque::with_capacity(window.max(2)),
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if self.ticks.len() == self.window {
            self.ticks.pop_front();
        }
        self.ticks.push_back(now);
    }

    pub fn fps(&self) -> f32 {
        match (self.ticks.front(), self.ticks.back()) {
            (Some(first), Some(last)) if self.ticks.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f32();
                if span > 0.0 {
                    (self.ticks.len() - 1) as f32 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

pub struct HealthReporter {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
}

impl HealthReporter {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_write: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a periodic report is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_write
            .is_none_or(|last| now.duration_since(last) >= self.interval)
    }

    /// Write a report; failures are logged and otherwise ignored
    pub fn write(
        &mut self,
        now: Instant,
        status: HealthStatus,
        fps: f32,
        state: AppState,
        power: PowerState,
    ) {
        self.last_write = Some(now);
        let report = HealthReport {
            timestamp: chrono::Local::now().to_rfc3339(),
            pid: std::process::id(),
            status,
            fps: (fps * 100.0).round() / 100.0,
            state,
            power,
        };

        let bytes = match serde_json::to_vec(&report) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize health report");
                return;
            }
        };
        match write_atomic(&self.path, &bytes) {
            Ok(()) => debug!(path = %self.path.display(), ?status, "Health report written"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to write health report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/health.json");
        let mut health = HealthReporter::new(&path, Duration::from_secs(5));
        let now = Instant::now();

        assert!(health.is_due(now));
        health.write(now, HealthStatus::Running, 23.456, AppState::Camera, PowerState::Active);
        assert!(!health.is_due(now + Duration::from_secs(4)));
        assert!(health.is_due(now + Duration::from_secs(5)));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["state"], "camera");
        assert_eq!(json["power"], "active");
        assert_eq!(json["pid"], std::process::id());
        assert!((json["fps"].as_f64().unwrap() - 23.46).abs() < 1e-3);
        assert!(json["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_fps_meter() {
        let mut meter = FpsMeter::new(10);
        let t0 = Instant::now();
        assert_eq!(meter.fps(), 0.0);
        for i in 0..25u64 {
            meter.tick(t0 + Duration::from_millis(40 * i));
        }
        assert!((meter.fps() - 25.0).abs() < 0.01);
    }
}
