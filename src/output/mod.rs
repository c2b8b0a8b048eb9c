// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Progress reporting
//!
//! The executor calls a [`ProgressReporter`] once when a node starts and
//! once when it finishes. Calls arrive from concurrently running nodes, so
//! implementations must be thread-safe and should return quickly.

mod console;

pub use console::ConsoleProgress;

use std::time::Duration;

use tracing::{info, warn};

/// Receiver of per-node progress events
pub trait ProgressReporter: Send + Sync {
    /// Node `current` of `total` started converting to `target`
    fn stage_started(&self, current: usize, total: usize, target: &str);

    /// Node `current` of `total` finished
    fn stage_completed(
        &self,
        current: usize,
        total: usize,
        target: &str,
        duration: Duration,
        success: bool,
        error: Option<&str>,
    );
}

/// Reports progress as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn stage_started(&self, current: usize, total: usize, target: &str) {
        info!(current, total, target, "stage started");
    }

    fn stage_completed(
        &self,
        current: usize,
        total: usize,
        target: &str,
        duration: Duration,
        success: bool,
        error: Option<&str>,
    ) {
        let duration_ms = duration.as_millis() as u64;
        if success {
            info!(current, total, target, duration_ms, "stage completed");
        } else {
            warn!(
                current,
                total,
                target,
                duration_ms,
                error = error.unwrap_or("unknown error"),
                "stage failed"
            );
        }
    }
}

/// Format a duration the way progress lines show it: `1.2s`
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1200)), "1.2s");
        assert_eq!(format_duration(Duration::ZERO), "0.0s");
        assert_eq!(format_duration(Duration::from_secs(75)), "75.0s");
    }

    #[test]
    fn test_tracing_progress_is_object_safe() {
        let progress: Box<dyn ProgressReporter> = Box::new(TracingProgress);
        progress.stage_started(1, 2, "jpg");
        progress.stage_completed(1, 2, "jpg", Duration::from_millis(5), false, Some("boom"));
    }
}
