//! Process ranking by CPU usage.

use std::cmp::Ordering;
use std::time::Duration;

use super::ProcessSample;

/// Per-process CPU usage is measured across this window.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(250);

/// Keep the `n` busiest processes, highest CPU first. The sort is stable, so
/// equal readings keep the order they were encountered in.
pub fn rank_by_cpu(mut samples: Vec<ProcessSample>, n: usize) -> Vec<ProcessSample> {
    samples.sort_by(|a, b| b.cpu_pct.partial_cmp(&a.cpu_pct).unwrap_or(Ordering::Equal));
    samples.truncate(n);
    samples
}
