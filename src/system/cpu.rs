//! Sustained CPU spike detection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::HostMetrics;

/// Length of one CPU sample.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Poll CPU once per second for `window` and report whether every sample met
/// or exceeded `threshold_pct`.
///
/// Stops at the first sample below the threshold. A failed sample or a
/// cancelled token also yields `false`: an unconfirmed spike is not a spike.
/// At least one sample is always taken.
pub async fn cpu_above_threshold(
    host: &dyn HostMetrics,
    window: Duration,
    threshold_pct: f64,
    cancel: &CancellationToken,
) -> bool {
    let samples = window.as_secs().max(1);
    info!(threshold_pct, window_secs = samples, "checking for sustained CPU load");

    for i in 0..samples {
        let sample = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("CPU sampling cancelled");
                return false;
            }
            sample = host.sample_cpu(SAMPLE_PERIOD) => sample,
        };

        match sample {
            Some(pct) if pct >= threshold_pct => {
                debug!(sample = i + 1, cpu_pct = pct, "CPU sample at or above threshold");
            }
            Some(pct) => {
                debug!(sample = i + 1, cpu_pct = pct, "CPU sample below threshold");
                return false;
            }
            None => {
                debug!(sample = i + 1, "CPU sample unavailable");
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::ProcessSample;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        samples: Mutex<VecDeque<Option<f64>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(samples: &[Option<f64>]) -> Self {
            Self {
                samples: Mutex::new(samples.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl HostMetrics for Scripted {
        async fn sample_cpu(&self, _period: Duration) -> Option<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.samples.lock().unwrap().pop_front().flatten()
        }

        fn disk_usage_pct(&self, _volume: &Path) -> Option<f64> {
            None
        }

        async fn top_processes(&self, _n: usize) -> Vec<ProcessSample> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn every_sample_above_is_a_spike() {
        let host = Scripted::new(&[Some(95.0), Some(90.0), Some(99.0)]);
        let hit = cpu_above_threshold(&host, Duration::from_secs(3), 90.0, &CancellationToken::new()).await;
        assert!(hit);
        assert_eq!(host.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_low_sample_short_circuits() {
        let host = Scripted::new(&[Some(10.0), Some(99.0), Some(99.0)]);
        let hit = cpu_above_threshold(&host, Duration::from_secs(3), 90.0, &CancellationToken::new()).await;
        assert!(!hit);
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn low_sample_late_in_window() {
        let host = Scripted::new(&[Some(95.0), Some(95.0), Some(89.9)]);
        let hit = cpu_above_threshold(&host, Duration::from_secs(3), 90.0, &CancellationToken::new()).await;
        assert!(!hit);
        assert_eq!(host.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_sample_is_not_a_spike() {
        let host = Scripted::new(&[Some(95.0), None]);
        let hit = cpu_above_threshold(&host, Duration::from_secs(3), 90.0, &CancellationToken::new()).await;
        assert!(!hit);
    }

    #[tokio::test]
    async fn cancelled_token_reports_false() {
        let host = Scripted::new(&[Some(100.0); 3]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let hit = cpu_above_threshold(&host, Duration::from_secs(3), 50.0, &cancel).await;
        assert!(!hit);
    }

    #[tokio::test]
    async fn zero_window_still_samples_once() {
        let host = Scripted::new(&[Some(100.0)]);
        assert!(cpu_above_threshold(&host, Duration::ZERO, 50.0, &CancellationToken::new()).await);
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);
    }
}
