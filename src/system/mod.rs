//! Read-only host metric collectors: CPU, disk, and process samples.
//!
//! Every collector degrades instead of failing. A reading that cannot be taken
//! comes back as `None` (or an empty list) and the pipeline treats it as
//! "condition not confirmed".

pub mod cpu;
pub mod disk;
pub mod process;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

pub use cpu::cpu_above_threshold;

/// One process in a CPU ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSample {
    pub cpu_pct: f32,
    pub pid: u32,
    pub name: String,
}

/// Source of host readings used by the decision pipeline.
#[async_trait::async_trait]
pub trait HostMetrics: Send + Sync {
    /// Global CPU utilisation measured over `period`.
    async fn sample_cpu(&self, period: Duration) -> Option<f64>;

    /// Used space of the volume holding `volume`, in percent.
    fn disk_usage_pct(&self, volume: &Path) -> Option<f64>;

    /// Top `n` processes by CPU, highest first.
    async fn top_processes(&self, n: usize) -> Vec<ProcessSample>;
}

/// `HostMetrics` backed by the `sysinfo` crate.
pub struct SysinfoHost {
    sys: Mutex<System>,
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoHost {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> Option<T> {
        match self.sys.lock() {
            Ok(mut sys) => Some(f(&mut sys)),
            Err(_) => {
                tracing::warn!("sysinfo state poisoned, skipping sample");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl HostMetrics for SysinfoHost {
    async fn sample_cpu(&self, period: Duration) -> Option<f64> {
        // Usage is the delta between two refreshes, so the period must be at
        // least the platform minimum.
        let period = period.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.with_system(|sys| sys.refresh_cpu_usage())?;
        tokio::time::sleep(period).await;
        self.with_system(|sys| {
            sys.refresh_cpu_usage();
            f64::from(sys.global_cpu_usage())
        })
    }

    fn disk_usage_pct(&self, volume: &Path) -> Option<f64> {
        disk::usage_pct(volume)
    }

    async fn top_processes(&self, n: usize) -> Vec<ProcessSample> {
        if self
            .with_system(|sys| sys.refresh_processes(ProcessesToUpdate::All, true))
            .is_none()
        {
            return Vec::new();
        }
        tokio::time::sleep(process::CPU_SAMPLE_WINDOW).await;
        self.with_system(|sys| {
            sys.refresh_processes(ProcessesToUpdate::All, true);
            let samples = sys
                .processes()
                .iter()
                .map(|(pid, p)| ProcessSample {
                    cpu_pct: p.cpu_usage(),
                    pid: pid.as_u32(),
                    name: p.name().to_string_lossy().into_owned(),
                })
                .collect();
            process::rank_by_cpu(samples, n)
        })
        .unwrap_or_default()
    }
}
