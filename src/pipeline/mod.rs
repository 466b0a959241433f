//! The detect -> remediate -> verify -> classify decision pipeline.
//!
//! Categories are evaluated in fixed priority order and the first one that
//! trips decides the run:
//!
//! 1. backend health (only when a backend URL is configured)
//! 2. sustained CPU spike (never remediated automatically)
//! 3. disk pressure
//! 4. no incident
//!
//! A run is `Resolved` only when a re-measurement taken after remediation
//! shows the condition cleared. A successful remediation attempt on its own
//! is never enough.

pub mod guidance;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::detect::{Incident, IncidentType, Severity};
use crate::evidence::Evidence;
use crate::kb::{Classification, Classifier};
use crate::probes::HttpProber;
use crate::remediation::backend::SelfHealer;
use crate::remediation::{clear_temporary_storage, BackendLauncher, RemediationAttempt};
use crate::system::{cpu_above_threshold, HostMetrics, ProcessSample};

/// Number of processes recorded as CPU spike evidence.
const TOP_PROCESS_COUNT: usize = 5;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Resolved,
    Blocked,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Resolved => write!(f, "RESOLVED"),
            RunStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// What `decide_and_act` concluded, before classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub incident: Incident,
    pub attempts: Vec<RemediationAttempt>,
    pub evidence: Evidence,
    pub status: RunStatus,
    pub next_steps: Vec<String>,
}

/// Everything one pipeline run produced. Handed to reporting as-is.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub incident: Incident,
    pub attempts: Vec<RemediationAttempt>,
    pub evidence: Evidence,
    pub status: RunStatus,
    pub next_steps: Vec<String>,
    pub classification: Classification,
}

/// Outcome of a category that tripped.
struct Verdict {
    incident: Incident,
    attempts: Vec<RemediationAttempt>,
    status: RunStatus,
    next_steps: Vec<String>,
}

pub struct Pipeline {
    config: Arc<AgentConfig>,
    host: Arc<dyn HostMetrics>,
    http: HttpProber,
    /// Overrides the configured launch command.
    launcher: Option<BackendLauncher>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: Arc<AgentConfig>, host: Arc<dyn HostMetrics>) -> Self {
        Self {
            config,
            host,
            http: HttpProber::default(),
            launcher: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the command used to launch an unreachable backend.
    pub fn with_launcher(mut self, launcher: BackendLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Use `cancel` to abort CPU sampling and self-heal waits on shutdown.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the pipeline and attach a classification.
    pub async fn run(&self, classifier: &Classifier) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, host = %self.config.host.label, "pipeline run started");

        let decision = self.decide_and_act().await;
        let classification = classifier.classify(decision.incident.kind().label());

        info!(
            %run_id,
            incident = %decision.incident.kind(),
            severity = %decision.incident.severity(),
            status = %decision.status,
            attempts = decision.attempts.len(),
            classification = %classification.code,
            "pipeline run finished"
        );

        RunResult {
            run_id,
            host: self.config.host.label.clone(),
            started_at,
            finished_at: Utc::now(),
            incident: decision.incident,
            attempts: decision.attempts,
            evidence: decision.evidence,
            status: decision.status,
            next_steps: decision.next_steps,
            classification,
        }
    }

    /// Evaluate the categories in priority order; the first that trips is
    /// final for this run.
    pub async fn decide_and_act(&self) -> Decision {
        let mut evidence = Evidence::new();

        let verdict = match self.config.backend.url.as_deref() {
            Some(url) => self.check_backend(url, &mut evidence).await,
            None => None,
        };
        let verdict = match verdict {
            Some(v) => Some(v),
            None => self.check_cpu(&mut evidence).await,
        };
        let verdict = match verdict {
            Some(v) => Some(v),
            None => self.check_disk(&mut evidence).await,
        };

        let verdict = verdict.unwrap_or_else(|| Verdict {
            incident: Incident::none(),
            attempts: Vec::new(),
            status: RunStatus::Resolved,
            next_steps: guidance::no_incident(),
        });

        Decision {
            incident: verdict.incident,
            attempts: verdict.attempts,
            evidence,
            status: verdict.status,
            next_steps: verdict.next_steps,
        }
    }

    fn probe_timeout(&self) -> Duration {
        self.config.backend.probe_timeout()
    }

    async fn check_backend(&self, url: &str, evidence: &mut Evidence) -> Option<Verdict> {
        let backend = &self.config.backend;
        let before = self.http.probe_health(url, self.probe_timeout()).await;
        evidence.record("backend_health_before", &before);
        if before.healthy {
            return None;
        }

        warn!(%url, status = ?before.status_code, "backend unhealthy");
        let incident = Incident::new(
            IncidentType::BackendUnhealthy,
            Severity::High,
            format!(
                "GET {} failed or returned non-200. Details: {}",
                before.url,
                before.error_detail.as_deref().unwrap_or("none")
            ),
        );

        let allowed = self.config.policy.allow_backend_self_heal;
        let mut attempts = Vec::new();
        if allowed {
            let mut healer = SelfHealer::from_config(self.http.clone(), backend);
            if let Some(launcher) = &self.launcher {
                healer.launcher = Some(launcher.clone());
            }
            let report = healer.attempt(url, &self.cancel).await;
            attempts.push(RemediationAttempt::backend_self_heal(url, report));
        } else {
            info!("backend self-heal not permitted by policy");
        }

        let after = self.http.probe_health(url, self.probe_timeout()).await;
        evidence.record("backend_health_after", &after);

        let (status, next_steps) = if after.healthy {
            (RunStatus::Resolved, guidance::backend_resolved(backend.port))
        } else {
            (
                RunStatus::Blocked,
                guidance::backend_blocked(&backend.host, backend.port, allowed),
            )
        };
        Some(Verdict {
            incident,
            attempts,
            status,
            next_steps,
        })
    }

    async fn check_cpu(&self, evidence: &mut Evidence) -> Option<Verdict> {
        let thresholds = &self.config.thresholds;
        let spiking = cpu_above_threshold(
            self.host.as_ref(),
            Duration::from_secs(thresholds.cpu_duration_secs),
            thresholds.cpu_pct,
            &self.cancel,
        )
        .await;
        if !spiking {
            return None;
        }

        let top = self.host.top_processes(TOP_PROCESS_COUNT).await;
        warn!(threshold = thresholds.cpu_pct, processes = top.len(), "sustained CPU spike");
        evidence.record("top_processes", &top);

        // Terminating processes is never automated, so a spike always blocks.
        Some(Verdict {
            incident: Incident::new(
                IncidentType::CpuSpike,
                Severity::High,
                format!(
                    "CPU >= {}% for {}s. Top processes: {}",
                    thresholds.cpu_pct,
                    thresholds.cpu_duration_secs,
                    describe_processes(&top)
                ),
            ),
            attempts: Vec::new(),
            status: RunStatus::Blocked,
            next_steps: guidance::cpu_blocked(),
        })
    }

    async fn check_disk(&self, evidence: &mut Evidence) -> Option<Verdict> {
        let volume = &self.config.host.disk_volume;
        let threshold = self.config.thresholds.disk_pct;

        let before = self.host.disk_usage_pct(volume)?;
        if before < threshold {
            return None;
        }

        warn!(volume = %volume.display(), usage_pct = before, threshold, "disk usage high");
        evidence.record("disk_before", before);
        let incident = Incident::new(
            IncidentType::DiskHigh,
            Severity::Medium,
            format!(
                "{} usage is {:.1}%, threshold is {}%",
                volume.display(),
                before,
                threshold
            ),
        );

        let allowed = self.config.policy.allow_clear_temp;
        let mut attempts = Vec::new();
        if allowed {
            let report = clear_temporary_storage(&self.config.host.temp_dir).await;
            attempts.push(RemediationAttempt::clear_temp(report));
        } else {
            info!("temp cleanup not permitted by policy");
        }

        let after = self.host.disk_usage_pct(volume);
        evidence.record("disk_after", after);

        let cleared = after.is_some_and(|pct| pct < threshold);
        let (status, next_steps) = if cleared {
            (RunStatus::Resolved, guidance::disk_resolved())
        } else {
            (RunStatus::Blocked, guidance::disk_blocked(allowed))
        };
        Some(Verdict {
            incident,
            attempts,
            status,
            next_steps,
        })
    }
}

fn describe_processes(top: &[ProcessSample]) -> String {
    if top.is_empty() {
        return "unavailable".to_string();
    }
    top.iter()
        .map(|p| format!("{} (pid {}, {:.1}%)", p.name, p.pid, p.cpu_pct))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_description() {
        assert_eq!(describe_processes(&[]), "unavailable");
        let top = vec![ProcessSample {
            cpu_pct: 97.25,
            pid: 42,
            name: "burner".into(),
        }];
        assert_eq!(describe_processes(&top), "burner (pid 42, 97.2%)");
    }

    #[test]
    fn status_display() {
        assert_eq!(RunStatus::Resolved.to_string(), "RESOLVED");
        assert_eq!(RunStatus::Blocked.to_string(), "BLOCKED");
    }
}
