//! Corrective actions the agent may run.
//!
//! Each action can be invoked on its own, is safe to repeat, and reports a
//! structured outcome instead of failing.

pub mod backend;
pub mod service;
pub mod temp;

use serde::Serialize;

pub use backend::{attempt_backend_self_heal, BackendLauncher, SelfHealReport};
pub use service::{restart_service, ServiceRestartReport};
pub use temp::{clear_temporary_storage, TempSweepReport};

/// How an attempt went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Success,
    PartialFailure,
    Failed,
}

/// Action-specific result fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDetail {
    ClearTemp(TempSweepReport),
    RestartService(ServiceRestartReport),
    BackendSelfHeal(SelfHealReport),
}

/// One executed remediation action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemediationAttempt {
    pub action_name: &'static str,
    pub target: String,
    pub outcome: Outcome,
    pub detail: ActionDetail,
}

impl RemediationAttempt {
    pub fn clear_temp(report: TempSweepReport) -> Self {
        Self {
            action_name: "clear_temp",
            target: report.path.display().to_string(),
            outcome: report.outcome(),
            detail: ActionDetail::ClearTemp(report),
        }
    }

    pub fn restart_service(report: ServiceRestartReport) -> Self {
        Self {
            action_name: "restart_service",
            target: report.service.clone(),
            outcome: report.outcome(),
            detail: ActionDetail::RestartService(report),
        }
    }

    pub fn backend_self_heal(target: impl Into<String>, report: SelfHealReport) -> Self {
        Self {
            action_name: "backend_self_heal",
            target: target.into(),
            outcome: report.outcome(),
            detail: ActionDetail::BackendSelfHeal(report),
        }
    }

    /// One-line description for reports.
    pub fn summary(&self) -> String {
        let detail = match &self.detail {
            ActionDetail::ClearTemp(r) => {
                format!("removed {}, failed {}", r.removed_count, r.failed_count)
            }
            ActionDetail::RestartService(r) => match r.exit_code {
                Some(code) => format!("exit code {code}"),
                None => "did not exit normally".to_string(),
            },
            ActionDetail::BackendSelfHeal(r) => r.detail.clone(),
        };
        format!(
            "{} on {}: {:?} ({})",
            self.action_name, self.target, self.outcome, detail
        )
    }
}
