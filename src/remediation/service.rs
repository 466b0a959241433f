//! Restarting a service through the host service manager.

use serde::Serialize;
use tracing::{info, warn};

use super::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRestartReport {
    pub service: String,
    /// `None` if the manager could not be run or was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ServiceRestartReport {
    pub fn outcome(&self) -> Outcome {
        if self.exit_code == Some(0) {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }
}

/// Service names are passed to a shell on Windows, so keep them plain.
pub fn validate_service_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("service name cannot be empty".to_string());
    }
    if name.starts_with('-') {
        return Err("service name cannot start with a hyphen".to_string());
    }
    if name
        .chars()
        .any(|c| !c.is_alphanumeric() && !matches!(c, '.' | '-' | '_' | '@' | ':'))
    {
        return Err("service name contains invalid characters".to_string());
    }
    Ok(())
}

fn manager_command(name: &str) -> tokio::process::Command {
    if cfg!(windows) {
        let mut cmd = tokio::process::Command::new("powershell");
        cmd.args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"])
            .arg(format!("Restart-Service -Name '{name}' -Force"));
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("systemctl");
        cmd.arg("restart").arg(name);
        cmd
    }
}

/// Ask the service manager to restart `name` and report the raw result.
/// Interpreting the exit code is left to the caller.
pub async fn restart_service(name: &str) -> ServiceRestartReport {
    if let Err(reason) = validate_service_name(name) {
        warn!(service = %name, %reason, "refusing to restart service");
        return ServiceRestartReport {
            service: name.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: reason,
        };
    }

    info!(service = %name, "restarting service");
    match manager_command(name).output().await {
        Ok(out) => ServiceRestartReport {
            service: name.to_string(),
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        },
        Err(e) => {
            warn!(service = %name, error = %e, "failed to run service manager");
            ServiceRestartReport {
                service: name.to_string(),
                exit_code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_injection() {
        assert!(validate_service_name("nginx").is_ok());
        assert!(validate_service_name("getty@tty1").is_ok());
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name("--force").is_err());
        assert!(validate_service_name("x'; Stop-Computer; '").is_err());
    }

    #[tokio::test]
    async fn invalid_name_is_reported_not_run() {
        let r = restart_service("bad name").await;
        assert_eq!(r.exit_code, None);
        assert_eq!(r.outcome(), Outcome::Failed);
        assert!(r.stderr.contains("invalid"));
    }

    #[test]
    fn only_zero_exit_is_success() {
        let mut r = ServiceRestartReport {
            service: "x".into(),
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(r.outcome(), Outcome::Success);
        r.exit_code = Some(5);
        assert_eq!(r.outcome(), Outcome::Failed);
    }
}
