//! Backend self-heal.
//!
//! Two phases:
//! - reachable but degraded (`503`): ask the backend to resume service;
//! - unreachable: launch a fresh backend process detached from the agent,
//!   wait a fixed grace period, then re-probe once.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Outcome;
use crate::config::BackendConfig;
use crate::probes::HttpProber;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfHealReport {
    pub recovered: bool,
    pub detail: String,
}

impl SelfHealReport {
    fn new(recovered: bool, detail: impl Into<String>) -> Self {
        Self {
            recovered,
            detail: detail.into(),
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.recovered {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }
}

/// The command that starts a backend process.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl BackendLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The configured launch command, or this binary's `demo-backend`
    /// subcommand bound to the configured host and port.
    pub fn from_config(cfg: &BackendConfig) -> Result<Self> {
        if let Some((program, args)) = cfg.launch_command.split_first() {
            return Ok(Self::new(program, args.to_vec()));
        }
        let exe = std::env::current_exe().context("cannot locate agent executable")?;
        Ok(Self::new(
            exe,
            vec![
                "demo-backend".to_string(),
                "--host".to_string(),
                cfg.host.clone(),
                "--port".to_string(),
                cfg.port.to_string(),
            ],
        ))
    }

    /// Start the process and return its pid without waiting for it. The child
    /// gets its own process group and null stdio so it outlives the agent.
    pub fn spawn_detached(&self) -> std::io::Result<u32> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();
        // Reap the child whenever it exits; nobody waits on this thread.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(pid)
    }
}

impl std::fmt::Display for BackendLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs the self-heal policy against one backend.
pub struct SelfHealer {
    pub http: HttpProber,
    /// `None` when no launch command could be resolved; an unreachable
    /// backend then fails to heal.
    pub launcher: Option<BackendLauncher>,
    /// Wait after a launch before the verification probe.
    pub grace: Duration,
    pub probe_timeout: Duration,
}

impl SelfHealer {
    pub fn from_config(http: HttpProber, cfg: &BackendConfig) -> Self {
        let launcher = match BackendLauncher::from_config(cfg) {
            Ok(launcher) => Some(launcher),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "no backend launch command");
                None
            }
        };
        Self {
            http,
            launcher,
            grace: cfg.grace(),
            probe_timeout: cfg.probe_timeout(),
        }
    }

    pub async fn attempt(&self, base_url: &str, cancel: &CancellationToken) -> SelfHealReport {
        let base = base_url.trim_end_matches('/');
        let health = self.http.probe_health(base, self.probe_timeout).await;

        match health.status_code {
            Some(200) => {
                return SelfHealReport::new(
                    true,
                    "Backend already healthy (200 on /health). No action needed.",
                )
            }
            Some(503) => return self.resume(base).await,
            Some(code) => {
                return SelfHealReport::new(
                    false,
                    format!("Backend returned unexpected status on /health: {code}"),
                )
            }
            None => {}
        }

        let Some(launcher) = &self.launcher else {
            return SelfHealReport::new(false, "Failed to start backend: no launch command available");
        };
        info!(%launcher, "backend unreachable, launching");
        let pid = match launcher.spawn_detached() {
            Ok(pid) => pid,
            Err(e) => {
                warn!(error = %e, "backend launch failed");
                return SelfHealReport::new(false, format!("Failed to start backend: {e}"));
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                return SelfHealReport::new(
                    false,
                    format!("Started backend (pid {pid}) but verification was cancelled."),
                );
            }
            _ = tokio::time::sleep(self.grace) => {}
        }

        let after = self.http.probe_health(base, self.probe_timeout).await;
        if after.healthy {
            SelfHealReport::new(
                true,
                format!("Started backend (pid {pid}) and health is OK."),
            )
        } else {
            let status = after
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unreachable".to_string());
            SelfHealReport::new(
                false,
                format!("Started backend (pid {pid}) but /health still not OK (status={status})."),
            )
        }
    }

    /// Ask a degraded backend to resume service.
    async fn resume(&self, base: &str) -> SelfHealReport {
        let url = format!("{base}/simulate/service_up");
        info!(%url, "backend degraded, requesting resume");
        match self
            .http
            .client()
            .post(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status().as_u16();
                SelfHealReport::new(
                    status < 400,
                    format!("Called /simulate/service_up (status={status})"),
                )
            }
            Err(e) => SelfHealReport::new(
                false,
                format!("Backend reachable but failed to call /simulate/service_up: {e}"),
            ),
        }
    }
}

/// Self-heal the backend at `base_url` with default timings, launching this
/// binary's demo backend on `host:port` if nothing answers.
pub async fn attempt_backend_self_heal(base_url: &str, host: &str, port: u16) -> SelfHealReport {
    let cfg = BackendConfig {
        url: Some(base_url.to_string()),
        host: host.to_string(),
        port,
        ..BackendConfig::default()
    };
    SelfHealer::from_config(HttpProber::default(), &cfg)
        .attempt(base_url, &CancellationToken::new())
        .await
}
