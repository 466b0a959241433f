//! sreagent -- policy-gated host incident detection, remediation and reporting.
//!
//! A run probes the configured backend, CPU and disk in priority order,
//! applies at most one permitted remediation, re-measures to decide whether
//! the incident is resolved, classifies it against a knowledge base, and
//! renders a report for delivery.

pub mod agent;
pub mod api;
pub mod config;
pub mod demo_backend;
pub mod detect;
pub mod evidence;
pub mod kb;
pub mod pipeline;
pub mod probes;
pub mod remediation;
pub mod report;
pub mod system;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Start the agent daemon: load the knowledge base, then serve the API until
/// Ctrl-C.
pub async fn serve(bind: &str, config: config::AgentConfig) -> Result<()> {
    let agent = Arc::new(agent::Agent::from_config(config).await?);
    let cancel = agent.cancel_token();
    let app = api::router(api::AppState::new(agent));

    let addr: std::net::SocketAddr = bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "sre agent listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    tracing::info!("sre agent stopped");
    Ok(())
}

/// Resolve on Ctrl-C and cancel `cancel`, which aborts in-flight CPU sampling
/// and self-heal waits.
pub async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    cancel.cancel();
}
