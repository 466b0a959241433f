//! Demo backend used as a remediation target.
//!
//! Serves `/health` and policy-gated simulation endpoints that force the
//! service down or up and burn CPU for a while. Service state lives in an
//! explicit [`ServiceState`] handle shared with the handlers.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DEFAULT_DOWN_REASON: &str = "Simulated outage";

/// Longest CPU burn a single request may start.
const MAX_BURN_SECS: u64 = 300;

#[derive(Debug)]
struct Inner {
    down: bool,
    reason: String,
}

/// Shared, explicit service state of the demo backend.
#[derive(Debug, Clone)]
pub struct ServiceState {
    inner: Arc<RwLock<Inner>>,
    allow_simulation: bool,
}

impl ServiceState {
    pub fn new(allow_simulation: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                down: false,
                reason: "Maintenance mode".to_string(),
            })),
            allow_simulation,
        }
    }

    pub fn is_down(&self) -> bool {
        self.inner.read().map(|i| i.down).unwrap_or(true)
    }

    /// Current down reason, if the service is down.
    pub fn down_reason(&self) -> Option<String> {
        let inner = self.inner.read().ok()?;
        if inner.down {
            Some(inner.reason.clone())
        } else {
            None
        }
    }

    pub fn set_down(&self, reason: impl Into<String>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.down = true;
            inner.reason = reason.into();
        }
    }

    pub fn set_up(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.down = false;
        }
    }

    pub fn simulation_allowed(&self) -> bool {
        self.allow_simulation
    }
}

/// Build the demo backend router.
pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/simulate/service_down", post(simulate_service_down))
        .route("/simulate/service_up", post(simulate_service_up))
        .route("/simulate/cpu", post(simulate_cpu))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the demo backend on `bind` until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    state: ServiceState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: std::net::SocketAddr = bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, simulation = state.simulation_allowed(), "demo backend listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serve on an ephemeral localhost port in the background and return the
/// base URL.
pub async fn spawn_local(state: ServiceState) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            tracing::error!(error = %e, "demo backend stopped");
        }
    });
    Ok(format!("http://{addr}"))
}

async fn health(State(state): State<ServiceState>) -> Response {
    match state.down_reason() {
        Some(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "DOWN", "reason": reason })),
        )
            .into_response(),
        None => Json(json!({ "status": "OK" })).into_response(),
    }
}

fn simulation_forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "ok": false, "message": "simulation is disabled" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct DownParams {
    reason: Option<String>,
}

async fn simulate_service_down(
    State(state): State<ServiceState>,
    Query(params): Query<DownParams>,
) -> Response {
    if !state.simulation_allowed() {
        return simulation_forbidden();
    }
    let reason = params
        .reason
        .unwrap_or_else(|| DEFAULT_DOWN_REASON.to_string());
    state.set_down(reason.clone());
    info!(%reason, "service forced down");
    Json(json!({
        "ok": true,
        "message": "Service now returns 503 on /health",
        "reason": reason
    }))
    .into_response()
}

async fn simulate_service_up(State(state): State<ServiceState>) -> Response {
    if !state.simulation_allowed() {
        return simulation_forbidden();
    }
    state.set_up();
    info!("service restored");
    Json(json!({ "ok": true, "message": "Service restored (200 on /health)" })).into_response()
}

#[derive(Debug, Deserialize)]
struct CpuParams {
    seconds: Option<u64>,
    workers: Option<usize>,
}

async fn simulate_cpu(State(state): State<ServiceState>, Query(params): Query<CpuParams>) -> Response {
    if !state.simulation_allowed() {
        return simulation_forbidden();
    }
    let (seconds, workers) = burn_limits(params.seconds, params.workers);
    let workers = start_cpu_burn(Duration::from_secs(seconds), workers);
    Json(json!({
        "ok": true,
        "message": format!("CPU burn started for ~{seconds}s with {workers} worker threads")
    }))
    .into_response()
}

/// Requested burn length and worker count, clamped to `MAX_BURN_SECS` and
/// to twice the available parallelism.
fn burn_limits(seconds: Option<u64>, workers: Option<usize>) -> (u64, usize) {
    let max_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2;
    (
        seconds.unwrap_or(15).min(MAX_BURN_SECS),
        workers.unwrap_or(4).clamp(1, max_workers),
    )
}

/// Spin up to `workers` OS threads for `duration` and return how many
/// started. Returns immediately.
pub fn start_cpu_burn(duration: Duration, workers: usize) -> usize {
    info!(secs = duration.as_secs(), workers, "starting CPU burn");
    for started in 0..workers {
        let spawned = std::thread::Builder::new()
            .name("cpu-burn".to_string())
            .spawn(move || burn(duration));
        if let Err(e) = spawned {
            warn!(error = %e, started, "could not start burn thread");
            return started;
        }
    }
    workers
}

fn burn(duration: Duration) -> u64 {
    let end = Instant::now() + duration;
    let mut x: u64 = 0;
    while Instant::now() < end {
        x = (x * 3 + 7) % 1_000_003;
        x = (x * 13 + 17) % 10_000_019;
        x = (x ^ 0xAB_CDEF) % 10_000_079;
        std::hint::black_box(x);
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reflects_state() {
        let state = ServiceState::new(true);
        let (status, json) = call(router(state.clone()), Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "OK");

        let (status, _) = call(
            router(state.clone()),
            Method::POST,
            "/simulate/service_down?reason=disk%20full",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = call(router(state.clone()), Method::GET, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["reason"], "disk full");

        let (status, _) = call(router(state.clone()), Method::POST, "/simulate/service_up").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.is_down());
    }

    #[tokio::test]
    async fn simulation_can_be_disabled() {
        let state = ServiceState::new(false);
        let (status, json) = call(router(state.clone()), Method::POST, "/simulate/service_down").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["ok"], false);
        assert!(!state.is_down());
    }

    #[tokio::test]
    async fn cpu_burn_clamps_workers() {
        let (status, json) = call(
            router(ServiceState::new(true)),
            Method::POST,
            "/simulate/cpu?seconds=0&workers=0",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["message"].as_str().unwrap().contains("1 worker"));
    }

    #[tokio::test]
    async fn cpu_burn_caps_oversized_requests() {
        let (_, max_workers) = burn_limits(None, Some(usize::MAX));
        let (status, json) = call(
            router(ServiceState::new(true)),
            Method::POST,
            "/simulate/cpu?seconds=0&workers=100000",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let message = json["message"].as_str().unwrap();
        assert!(message.contains(&format!("{max_workers} worker")), "{message}");
    }

    #[test]
    fn burn_limits_clamp() {
        let (_, max_workers) = burn_limits(None, Some(usize::MAX));
        assert!(max_workers >= 2);
        assert_eq!(burn_limits(None, None), (15, 4.min(max_workers)));
        assert_eq!(burn_limits(Some(86_400), Some(1)).0, MAX_BURN_SECS);
        assert_eq!(burn_limits(Some(0), Some(0)), (0, 1));
    }

    #[test]
    fn default_down_reason() {
        let state = ServiceState::new(true);
        assert_eq!(state.down_reason(), None);
        state.set_down(DEFAULT_DOWN_REASON);
        assert_eq!(state.down_reason().as_deref(), Some(DEFAULT_DOWN_REASON));
    }
}
