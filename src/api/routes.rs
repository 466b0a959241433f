//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::state::{AppState, IncidentRecord, HISTORY_CAPACITY};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/runs", post(trigger_run))
        .route("/incidents", get(list_incidents))
        .route("/kb", get(kb_status))
        .route("/kb/refresh", post(refresh_kb))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn failure(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(json!({ "error": message, "meta": meta() })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "host": state.agent.config().host.label,
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

#[derive(Debug, Deserialize)]
struct RunParams {
    notify: Option<bool>,
}

async fn trigger_run(State(state): State<AppState>, Query(params): Query<RunParams>) -> Response {
    let notify = params.notify.unwrap_or(true);
    match state.agent.run_once(notify).await {
        Ok(outcome) => {
            let record = IncidentRecord::from(outcome);
            state.history.push(record.clone()).await;
            Json(json!({ "data": record, "meta": meta() })).into_response()
        }
        Err(e) => {
            error!(error = %e, "run failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_incidents(State(state): State<AppState>, Query(params): Query<ListParams>) -> Json<Value> {
    let limit = params.limit.unwrap_or(HISTORY_CAPACITY);
    let records = state.history.list(limit).await;
    Json(json!({
        "data": records,
        "meta": { "total": state.history.len().await, "returned": records.len() }
    }))
}

async fn kb_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.agent.kb_status().await, "meta": meta() }))
}

async fn refresh_kb(State(state): State<AppState>) -> Response {
    match state.agent.refresh_kb().await {
        Ok(status) => Json(json!({ "data": status, "meta": meta() })).into_response(),
        Err(e) => {
            warn!(error = %e, "knowledge base refresh failed, keeping current table");
            failure(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
