use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Longest response body kept as failure detail.
const MAX_DETAIL_LEN: usize = 512;

/// Outcome of a single GET against an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpProbeResult {
    pub url: String,
    pub healthy: bool,
    /// `None` when no response was received at all.
    pub status_code: Option<u16>,
    pub latency_ms: f64,
    /// Response body for non-200 replies, or the transport error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl HttpProbeResult {
    /// True when the endpoint answered at all, whatever the status.
    pub fn reachable(&self) -> bool {
        self.status_code.is_some()
    }
}

/// HTTP probe: healthy means exactly `200`.
#[derive(Clone, Default)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Issue one GET to `url`. Never fails: transport errors produce an
    /// unhealthy result carrying the error text.
    pub async fn probe(&self, url: &str, timeout: Duration) -> HttpProbeResult {
        let start = Instant::now();
        let result = self.client.get(url).timeout(timeout).send().await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(resp) => {
                let status = resp.status();
                let healthy = status == reqwest::StatusCode::OK;
                let error_detail = if healthy {
                    None
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    Some(format!("status {}: {}", status.as_u16(), truncate(&body)))
                };
                HttpProbeResult {
                    url: url.to_string(),
                    healthy,
                    status_code: Some(status.as_u16()),
                    latency_ms,
                    error_detail,
                }
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "endpoint unreachable");
                HttpProbeResult {
                    url: url.to_string(),
                    healthy: false,
                    status_code: None,
                    latency_ms,
                    error_detail: Some(format!("unreachable: {e}")),
                }
            }
        }
    }

    /// Probe `{base}/health`.
    pub async fn probe_health(&self, base_url: &str, timeout: Duration) -> HttpProbeResult {
        self.probe(&health_url(base_url), timeout).await
    }
}

pub fn health_url(base_url: &str) -> String {
    format!("{}/health", base_url.trim_end_matches('/'))
}

fn truncate(s: &str) -> &str {
    let s = s.trim();
    if s.len() <= MAX_DETAIL_LEN {
        return s;
    }
    let mut end = MAX_DETAIL_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn health_url_trims_slash() {
        assert_eq!(health_url("http://h:8000/"), "http://h:8000/health");
        assert_eq!(health_url("http://h:8000"), "http://h:8000/health");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(400);
        let t = truncate(&long);
        assert!(t.len() <= MAX_DETAIL_LEN);
        assert!(t.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn ok_is_healthy() {
        let base = serve(Router::new().route("/health", get(|| async { "ok" }))).await;
        let res = HttpProber::default()
            .probe_health(&base, Duration::from_secs(2))
            .await;
        assert!(res.healthy);
        assert_eq!(res.status_code, Some(200));
        assert!(res.error_detail.is_none());
    }

    #[tokio::test]
    async fn non_200_captures_status_and_body() {
        let app = Router::new().route(
            "/health",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let base = serve(app).await;
        let res = HttpProber::default()
            .probe_health(&base, Duration::from_secs(2))
            .await;
        assert!(!res.healthy);
        assert!(res.reachable());
        assert_eq!(res.status_code, Some(503));
        assert!(res.error_detail.unwrap().contains("maintenance"));
    }

    #[tokio::test]
    async fn unreachable_is_degraded_not_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let res = HttpProber::default()
            .probe(&format!("http://{addr}/health"), Duration::from_millis(500))
            .await;
        assert!(!res.healthy);
        assert!(!res.reachable());
        assert!(res.error_detail.unwrap().starts_with("unreachable"));
    }
}
