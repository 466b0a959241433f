//! Generative report drafting through the Gemini `generateContent` REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::pipeline::RunResult;

/// Diagnosis text longer than this is cut.
pub const MAX_DIAGNOSIS_CHARS: usize = 600;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarizer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("summarizer returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("summarizer response had no text")]
    Empty,

    #[error("summarizer output is not a JSON draft")]
    Unparsable,

    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
}

/// What a summarizer hands back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Draft {
    #[serde(rename = "email_subject", alias = "subject", default)]
    pub subject: String,
    #[serde(rename = "email_body_html", alias = "body_html", default)]
    pub body_html: String,
    #[serde(default)]
    pub diagnosis: String,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn draft(&self, result: &RunResult, style: &str) -> Result<Draft, SummarizeError>;
}

pub struct GeminiSummarizer {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiSummarizer {
    /// `None` when no API key is configured.
    pub fn from_config(client: Client, cfg: &SummarizerConfig) -> Option<Self> {
        let api_key = cfg.api_key.clone().filter(|k| !k.trim().is_empty())?;
        Some(Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn draft(&self, result: &RunResult, style: &str) -> Result<Draft, SummarizeError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt(result, style) }] }]
        });
        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SummarizeError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let payload: Value = resp.json().await?;
        let text = response_text(&payload).ok_or(SummarizeError::Empty)?;
        debug!(chars = text.len(), model = %self.model, "summarizer responded");
        parse_draft(&text)
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(payload: &Value) -> Option<String> {
    let parts = payload
        .pointer("/candidates/0/content/parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Pull a JSON object out of model output that may be wrapped in code fences
/// or surrounded by prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let cleaned = strip_fences(text);
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&cleaned) {
        return Some(v);
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        let lang_len = rest
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_alphabetic())
            .count();
        if rest[..lang_len].eq_ignore_ascii_case("json") {
            rest = &rest[lang_len..];
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Parse model output into a draft, capping the diagnosis.
pub fn parse_draft(text: &str) -> Result<Draft, SummarizeError> {
    let value = extract_json(text).ok_or(SummarizeError::Unparsable)?;
    let mut draft: Draft = serde_json::from_value(value).map_err(|_| SummarizeError::Unparsable)?;
    draft.body_html = strip_fences(&draft.body_html);
    if draft.diagnosis.chars().count() > MAX_DIAGNOSIS_CHARS {
        draft.diagnosis = draft.diagnosis.chars().take(MAX_DIAGNOSIS_CHARS).collect();
    }
    Ok(draft)
}

fn pretty(value: impl serde::Serialize) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

fn prompt(result: &RunResult, style: &str) -> String {
    format!(
        r#"You are an SRE assistant.

Return ONLY valid JSON (no markdown, no code fences, no extra text).

Goal:
- a short diagnosis (1-2 lines)
- an email-safe HTML body with inline CSS only, using tables for:
  1) summary (incident type, severity, final status, details)
  2) evidence (key/value)
  3) remediation attempts as a list
  4) next steps as a list
  5) classification (code, title, meaning, example references)

STYLE: {style}

INPUT DATA (use these facts only):
host = {host}
incident = {incident}
evidence = {evidence}
attempts = {attempts}
status = "{status}"
next_steps = {next_steps}
classification = {classification}

Return STRICT JSON with keys:
{{"email_subject": "...", "email_body_html": "...", "diagnosis": "..."}}
"#,
        host = pretty(&result.host),
        incident = pretty(&result.incident),
        evidence = pretty(&result.evidence),
        attempts = pretty(&result.attempts),
        status = result.status,
        next_steps = pretty(&result.next_steps),
        classification = pretty(&result.classification),
    )
}
