//! Deterministic report rendering (askama).

use askama::Template;
use serde_json::Value;

use crate::detect::Severity;
use crate::kb::Provenance;
use crate::pipeline::{RunResult, RunStatus};

/// At most this many classification references are shown.
pub const MAX_REFERENCES: usize = 8;

const BADGE_BASE: &str =
    "display:inline-block; padding:2px 10px; border-radius:999px; font-size:12px; font-weight:600;";

pub(crate) struct EvidenceRow {
    pub name: String,
    pub value: String,
}

pub(crate) struct ClassificationView {
    pub code: String,
    pub title: String,
    pub description: String,
    pub references: Vec<String>,
    pub source: String,
}

/// Flattened, display-ready view of a [`RunResult`].
pub(crate) struct ReportView {
    pub host: String,
    pub run_id: String,
    pub finished_at: String,
    pub incident_type: String,
    pub severity: String,
    pub severity_style: String,
    pub status: String,
    pub status_style: String,
    pub details: String,
    pub evidence: Vec<EvidenceRow>,
    pub attempts: Vec<String>,
    pub next_steps: Vec<String>,
    pub classification: ClassificationView,
}

#[derive(Template)]
#[template(path = "report.html")]
struct HtmlReport<'a> {
    r: &'a ReportView,
}

#[derive(Template)]
#[template(path = "report.txt")]
struct TextReport<'a> {
    r: &'a ReportView,
}

fn badge(fg: &str, bg: &str) -> String {
    format!("{BADGE_BASE} color:{fg}; background:{bg}; border:1px solid {fg};")
}

fn severity_style(severity: Severity) -> String {
    match severity {
        Severity::Critical | Severity::High => badge("#842029", "#f8d7da"),
        Severity::Medium => badge("#664d03", "#fff3cd"),
        Severity::Low => badge("#084298", "#cfe2ff"),
        Severity::Info => badge("#41464b", "#e2e3e5"),
    }
}

fn status_style(status: RunStatus) -> String {
    match status {
        RunStatus::Resolved => badge("#0f5132", "#d1e7dd"),
        RunStatus::Blocked => badge("#842029", "#f8d7da"),
    }
}

/// Strings are shown as-is; everything else as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unavailable".to_string(),
        other => other.to_string(),
    }
}

impl ReportView {
    pub fn from_result(result: &RunResult) -> Self {
        let c = &result.classification;
        let source = match (c.provenance, c.source.as_deref()) {
            (Provenance::KnowledgeBase, Some(src)) => format!("knowledge base ({src})"),
            (Provenance::KnowledgeBase, None) => "knowledge base".to_string(),
            (Provenance::LocalFallback, _) => "built-in fallback table".to_string(),
        };

        Self {
            host: result.host.clone(),
            run_id: result.run_id.to_string(),
            finished_at: result.finished_at.to_rfc3339(),
            incident_type: result.incident.kind().label().to_string(),
            severity: result.incident.severity().to_string(),
            severity_style: severity_style(result.incident.severity()),
            status: result.status.to_string(),
            status_style: status_style(result.status),
            details: result.incident.details().to_string(),
            evidence: result
                .evidence
                .iter()
                .map(|(name, value)| EvidenceRow {
                    name: name.to_string(),
                    value: display_value(value),
                })
                .collect(),
            attempts: result.attempts.iter().map(|a| a.summary()).collect(),
            next_steps: result.next_steps.clone(),
            classification: ClassificationView {
                code: c.code.clone(),
                title: c.title.clone(),
                description: c.description.clone(),
                references: c
                    .example_references
                    .iter()
                    .take(MAX_REFERENCES)
                    .cloned()
                    .collect(),
                source,
            },
        }
    }

    pub fn render_html(&self) -> String {
        HtmlReport { r: self }.render().unwrap_or_else(|e| {
            tracing::error!(error = %e, "html report template failed");
            format!("<pre>{}</pre>", self.render_text())
        })
    }

    pub fn render_text(&self) -> String {
        TextReport { r: self }.render().unwrap_or_else(|e| {
            tracing::error!(error = %e, "text report template failed");
            format!(
                "{} | {} | {}\n{}",
                self.incident_type, self.host, self.status, self.details
            )
        })
    }
}
