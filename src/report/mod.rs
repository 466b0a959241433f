//! Turning a [`RunResult`] into a human report and delivering it.
//!
//! A generative summarizer may draft the report first. Whenever it fails,
//! times out, or returns something unusable, the deterministic template is
//! used instead.

pub mod notify;
pub mod summarizer;
mod template;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

pub use notify::{LogNotifier, Notifier, NotifyError, SendmailNotifier};
pub use summarizer::{Draft, GeminiSummarizer, SummarizeError, Summarizer};
pub use template::MAX_REFERENCES;

use crate::config::{NotifyConfig, SummarizerConfig};
use crate::pipeline::RunResult;
use template::ReportView;

/// Drafted HTML bodies shorter than this are rejected.
pub const MIN_BODY_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftedBy {
    Summarizer,
    Template,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
    pub diagnosis: Option<String>,
    pub drafted_by: DraftedBy,
}

/// `"<prefix> <type> | <host> | <STATUS>"`
pub fn subject_line(prefix: &str, result: &RunResult) -> String {
    format!(
        "{} {} | {} | {}",
        prefix,
        result.incident.kind().label(),
        result.host,
        result.status
    )
}

/// The deterministic report.
pub fn render(prefix: &str, result: &RunResult) -> Report {
    let view = ReportView::from_result(result);
    Report {
        subject: subject_line(prefix, result),
        body_html: view.render_html(),
        body_text: view.render_text(),
        diagnosis: None,
        drafted_by: DraftedBy::Template,
    }
}

pub struct Reporter {
    subject_prefix: String,
    summarizer: Option<Arc<dyn Summarizer>>,
    style: String,
    timeout: Duration,
}

impl Reporter {
    pub fn new(subject_prefix: impl Into<String>) -> Self {
        let defaults = SummarizerConfig::default();
        Self {
            subject_prefix: subject_prefix.into(),
            summarizer: None,
            style: defaults.style,
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    pub fn from_config(
        client: reqwest::Client,
        notify: &NotifyConfig,
        cfg: &SummarizerConfig,
    ) -> Self {
        let mut reporter = Self::new(notify.subject_prefix.clone());
        reporter.style = cfg.style.clone();
        reporter.timeout = Duration::from_secs(cfg.timeout_secs);
        if let Some(gemini) = GeminiSummarizer::from_config(client, cfg) {
            reporter.summarizer = Some(Arc::new(gemini));
        }
        reporter
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>, timeout: Duration) -> Self {
        self.summarizer = Some(summarizer);
        self.timeout = timeout;
        self
    }

    /// Build the report, preferring a usable summarizer draft.
    pub async fn compose(&self, result: &RunResult) -> Report {
        let fallback = render(&self.subject_prefix, result);
        let Some(summarizer) = &self.summarizer else {
            return fallback;
        };

        let drafted = tokio::time::timeout(self.timeout, summarizer.draft(result, &self.style))
            .await
            .unwrap_or(Err(SummarizeError::Timeout(self.timeout)));

        match drafted {
            Ok(draft) if usable(&draft) => {
                info!(run_id = %result.run_id, "report drafted by summarizer");
                Report {
                    subject: draft.subject.trim().to_string(),
                    body_html: draft.body_html,
                    body_text: fallback.body_text,
                    diagnosis: Some(draft.diagnosis).filter(|d| !d.trim().is_empty()),
                    drafted_by: DraftedBy::Summarizer,
                }
            }
            Ok(_) => {
                warn!(run_id = %result.run_id, "summarizer draft unusable, using template");
                fallback
            }
            Err(e) => {
                warn!(run_id = %result.run_id, error = %e, "summarizer failed, using template");
                fallback
            }
        }
    }
}

fn usable(draft: &Draft) -> bool {
    !draft.subject.trim().is_empty() && draft.body_html.trim().chars().count() >= MIN_BODY_CHARS
}
