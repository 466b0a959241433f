//! Report delivery.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::Report;
use crate::config::NotifyConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("failed to hand message to mail transport: {0}")]
    Io(#[from] std::io::Error),

    #[error("mail transport exited with {code:?}: {stderr}")]
    Rejected { code: Option<i32>, stderr: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &Report) -> Result<(), NotifyError>;
}

/// Pick the notifier the configuration asks for.
pub fn from_config(cfg: &NotifyConfig) -> Arc<dyn Notifier> {
    match cfg.to.as_deref().map(str::trim).filter(|to| !to.is_empty()) {
        Some(to) => Arc::new(SendmailNotifier {
            sendmail_path: cfg.sendmail_path.clone(),
            from: cfg.from.clone(),
            to: to.to_string(),
        }),
        None => Arc::new(LogNotifier),
    }
}

/// Logs the report instead of sending it. Used when no recipient is set.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, report: &Report) -> Result<(), NotifyError> {
        info!(subject = %report.subject, "no recipient configured, report not mailed");
        Ok(())
    }
}

/// Pipes a MIME message to `sendmail -t`.
pub struct SendmailNotifier {
    pub sendmail_path: PathBuf,
    pub from: String,
    pub to: String,
}

#[async_trait]
impl Notifier for SendmailNotifier {
    fn name(&self) -> &'static str {
        "sendmail"
    }

    async fn deliver(&self, report: &Report) -> Result<(), NotifyError> {
        let message = render_message(&self.from, &self.to, report);
        let mut child = tokio::process::Command::new(&self.sendmail_path)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| NotifyError::Spawn {
                program: self.sendmail_path.display().to_string(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(message.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let out = child.wait_with_output().await?;
        if !out.status.success() {
            return Err(NotifyError::Rejected {
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        info!(to = %self.to, subject = %report.subject, "report mailed");
        Ok(())
    }
}

/// Header values must stay on one line.
fn header_value(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// Build a `multipart/alternative` message with text and HTML parts.
pub fn render_message(from: &str, to: &str, report: &Report) -> String {
    let boundary = format!("=_sre_{}", uuid::Uuid::new_v4().simple());
    let mut msg = String::new();
    msg.push_str(&format!("From: {}\r\n", header_value(from)));
    msg.push_str(&format!("To: {}\r\n", header_value(to)));
    msg.push_str(&format!("Subject: {}\r\n", header_value(&report.subject)));
    msg.push_str(&format!("Date: {}\r\n", chrono::Utc::now().to_rfc2822()));
    msg.push_str("MIME-Version: 1.0\r\n");
    msg.push_str(&format!(
        "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n"
    ));

    for (ctype, body) in [
        ("text/plain", report.body_text.as_str()),
        ("text/html", report.body_html.as_str()),
    ] {
        msg.push_str(&format!("--{boundary}\r\n"));
        msg.push_str(&format!("Content-Type: {ctype}; charset=utf-8\r\n"));
        msg.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
        msg.push_str(body);
        msg.push_str("\r\n");
    }
    msg.push_str(&format!("--{boundary}--\r\n"));
    msg
}
