//! One agent run end to end: pipeline, classification, report, delivery.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::kb::{Classifier, KbError, KbLoader, Provenance};
use crate::pipeline::{Pipeline, RunResult};
use crate::report::{notify, Notifier, Report, Reporter};
use crate::system::{HostMetrics, SysinfoHost};

/// Result of [`Agent::run_once`].
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub result: RunResult,
    pub report: Report,
    /// `false` when notification was skipped or failed.
    pub delivered: bool,
}

/// Which classification table is active.
#[derive(Debug, Clone, Serialize)]
pub struct KbStatus {
    pub provenance: Provenance,
    pub source: String,
    pub entries: usize,
}

impl KbStatus {
    fn of(classifier: &Classifier) -> Self {
        Self {
            provenance: classifier.provenance(),
            source: classifier.table().source().to_string(),
            entries: classifier.table().len(),
        }
    }
}

pub struct Agent {
    config: Arc<AgentConfig>,
    host: Arc<dyn HostMetrics>,
    kb: Option<KbLoader>,
    classifier: RwLock<Classifier>,
    reporter: Reporter,
    notifier: Arc<dyn Notifier>,
    /// Serializes runs so two remediations never race on one host.
    run_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl Agent {
    /// Agent with the built-in classification table. Call [`Agent::load_kb`]
    /// to switch to the configured knowledge base.
    pub fn new(config: AgentConfig, host: Arc<dyn HostMetrics>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        let kb = KbLoader::from_config(client.clone(), &config.kb);
        let reporter = Reporter::from_config(client, &config.notify, &config.summarizer);
        let notifier = notify::from_config(&config.notify);

        Ok(Self {
            config: Arc::new(config),
            host,
            kb,
            classifier: RwLock::new(Classifier::local()),
            reporter,
            notifier,
            run_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        })
    }

    /// Agent on the local host with the knowledge base loaded.
    pub async fn from_config(config: AgentConfig) -> Result<Self> {
        let agent = Self::new(config, Arc::new(SysinfoHost::new()))?;
        agent.load_kb().await;
        Ok(agent)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_kb_loader(mut self, loader: Option<KbLoader>) -> Self {
        self.kb = loader;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn classifier(&self) -> Classifier {
        self.classifier.read().await.clone()
    }

    pub async fn kb_status(&self) -> KbStatus {
        KbStatus::of(&*self.classifier.read().await)
    }

    /// Resolve the classifier from the configured source, honouring the
    /// configured refresh flag. Falls back to the built-in table.
    pub async fn load_kb(&self) -> KbStatus {
        let classifier = Classifier::resolve(self.kb.as_ref(), self.config.kb.refresh).await;
        let status = KbStatus::of(&classifier);
        info!(provenance = ?status.provenance, source = %status.source, entries = status.entries, "classifier ready");
        *self.classifier.write().await = classifier;
        status
    }

    /// Force a re-download. On failure the active table is kept.
    pub async fn refresh_kb(&self) -> Result<KbStatus, KbError> {
        let Some(loader) = &self.kb else {
            return Ok(self.kb_status().await);
        };
        let table = loader.load(true).await?;
        let classifier = Classifier::knowledge_base(table);
        let status = KbStatus::of(&classifier);
        info!(source = %status.source, entries = status.entries, "knowledge base refreshed");
        *self.classifier.write().await = classifier;
        Ok(status)
    }

    /// Run the pipeline once, report, and optionally notify. Delivery
    /// failures are logged and never change the result.
    pub async fn run_once(&self, notify: bool) -> Result<RunOutcome> {
        let _guard = self.run_lock.lock().await;

        let pipeline = Pipeline::new(self.config.clone(), self.host.clone())
            .with_cancellation(self.cancel.clone());
        let classifier = self.classifier().await;
        let result = pipeline.run(&classifier).await;
        let report = self.reporter.compose(&result).await;

        let delivered = if notify {
            match self.notifier.deliver(&report).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(run_id = %result.run_id, notifier = self.notifier.name(), error = %e, "report delivery failed");
                    false
                }
            }
        } else {
            false
        };

        Ok(RunOutcome {
            result,
            report,
            delivered,
        })
    }
}
