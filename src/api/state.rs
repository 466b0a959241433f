//! Shared state behind the agent API.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::agent::{Agent, RunOutcome};
use crate::pipeline::RunResult;
use crate::report::DraftedBy;

/// Most recent runs kept in memory.
pub const HISTORY_CAPACITY: usize = 200;

/// A finished run as listed by `GET /incidents`.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentRecord {
    #[serde(flatten)]
    pub result: RunResult,
    pub subject: String,
    pub diagnosis: Option<String>,
    pub drafted_by: DraftedBy,
    pub delivered: bool,
}

impl From<RunOutcome> for IncidentRecord {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            result: outcome.result,
            subject: outcome.report.subject,
            diagnosis: outcome.report.diagnosis,
            drafted_by: outcome.report.drafted_by,
            delivered: outcome.delivered,
        }
    }
}

/// Bounded, newest-first run history.
#[derive(Debug, Default)]
pub struct IncidentHistory {
    records: RwLock<VecDeque<IncidentRecord>>,
}

impl IncidentHistory {
    pub async fn push(&self, record: IncidentRecord) {
        let mut records = self.records.write().await;
        records.push_front(record);
        records.truncate(HISTORY_CAPACITY);
    }

    pub async fn list(&self, limit: usize) -> Vec<IncidentRecord> {
        self.records.read().await.iter().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub history: Arc<IncidentHistory>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            history: Arc::new(IncidentHistory::default()),
        }
    }
}
