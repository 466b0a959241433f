//! Knowledge base resolver: incident type -> external classification.
//!
//! The table is loaded from a spreadsheet-like artifact (downloaded once and
//! cached) and is read-only afterwards. Lookups never fail; they fall back to
//! the "unknown incident" entry and, failing that, to a hard-coded
//! "knowledge base unavailable" classification.

pub mod columns;
pub mod fetch;
pub mod local;
pub mod sheet;
pub mod table;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::KbConfig;
use crate::detect::UNKNOWN_INCIDENT;

#[derive(Debug, Error)]
pub enum KbError {
    #[error("knowledge base download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("knowledge base i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("failed to read delimited file: {0}")]
    Delimited(#[from] csv::Error),

    #[error("knowledge base sheet is empty")]
    EmptySheet,

    #[error("no code column in sheet '{sheet}' (columns seen: {columns:?})")]
    MissingCodeColumn { sheet: String, columns: Vec<String> },

    #[error("knowledge base task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    KnowledgeBase,
    LocalFallback,
}

/// An external taxonomy entry attached to an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub code: String,
    pub title: String,
    pub description: String,
    pub example_references: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub provenance: Provenance,
    /// `file::sheet` the entry was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Returned when there is nothing to look a classification up in.
pub fn kb_unavailable() -> Classification {
    Classification {
        code: "CWE-1059".to_string(),
        title: "KB Unavailable / Lookup Failed".to_string(),
        description: "Unable to map incident to CWE (KB missing fallback).".to_string(),
        example_references: Vec::new(),
        keywords: Vec::new(),
        provenance: Provenance::LocalFallback,
        source: None,
    }
}

/// Incident type key -> classification. Built once, then read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBaseTable {
    entries: HashMap<String, Classification>,
    source: String,
}

impl KnowledgeBaseTable {
    pub(crate) fn new(source: String) -> Self {
        Self {
            entries: HashMap::new(),
            source,
        }
    }

    pub(crate) fn insert(&mut self, key: String, classification: Classification) {
        self.entries.insert(key, classification);
    }

    pub fn get(&self, key: &str) -> Option<&Classification> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Label of the artifact this table was built from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Exact, case-sensitive lookup with fallback to the unknown entry.
pub fn lookup(incident_type: &str, table: &KnowledgeBaseTable) -> Classification {
    table
        .get(incident_type)
        .or_else(|| table.get(UNKNOWN_INCIDENT))
        .cloned()
        .unwrap_or_else(kb_unavailable)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Downloads (when needed) and parses the knowledge base artifact.
///
/// Download and parse happen under one lock so a concurrent refresh can never
/// hand back a half-written cache file.
pub struct KbLoader {
    client: Client,
    source_url: String,
    cache_dir: PathBuf,
    cache_filename: String,
    lock: Mutex<()>,
}

impl KbLoader {
    pub fn new(
        client: Client,
        source_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        cache_filename: impl Into<String>,
    ) -> Self {
        Self {
            client,
            source_url: source_url.into(),
            cache_dir: cache_dir.into(),
            cache_filename: cache_filename.into(),
            lock: Mutex::new(()),
        }
    }

    /// Loader for the configured source, if any.
    pub fn from_config(client: Client, cfg: &KbConfig) -> Option<Self> {
        let url = cfg.url.as_deref()?;
        Some(Self::new(client, url, &cfg.cache_dir, &cfg.filename))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(&self.cache_filename)
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Load the table, downloading first if `force_refresh` is set or nothing
    /// is cached yet.
    pub async fn load(&self, force_refresh: bool) -> Result<KnowledgeBaseTable, KbError> {
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let path = self.cache_path();
        let cached = tokio::fs::try_exists(&path).await.unwrap_or(false);

        if force_refresh || !cached {
            info!(url = %self.source_url, path = %path.display(), force_refresh, "fetching knowledge base");
            fetch::download(&self.client, &self.source_url, &path).await?;
        } else {
            debug!(path = %path.display(), "using cached knowledge base");
        }

        let file_label = self.cache_filename.clone();
        let table = tokio::task::spawn_blocking(move || -> Result<KnowledgeBaseTable, KbError> {
            let sheet = sheet::read(&path)?;
            table::build_table(&sheet, &file_label)
        })
        .await??;

        info!(source = table.source(), entries = table.len(), "knowledge base loaded");
        Ok(table)
    }
}

/// Convenience wrapper around [`KbLoader::load`].
pub async fn load(
    source_url: &str,
    cache_dir: &Path,
    cache_filename: &str,
    force_refresh: bool,
) -> Result<KnowledgeBaseTable, KbError> {
    KbLoader::new(Client::new(), source_url, cache_dir, cache_filename)
        .load(force_refresh)
        .await
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// The table the pipeline classifies against: a loaded knowledge base or the
/// built-in fallback.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: Arc<KnowledgeBaseTable>,
    provenance: Provenance,
}

impl Classifier {
    pub fn knowledge_base(table: KnowledgeBaseTable) -> Self {
        Self {
            table: Arc::new(table),
            provenance: Provenance::KnowledgeBase,
        }
    }

    pub fn local() -> Self {
        Self {
            table: Arc::new(local::fallback_table()),
            provenance: Provenance::LocalFallback,
        }
    }

    /// Use the loader when there is one, falling back to the built-in table on
    /// any load error.
    pub async fn resolve(loader: Option<&KbLoader>, force_refresh: bool) -> Self {
        let Some(loader) = loader else {
            debug!("no knowledge base configured, using built-in classifications");
            return Self::local();
        };
        match loader.load(force_refresh).await {
            Ok(table) => Self::knowledge_base(table),
            Err(e) => {
                warn!(url = loader.source_url(), error = %e, "knowledge base load failed, using built-in classifications");
                Self::local()
            }
        }
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn table(&self) -> &KnowledgeBaseTable {
        &self.table
    }

    pub fn classify(&self, incident_type: &str) -> Classification {
        lookup(incident_type, &self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_on_empty_table_is_kb_unavailable() {
        let c = lookup("", &KnowledgeBaseTable::default());
        assert_eq!(c, kb_unavailable());
        assert_eq!(c.title, "KB Unavailable / Lookup Failed");
    }

    #[test]
    fn lookup_is_total() {
        let table = local::fallback_table();
        for key in ["", "cpu spike", "CPU Spike", "\u{1F525}", "Disk Usage High "] {
            let c = lookup(key, &table);
            assert!(!c.code.is_empty());
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let table = local::fallback_table();
        assert_eq!(lookup("CPU Spike", &table).code, "CWE-400");
        assert_eq!(lookup("cpu spike", &table).code, "CWE-1059");
    }

    #[test]
    fn classifier_reports_provenance() {
        let c = Classifier::local();
        assert_eq!(c.provenance(), Provenance::LocalFallback);
        assert_eq!(c.classify("Disk Usage High").code, "CWE-770");
    }

    #[test]
    fn resolve_without_loader_is_local() {
        let c = tokio_test::block_on(Classifier::resolve(None, false));
        assert_eq!(c.provenance(), Provenance::LocalFallback);
    }
}
