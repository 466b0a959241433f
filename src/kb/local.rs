//! Built-in classification table used when no knowledge base is available.

use super::{Classification, KnowledgeBaseTable, Provenance};
use crate::detect::UNKNOWN_INCIDENT;

const ENTRIES: &[(&str, &str, &str, &str)] = &[
    (
        "Backend URL Unhealthy",
        "CWE-703",
        "Improper Check or Handling of Exceptional Conditions",
        "The service does not anticipate or handle an exceptional condition, leaving it unavailable to callers.",
    ),
    (
        "CPU Spike",
        "CWE-400",
        "Uncontrolled Resource Consumption",
        "A process consumes CPU without limit, starving other workloads on the host.",
    ),
    (
        "Disk Usage High",
        "CWE-770",
        "Allocation of Resources Without Limits or Throttling",
        "Storage is allocated without quotas or cleanup, so the volume can fill up.",
    ),
    (
        UNKNOWN_INCIDENT,
        "CWE-1059",
        "Insufficient Technical Impact Assessment",
        "Unable to classify incident type with available evidence.",
    ),
];

/// The static fallback table.
pub fn fallback_table() -> KnowledgeBaseTable {
    let mut table = KnowledgeBaseTable::new("built-in".to_string());
    for (key, code, title, description) in ENTRIES {
        table.insert(
            key.to_string(),
            Classification {
                code: code.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                example_references: Vec::new(),
                keywords: Vec::new(),
                provenance: Provenance::LocalFallback,
                source: None,
            },
        );
    }
    table
}
