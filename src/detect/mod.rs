//! Incident types and severities produced by the decision pipeline.

use serde::{Deserialize, Serialize};

/// Lookup key of the reserved "unknown incident" classification.
pub const UNKNOWN_INCIDENT: &str = "Unknown Incident";

/// The incident categories the pipeline can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentType {
    BackendUnhealthy,
    CpuSpike,
    DiskHigh,
    None,
}

impl IncidentType {
    /// Label used as the knowledge base key and in reports.
    pub fn label(&self) -> &'static str {
        match self {
            IncidentType::BackendUnhealthy => "Backend URL Unhealthy",
            IncidentType::CpuSpike => "CPU Spike",
            IncidentType::DiskHigh => "Disk Usage High",
            IncidentType::None => "No Incident",
        }
    }
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Severity levels for detected incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A detected incident. Built once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(rename = "type")]
    kind: IncidentType,
    details: String,
    severity: Severity,
}

impl Incident {
    pub fn new(kind: IncidentType, severity: Severity, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
            severity,
        }
    }

    /// The "nothing tripped" incident.
    pub fn none() -> Self {
        Self::new(
            IncidentType::None,
            Severity::Info,
            "No threshold breach detected.",
        )
    }

    pub fn kind(&self) -> IncidentType {
        self.kind
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_knowledge_base_keys() {
        assert_eq!(IncidentType::BackendUnhealthy.label(), "Backend URL Unhealthy");
        assert_eq!(IncidentType::CpuSpike.to_string(), "CPU Spike");
        assert_eq!(IncidentType::DiskHigh.label(), "Disk Usage High");
        assert_eq!(IncidentType::None.label(), "No Incident");
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM\"");
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn incident_serializes_type_field() {
        let v = serde_json::to_value(Incident::none()).unwrap();
        assert_eq!(v["type"], "None");
        assert_eq!(v["severity"], "INFO");
    }
}
