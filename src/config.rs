//! Layered agent configuration.
//!
//! Compiled-in defaults permit a no-config run. A TOML file may override them,
//! and environment variables (the same names the agent has always used, such
//! as `CPU_THRESHOLD_PCT`) override the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "SRE_AGENT_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub host: HostConfig,
    pub backend: BackendConfig,
    pub thresholds: ThresholdConfig,
    pub policy: PolicyConfig,
    pub kb: KbConfig,
    pub notify: NotifyConfig,
    pub summarizer: SummarizerConfig,
}

impl AgentConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.thresholds.sanitize();
        info!(path = %path.display(), "loaded agent configuration");
        Ok(config)
    }

    /// Resolve the effective configuration:
    /// 1. `explicit` path, else the path in `SRE_AGENT_CONFIG`, else defaults.
    /// 2. Environment overrides on top.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load(&path)?,
            None => {
                debug!("no config file given, using compiled-in defaults");
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply environment-style overrides. `lookup` returns the raw value of a
    /// variable, if set.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).map(|v| v.trim().to_string());

        override_string(&lookup, "HOST_LABEL", &mut self.host.label);
        override_path(&lookup, "DISK_VOLUME", &mut self.host.disk_volume);
        override_path(&lookup, "TEMP_DIR", &mut self.host.temp_dir);

        if let Some(url) = lookup("BACKEND_URL") {
            self.backend.url = if url.is_empty() { None } else { Some(url) };
        }
        override_string(&lookup, "BACKEND_HOST", &mut self.backend.host);
        override_parsed(&lookup, "BACKEND_PORT", &mut self.backend.port);

        override_parsed(&lookup, "CPU_THRESHOLD_PCT", &mut self.thresholds.cpu_pct);
        override_parsed(&lookup, "CPU_DURATION_SECONDS", &mut self.thresholds.cpu_duration_secs);
        override_parsed(&lookup, "DISK_THRESHOLD_PCT", &mut self.thresholds.disk_pct);

        override_flag(&lookup, "ALLOW_CLEAR_TEMP", &mut self.policy.allow_clear_temp);
        override_flag(&lookup, "ALLOW_RESTART_SERVICE", &mut self.policy.allow_restart_service);
        override_flag(&lookup, "ALLOW_BACKEND_SELF_HEAL", &mut self.policy.allow_backend_self_heal);

        if let Some(url) = lookup("KB_URL") {
            self.kb.url = if url.is_empty() { None } else { Some(url) };
        }
        override_path(&lookup, "KB_CACHE_DIR", &mut self.kb.cache_dir);
        override_string(&lookup, "KB_FILENAME", &mut self.kb.filename);
        override_flag(&lookup, "KB_REFRESH", &mut self.kb.refresh);

        if let Some(to) = lookup("TO_EMAIL") {
            self.notify.to = if to.is_empty() { None } else { Some(to) };
        }
        override_string(&lookup, "FROM_EMAIL", &mut self.notify.from);
        override_path(&lookup, "SENDMAIL_PATH", &mut self.notify.sendmail_path);

        if let Some(key) = lookup("GOOGLE_API_KEY") {
            self.summarizer.api_key = if key.is_empty() { None } else { Some(key) };
        }
        override_string(&lookup, "GEMINI_MODEL", &mut self.summarizer.model);

        self.thresholds.sanitize();
    }
}

fn override_string<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, slot: &mut String) {
    if let Some(v) = lookup(name).filter(|v| !v.is_empty()) {
        *slot = v;
    }
}

fn override_path<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, slot: &mut PathBuf) {
    if let Some(v) = lookup(name).filter(|v| !v.is_empty()) {
        *slot = PathBuf::from(v);
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name).filter(|v| !v.is_empty()) {
        match raw.parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!(variable = name, value = %raw, "ignoring unparsable override"),
        }
    }
}

fn override_flag<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, slot: &mut bool) {
    if let Some(raw) = lookup(name).filter(|v| !v.is_empty()) {
        match parse_flag(&raw) {
            Some(v) => *slot = v,
            None => warn!(variable = name, value = %raw, "ignoring unparsable flag"),
        }
    }
}

/// Accepts `1/true/yes/on` and `0/false/no/off`, case-insensitively.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// The monitored host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Label used in reports.
    pub label: String,
    /// Volume whose usage is checked for disk pressure.
    pub disk_volume: PathBuf,
    /// Directory swept by the clear-temp action.
    pub temp_dir: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        let disk_volume = if cfg!(windows) {
            PathBuf::from("C:\\")
        } else {
            PathBuf::from("/")
        };
        Self {
            label: "demo-host".to_string(),
            disk_volume,
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// The backend whose health endpoint is watched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL; the health check is skipped when unset.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Command launched when the backend is unreachable. Empty means "this
    /// binary's `demo-backend` subcommand".
    pub launch_command: Vec<String>,
    /// Wait between launching and re-probing.
    pub grace_secs: u64,
    /// Timeout for a single health probe.
    pub probe_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 8000,
            launch_command: Vec::new(),
            grace_secs: 2,
            probe_timeout_ms: 3000,
        }
    }
}

impl BackendConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Static detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub cpu_pct: f64,
    pub cpu_duration_secs: u64,
    pub disk_pct: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu_pct: 90.0,
            cpu_duration_secs: 3,
            disk_pct: 90.0,
        }
    }
}

impl ThresholdConfig {
    /// Reset any percentage that is not a finite value in `[0, 100]` to its
    /// default.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        sanitize_pct("cpu_pct", &mut self.cpu_pct, defaults.cpu_pct);
        sanitize_pct("disk_pct", &mut self.disk_pct, defaults.disk_pct);
    }
}

fn sanitize_pct(name: &str, slot: &mut f64, default: f64) {
    let value = *slot;
    if !(value.is_finite() && (0.0..=100.0).contains(&value)) {
        warn!(threshold = name, %value, default, "threshold out of range, using default");
        *slot = default;
    }
}

/// Which remediation actions the agent may run on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub allow_clear_temp: bool,
    pub allow_restart_service: bool,
    pub allow_backend_self_heal: bool,
}

/// Knowledge base source and cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KbConfig {
    pub url: Option<String>,
    pub cache_dir: PathBuf,
    pub filename: String,
    /// Re-download even when a cached copy exists.
    pub refresh: bool,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            url: None,
            cache_dir: PathBuf::from(".kb_cache"),
            filename: "CWE_Knowledge_Base.xlsx".to_string(),
            refresh: false,
        }
    }
}

/// Report delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Recipient; reports are only logged when unset.
    pub to: Option<String>,
    pub from: String,
    pub sendmail_path: PathBuf,
    pub subject_prefix: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            to: None,
            from: "sre-agent@localhost".to_string(),
            sendmail_path: PathBuf::from("/usr/sbin/sendmail"),
            subject_prefix: "[SRE-AI]".to_string(),
        }
    }
}

/// Optional generative summarizer for report drafting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub style: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 20,
            style: "concise".to_string(),
        }
    }
}
