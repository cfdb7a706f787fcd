use serde::Deserialize;

use crate::error::{StepError, StepResult};
use crate::types::UserId;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `STEPLINE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// NDJSON journal of appended events; in-memory only when unset.
    #[serde(default)]
    pub journal_path: Option<String>,
    #[serde(default = "default_journal_batch_size")]
    pub journal_batch_size: usize,
    #[serde(default = "default_journal_flush_interval_ms")]
    pub journal_flush_interval_ms: u64,
    #[serde(default = "default_journal_channel_capacity")]
    pub journal_channel_capacity: usize,
    /// JSON file holding the exclusion list and reporting offset.
    #[serde(default)]
    pub registry_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    /// Offset used when no persisted registry exists yet.
    #[serde(default = "default_offset")]
    pub default_offset: String,
    /// User ids excluded at first start.
    #[serde(default)]
    pub excluded_users: Vec<UserId>,
    /// Terminal steps applied when a session query names none.
    #[serde(default = "default_terminal_steps")]
    pub terminal_steps: Vec<String>,
}

// Default functions
fn default_node_id() -> String {
    "stepline-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_journal_batch_size() -> usize {
    1000
}
fn default_journal_flush_interval_ms() -> u64 {
    500
}
fn default_journal_channel_capacity() -> usize {
    100_000
}
fn default_offset() -> String {
    "+00:00".to_string()
}
fn default_terminal_steps() -> Vec<String> {
    vec!["completed".to_string()]
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            journal_batch_size: default_journal_batch_size(),
            journal_flush_interval_ms: default_journal_flush_interval_ms(),
            journal_channel_capacity: default_journal_channel_capacity(),
            registry_path: None,
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            default_offset: default_offset(),
            excluded_users: Vec::new(),
            terminal_steps: default_terminal_steps(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            store: StoreConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `stepline.toml` (if present) and environment
    /// variables.
    pub fn load() -> StepResult<Self> {
        Self::load_from("stepline.toml", false)
    }

    /// Load configuration from an explicit file path overlaid by environment
    /// variables. A missing file is an error only when `required` is set.
    pub fn load_from(path: &str, required: bool) -> StepResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix("STEPLINE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("reporting.excluded_users")
                    .with_list_parse_key("reporting.terminal_steps"),
            );

        builder
            .build()
            .and_then(|c| c.try_deserialize::<AppConfig>())
            .map_err(|e| StepError::Config(format!("{path}: {e}")))
    }
}
