//! Runtime configuration: env-beats-file-beats-default precedence, mirroring
//! the teacher's `load_settings_with_options` but scoped to a single
//! deployment (no DB-synced cross-device config merge).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Vision-LLM provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
}

impl Default for LlmProvider {
    fn default() -> Self {
        LlmProvider::OpenAi
    }
}

/// Vision-LLM client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pages_per_batch")]
    pub pages_per_batch: usize,
    /// A field scoring below this confidence (or model-flagged) is marked
    /// `needs_manual_review` (§4.E step 11).
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    /// USD per 1k prompt tokens, used to derive `Document.cost`. Zero by
    /// default: no pricing table ships with this crate, so cost is `0.0`
    /// (not `None`) until an operator configures real per-model prices.
    #[serde(default)]
    pub input_cost_per_1k_tokens: f64,
    /// USD per 1k completion tokens, the output-side counterpart to
    /// `input_cost_per_1k_tokens`.
    #[serde(default)]
    pub output_cost_per_1k_tokens: f64,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_pages_per_batch() -> usize {
    5
}
fn default_review_threshold() -> f64 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            pages_per_batch: default_pages_per_batch(),
            review_threshold: default_review_threshold(),
            input_cost_per_1k_tokens: 0.0,
            output_cost_per_1k_tokens: 0.0,
        }
    }
}

/// Broker tuning knobs (component H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_dequeue_interval_ms")]
    pub dequeue_interval_ms: u64,
    /// Default `max_retries` stamped onto a `Document` at discovery time
    /// (§4.G's retry budget), absent any per-job override.
    #[serde(default = "default_document_max_retries")]
    pub document_max_retries: i32,
    /// How long a document may sit `processing` with no heartbeat before the
    /// reconciler considers it stalled and reverts it to `queued` (§4.G).
    #[serde(default = "default_stall_threshold_secs")]
    pub stall_threshold_secs: i64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_backoff_secs() -> u64 {
    2
}
fn default_max_backoff_secs() -> u64 {
    300
}
fn default_heartbeat_timeout_secs() -> u64 {
    60
}
fn default_concurrency() -> usize {
    4
}
fn default_dequeue_interval_ms() -> u64 {
    1000
}
fn default_document_max_retries() -> i32 {
    3
}
fn default_stall_threshold_secs() -> i64 {
    600
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            concurrency: default_concurrency(),
            dequeue_interval_ms: default_dequeue_interval_ms(),
            document_max_retries: default_document_max_retries(),
            stall_threshold_secs: default_stall_threshold_secs(),
        }
    }
}

/// Application settings, assembled from `.env` + process environment + an
/// optional TOML file. Environment variables take precedence over the file,
/// which takes precedence over these defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub storage_root: PathBuf,
    pub event_bus_url: Option<String>,
    pub bind_addr: String,
    pub llm: LlmConfig,
    pub broker: BrokerConfig,
    pub rasterizer_dpi: u32,
    pub rasterizer_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            storage_root: PathBuf::from("./data/objects"),
            event_bus_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            llm: LlmConfig::default(),
            broker: BrokerConfig::default(),
            rasterizer_dpi: 200,
            rasterizer_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// On-disk configuration file shape. Every field optional; present values
/// override `Settings::default()` but are in turn overridden by env vars.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub database_url: Option<String>,
    pub storage_root: Option<PathBuf>,
    pub event_bus_url: Option<String>,
    pub bind_addr: Option<String>,
    pub llm: Option<LlmConfig>,
    pub broker: Option<BrokerConfig>,
    pub rasterizer_dpi: Option<u32>,
    pub rasterizer_workers: Option<usize>,
}

impl FileConfig {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.database_url {
            settings.database_url = v;
        }
        if let Some(v) = self.storage_root {
            settings.storage_root = v;
        }
        if let Some(v) = self.event_bus_url {
            settings.event_bus_url = Some(v);
        }
        if let Some(v) = self.bind_addr {
            settings.bind_addr = v;
        }
        if let Some(v) = self.llm {
            settings.llm = v;
        }
        if let Some(v) = self.broker {
            settings.broker = v;
        }
        if let Some(v) = self.rasterizer_dpi {
            settings.rasterizer_dpi = v;
        }
        if let Some(v) = self.rasterizer_workers {
            settings.rasterizer_workers = v;
        }
    }
}

/// Load settings: defaults, then an optional TOML file, then environment
/// variables (highest precedence). `.env` is loaded into the process
/// environment first via `dotenvy`, so `BULKEXTRACT_*` vars set there count
/// as environment for this function's purposes.
pub fn load_settings(config_path: Option<&PathBuf>) -> Settings {
    let _ = dotenvy::dotenv();

    let mut settings = Settings::default();

    let path = config_path.cloned().or_else(|| {
        let candidate = PathBuf::from("bulkextract.toml");
        candidate.exists().then_some(candidate)
    });

    if let Some(path) = path {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match toml::from_str::<FileConfig>(&contents) {
                Ok(file_config) => file_config.apply(&mut settings),
                Err(e) => tracing::warn!("failed to parse config file {}: {}", path.display(), e),
            }
        }
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("STORAGE_ROOT") {
        settings.storage_root = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("EVENT_BUS_URL") {
        settings.event_bus_url = Some(v);
    }
    if let Ok(v) = std::env::var("BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Ok(v) = std::env::var("LLM_API_KEY") {
        settings.llm.api_key = Some(v);
    }
    if let Ok(v) = std::env::var("LLM_ENDPOINT") {
        settings.llm.endpoint = v;
    }
    if let Ok(v) = std::env::var("LLM_MODEL") {
        settings.llm.model = v;
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.llm.pages_per_batch, 5);
        assert!(settings.rasterizer_workers >= 1);
    }

    #[test]
    fn file_config_overrides_defaults_but_not_env() {
        let mut settings = Settings::default();
        let file = FileConfig {
            bind_addr: Some("127.0.0.1:9000".to_string()),
            ..Default::default()
        };
        file.apply(&mut settings);
        assert_eq!(settings.bind_addr, "127.0.0.1:9000");
    }
}
