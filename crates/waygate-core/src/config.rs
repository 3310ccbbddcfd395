use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prompt mode used when neither the request nor the chat metadata names one.
pub const DEFAULT_PROMPT_MODE: &str = "default";

/// Default reply chunk size handed to the execution engine.
pub const DEFAULT_REPLY_CHUNK_SIZE: usize = 2048;

/// Default per-provider request timeout.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 120_000;

/// Top-level config (waygate.toml + WAYGATE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaygateConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    /// Configured model providers, looked up by id during turn processing.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl Default for WaygateConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Baseline prompt mode for chats with no recorded override.
    #[serde(default = "default_mode")]
    pub default_mode: String,
    /// Directory holding instruction layer files (`<source>.md`).
    pub instructions_dir: Option<String>,
    /// Active provider id. `None` means no provider configured — the
    /// pipeline falls back to the demo provider.
    pub provider: Option<String>,
    /// Default model slot for new chats.
    pub model: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub reply_chunk_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            instructions_dir: None,
            provider: None,
            model: None,
            reply_chunk_size: default_chunk_size(),
        }
    }
}

/// A single configured model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Provider identifier (e.g. "openai", "anthropic").
    pub id: String,
    /// Disabled providers are configured but must not be used.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Base URL without trailing slash.
    pub base_url: Option<String>,
    /// Wire adapter id (e.g. "openai-responses"). Defaults to the provider id.
    pub adapter: Option<String>,
    pub default_model: Option<String>,
    /// Friendly-alias → canonical model id.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub reasoning_effort: Option<String>,
    /// Whether generated responses should be persisted provider-side.
    #[serde(default = "bool_true")]
    pub store: bool,
}

impl WaygateConfig {
    /// Load config from a TOML file with WAYGATE_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: WaygateConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WAYGATE_").split("_"))
            .extract()
            .map_err(|e| crate::error::WaygateError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Look up a configured provider by its id.
    pub fn provider(&self, id: &str) -> Option<&ProviderEntry> {
        self.providers.iter().find(|p| p.id == id)
    }
}

fn default_mode() -> String {
    DEFAULT_PROMPT_MODE.to_string()
}
fn default_chunk_size() -> usize {
    DEFAULT_REPLY_CHUNK_SIZE
}
fn default_timeout_ms() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_MS
}
fn bool_true() -> bool {
    true
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.waygate/waygate.toml", home)
}
