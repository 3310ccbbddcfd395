use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use waygate_core::config::{ProviderEntry, WaygateConfig, DEFAULT_PROVIDER_TIMEOUT_MS};
use waygate_core::types::RuntimeMessage;

use crate::error::AgentError;

/// Fallback used when no model is configured for the chat: turns still work
/// against a canned local provider.
pub const DEMO_PROVIDER_ID: &str = "demo";
pub const DEMO_MODEL: &str = "demo-chat";

/// Message metadata key where the provider's response id is recorded.
pub const META_PROVIDER_RESPONSE_ID: &str = "provider_response_id";

/// Model invocation parameters, built once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    pub provider_id: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub adapter: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
    pub reasoning_effort: Option<String>,
    /// Whether generated responses should be persisted provider-side.
    pub store: bool,
    /// Provider-side cache key — the session id.
    pub cache_key: String,
    /// Most recent provider response id found in history, for providers
    /// that chain responses.
    pub previous_response_id: Option<String>,
}

/// Resolves provider settings by id. Consumed, not reimplemented, by the
/// pipeline.
pub trait ProviderLookup: Send + Sync {
    fn settings(&self, provider_id: &str) -> Option<ProviderEntry>;
}

impl ProviderLookup for WaygateConfig {
    fn settings(&self, provider_id: &str) -> Option<ProviderEntry> {
        self.provider(provider_id).cloned()
    }
}

/// Fixed provider table, handy for tests and embedded setups.
pub struct StaticProviders {
    entries: Vec<ProviderEntry>,
}

impl StaticProviders {
    pub fn new(entries: Vec<ProviderEntry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl ProviderLookup for StaticProviders {
    fn settings(&self, provider_id: &str) -> Option<ProviderEntry> {
        self.entries.iter().find(|p| p.id == provider_id).cloned()
    }
}

/// Build the turn's generation config.
///
/// No configured model at all falls back to the fixed demo provider/model.
/// Otherwise the provider must be enabled and the requested model must
/// resolve through the provider's alias rules.
pub fn resolve_generate_config(
    entry: Option<&ProviderEntry>,
    model_slot: Option<&str>,
    session_id: &str,
    history: &[RuntimeMessage],
) -> Result<GenerateConfig, AgentError> {
    let previous_response_id = last_provider_response_id(history);

    let Some(entry) = entry else {
        return Ok(demo_config(session_id, previous_response_id));
    };
    let requested = model_slot
        .filter(|m| !m.trim().is_empty())
        .or(entry.default_model.as_deref());
    let Some(requested) = requested else {
        return Ok(demo_config(session_id, previous_response_id));
    };

    if !entry.enabled {
        return Err(AgentError::ProviderDisabled {
            provider: entry.id.clone(),
        });
    }

    let model = resolve_model_alias(entry, requested).ok_or_else(|| AgentError::ModelNotFound {
        model: requested.to_string(),
    })?;

    Ok(GenerateConfig {
        provider_id: entry.id.clone(),
        model,
        api_key: entry.api_key.clone(),
        base_url: entry.base_url.clone(),
        adapter: entry.adapter.clone().unwrap_or_else(|| entry.id.clone()),
        headers: entry.headers.clone(),
        timeout_ms: entry.timeout_ms,
        reasoning_effort: entry.reasoning_effort.clone(),
        store: entry.store,
        cache_key: session_id.to_string(),
        previous_response_id,
    })
}

/// Resolve a model alias or a canonical model id against a provider entry.
/// Accepts the alias key, any alias target, and the provider's default.
fn resolve_model_alias(entry: &ProviderEntry, requested: &str) -> Option<String> {
    let lower = requested.trim().to_lowercase();
    if let Some(full) = entry.aliases.get(&lower) {
        return Some(full.clone());
    }
    if entry.aliases.values().any(|full| *full == lower) {
        return Some(lower);
    }
    if entry.default_model.as_deref() == Some(lower.as_str()) {
        return Some(lower);
    }
    None
}

fn demo_config(session_id: &str, previous_response_id: Option<String>) -> GenerateConfig {
    GenerateConfig {
        provider_id: DEMO_PROVIDER_ID.to_string(),
        model: DEMO_MODEL.to_string(),
        api_key: None,
        base_url: None,
        adapter: DEMO_PROVIDER_ID.to_string(),
        headers: HashMap::new(),
        timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
        reasoning_effort: None,
        store: false,
        cache_key: session_id.to_string(),
        previous_response_id,
    }
}

/// Most recent provider response id recorded anywhere in history.
fn last_provider_response_id(history: &[RuntimeMessage]) -> Option<String> {
    history.iter().rev().find_map(|m| {
        m.meta
            .get(META_PROVIDER_RESPONSE_ID)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    })
}
