use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Per-channel dispatch settings, carried alongside the adapter when a
/// channel is resolved. The bag is open: adapters read the keys they need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum reply chunk size for adapters that split long messages.
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

/// Common interface implemented by every dispatch target (console, QQ, …).
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// [`ChannelRegistry`](crate::registry::ChannelRegistry) and driven from
/// multiple Tokio tasks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"console"`).
    fn name(&self) -> &str;

    /// Deliver reply text to the given user/session on this channel.
    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        config: &DispatchConfig,
    ) -> Result<(), ChannelError>;

    /// Validate the dispatch config this channel was registered with.
    /// Called during resolution; the default accepts anything.
    fn validate_config(&self, _config: &DispatchConfig) -> Result<(), ChannelError> {
        Ok(())
    }
}
