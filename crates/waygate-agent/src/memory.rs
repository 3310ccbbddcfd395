use async_trait::async_trait;
use tracing::debug;

use waygate_core::types::RuntimeMessage;

/// Destination for memory rollouts. The pipeline launches rollout storage
/// as a detached background task; failures are logged, never surfaced.
#[async_trait]
pub trait MemorySink: Send + Sync {
    async fn store_rollout(&self, chat_id: &str, rollout: String) -> Result<(), String>;
}

/// Discards rollouts. The default when no memory backend is wired up.
pub struct NullMemorySink;

#[async_trait]
impl MemorySink for NullMemorySink {
    async fn store_rollout(&self, chat_id: &str, rollout: String) -> Result<(), String> {
        debug!(chat = chat_id, bytes = rollout.len(), "discarding memory rollout");
        Ok(())
    }
}

/// Serialize a chat's full history as a memory rollout.
pub fn serialize_rollout(chat_id: &str, history: &[RuntimeMessage]) -> String {
    serde_json::json!({
        "chat_id": chat_id,
        "messages": history,
    })
    .to_string()
}
