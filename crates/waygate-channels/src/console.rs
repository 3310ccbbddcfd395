use async_trait::async_trait;
use tracing::info;

use crate::channel::{Channel, DispatchConfig};
use crate::error::ChannelError;

/// Console dispatch target: replies are written to the process log. Used by
/// headless (cron-initiated) turns and local development.
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        _config: &DispatchConfig,
    ) -> Result<(), ChannelError> {
        info!(
            target: "waygate::console",
            user = user_id,
            session = session_id,
            "{text}"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_send_never_fails() {
        let channel = ConsoleChannel::new();
        let result = channel
            .send_text("u1", "s1", "hello", &DispatchConfig::default())
            .await;
        assert!(result.is_ok());
    }
}
