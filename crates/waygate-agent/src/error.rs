use thiserror::Error;

use waygate_channels::ChannelError;
use waygate_prompt::PromptError;
use waygate_store::StoreError;
use waygate_subagent::SubAgentError;

/// Turn-level error taxonomy. `code()` is the stable string surfaced to
/// transports and logs.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("channel not found: {name}")]
    ChannelNotFound { name: String },

    #[error("channel misconfigured ({channel}): {reason}")]
    ChannelMisconfigured { channel: String, reason: String },

    #[error("channel dispatch failed ({channel}): {reason}")]
    ChannelDispatchFailed { channel: String, reason: String },

    #[error("provider disabled: {provider}")]
    ProviderDisabled { provider: String },

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("invalid tool input: {0}")]
    ToolInput(#[from] SubAgentError),

    #[error("system prompt unavailable for mode {mode}: {source}")]
    PromptUnavailable {
        mode: String,
        #[source]
        source: PromptError,
    },

    #[error("execution engine failed: {0}")]
    Engine(String),

    #[error("turn cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::InvalidRequest(_) => "invalid_request",
            AgentError::Store(_) => "store_error",
            AgentError::ChannelNotFound { .. } => "channel_not_found",
            AgentError::ChannelMisconfigured { .. } => "channel_misconfigured",
            AgentError::ChannelDispatchFailed { .. } => "channel_dispatch_failed",
            AgentError::ProviderDisabled { .. } => "provider_disabled",
            AgentError::ModelNotFound { .. } => "model_not_found",
            // Parser failures keep their own granular codes
            // (multi_agent_input_conflict etc.).
            AgentError::ToolInput(e) => e.code(),
            AgentError::PromptUnavailable { .. } => "prompt_unavailable",
            AgentError::Engine(_) => "engine_failed",
            AgentError::Cancelled => "cancelled",
        }
    }
}

impl From<ChannelError> for AgentError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NotFound { name } => AgentError::ChannelNotFound { name },
            ChannelError::Misconfigured { channel, reason } => {
                AgentError::ChannelMisconfigured { channel, reason }
            }
            ChannelError::Dispatch { channel, reason } => {
                AgentError::ChannelDispatchFailed { channel, reason }
            }
        }
    }
}
