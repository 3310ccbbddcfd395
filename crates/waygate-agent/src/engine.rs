use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use waygate_core::types::RuntimeMessage;
use waygate_subagent::SubAgentDirective;

use crate::error::AgentError;
use crate::events::ProcessEvent;
use crate::provider::GenerateConfig;

/// Everything the external execution engine needs for one turn.
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub prompt_mode: String,
    pub streaming: bool,
    pub reply_chunk_size: usize,
    /// An explicitly requested tool call, already parsed and validated.
    pub tool_call: Option<SubAgentDirective>,
    /// Model invocation parameters. `None` when a tool call bypasses
    /// generation.
    pub generate: Option<GenerateConfig>,
    /// Compiled system layers followed by the full history (preferred) or
    /// the raw request input.
    pub effective_input: Vec<RuntimeMessage>,
}

/// What the execution engine hands back for one turn.
#[derive(Debug, Clone)]
pub struct EngineResult {
    pub reply: String,
    pub events: Vec<ProcessEvent>,
    pub provider_response_id: Option<String>,
}

/// The component that actually calls a model and runs tools. External to
/// this core; the pipeline only holds the contract.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn process(
        &self,
        cancel: &CancellationToken,
        call: EngineCall,
        emit: &(dyn Fn(ProcessEvent) + Send + Sync),
    ) -> Result<EngineResult, AgentError>;
}
