//! Turn Processing Pipeline — the orchestrator that turns an inbound
//! conversational request into a compiled prompt, a resolved model
//! configuration, a persisted conversation record, and a dispatched reply.

pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod pipeline;
pub mod provider;
pub mod triggers;

pub use engine::{EngineCall, EngineResult, ExecutionEngine};
pub use error::AgentError;
pub use events::{EventKind, ProcessEvent};
pub use memory::{MemorySink, NullMemorySink};
pub use pipeline::{
    InputMessage, ProcessRequest, ProcessResponse, RuntimeContext, TurnPipeline, BIZ_CRON_META,
    BIZ_RUNTIME, BIZ_TOOL_CALL,
};
pub use provider::{GenerateConfig, ProviderLookup, StaticProviders};
pub use triggers::{SlashRecognizer, TaskTriggers, TriggerRecognizer};
