//! Sub-agent coordination primitives: heterogeneous tool-input parsing and a
//! multiplexed blocking wait over several independent agent signals.

pub mod error;
pub mod input;
pub mod wait;

pub use error::SubAgentError;
pub use input::{parse_directive, SubAgentDirective, WAIT_DEFAULT_MS, WAIT_MAX_MS};
pub use wait::{AgentSignals, WaitReport, IDLE_STATUS};
