//! Shared types, error taxonomy, and configuration for the Waygate
//! agent-gateway core.

pub mod config;
pub mod error;
pub mod types;

pub use config::WaygateConfig;
pub use error::{Result, WaygateError};
