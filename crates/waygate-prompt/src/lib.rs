//! System Prompt Compiler — deterministic, hashable layering of instruction
//! text based on a normalized turn runtime snapshot.
//!
//! Compilation is a pure function of the snapshot and the layer sources:
//! identical inputs always yield identical per-layer hashes and an identical
//! aggregate hash, so callers can cache or audit compiled prompts by hash
//! alone.

pub mod compile;
pub mod error;
pub mod layers;
pub mod snapshot;
pub mod source;

pub use compile::{compile, CompiledSystemPrompt, HashedLayer, COMPILER_VERSION};
pub use error::PromptError;
pub use layers::PromptLayer;
pub use snapshot::{NormalizedSnapshot, TurnRuntimeSnapshot, MODE_CODEX, MODE_DEFAULT};
pub use source::{FsLayerSource, LayerSource, MapLayerSource};
