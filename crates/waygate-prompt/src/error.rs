use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unknown prompt mode: {0}")]
    UnknownMode(String),

    #[error("required layer missing: {name} (source {source_name})")]
    RequiredLayerMissing { name: String, source_name: String },
}
