use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaygateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WaygateError {
    /// Short error code string surfaced to transports.
    pub fn code(&self) -> &'static str {
        match self {
            WaygateError::Config(_) => "CONFIG_ERROR",
            WaygateError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WaygateError>;
