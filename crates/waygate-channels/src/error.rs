use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel not found: {name}")]
    NotFound { name: String },

    #[error("channel misconfigured ({channel}): {reason}")]
    Misconfigured { channel: String, reason: String },

    #[error("dispatch failed ({channel}): {reason}")]
    Dispatch { channel: String, reason: String },
}
