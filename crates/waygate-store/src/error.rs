use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chat not found: {id}")]
    ChatNotFound { id: String },

    #[error("duplicate message id {message_id} in chat {chat_id}")]
    DuplicateMessage {
        chat_id: String,
        message_id: String,
    },

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
