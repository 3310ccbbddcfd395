use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubAgentError {
    #[error("target agent id is required")]
    IdRequired,

    #[error("invalid ids value: {0}")]
    IdsInvalid(String),

    #[error("invalid items value: {0}")]
    ItemsInvalid(String),

    #[error("both free-text input and renderable items were provided")]
    InputConflict,

    #[error("wait cancelled by caller")]
    Cancelled,
}

impl SubAgentError {
    /// Short error code string surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            SubAgentError::IdRequired => "multi_agent_id_required",
            SubAgentError::IdsInvalid(_) => "multi_agent_ids_invalid",
            SubAgentError::ItemsInvalid(_) => "multi_agent_items_invalid",
            SubAgentError::InputConflict => "multi_agent_input_conflict",
            SubAgentError::Cancelled => "cancelled",
        }
    }
}
