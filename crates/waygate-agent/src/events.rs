use serde::{Deserialize, Serialize};

/// Event kinds in the generated event stream, in the order a plain turn
/// emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StepStarted,
    AssistantDelta,
    Completed,
}

/// One event in a turn's ordered event list. Every emitted event carries a
/// step number; `completed` additionally carries the full reply text. The
/// pipeline stamps `meta` with compiled-prompt and generation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub kind: EventKind,
    pub step: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl ProcessEvent {
    pub fn step_started(step: u32) -> Self {
        Self {
            kind: EventKind::StepStarted,
            step,
            text: None,
            meta: serde_json::Map::new(),
        }
    }

    pub fn assistant_delta(step: u32, text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::AssistantDelta,
            step,
            text: Some(text.into()),
            meta: serde_json::Map::new(),
        }
    }

    pub fn completed(step: u32, reply: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Completed,
            step,
            text: Some(reply.into()),
            meta: serde_json::Map::new(),
        }
    }
}
