use serde::{Deserialize, Serialize};

use crate::snapshot::NormalizedSnapshot;

/// One named, sourced fragment of system instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptLayer {
    pub name: String,
    pub role: String,
    /// Origin identifier (layer source path, or `synthetic` for generated
    /// layers).
    pub source: String,
    pub content: String,
}

impl PromptLayer {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            source: source.into(),
            content: content.into(),
        }
    }
}

/// One stage of the extended-mode layer pipeline: a pure gate over the
/// normalized snapshot plus an ordered source fallback list (first available
/// source wins).
pub(crate) struct LayerStage {
    pub name: &'static str,
    pub role: &'static str,
    /// A required stage with no loadable source fails the whole compilation.
    pub required: bool,
    pub gate: fn(&NormalizedSnapshot) -> bool,
    pub sources: fn(&NormalizedSnapshot) -> Vec<String>,
}

fn always(_: &NormalizedSnapshot) -> bool {
    true
}

/// Fixed precedence for the extended ("codex") mode. Order is the contract:
/// compiled layers appear exactly in this sequence.
pub(crate) const CODEX_STAGES: &[LayerStage] = &[
    LayerStage {
        name: "base",
        role: "system",
        required: true,
        gate: always,
        sources: |_| vec!["base".to_string()],
    },
    LayerStage {
        name: "orchestrator",
        role: "system",
        required: false,
        gate: always,
        sources: |_| vec!["orchestrator".to_string()],
    },
    LayerStage {
        name: "model",
        role: "system",
        required: false,
        gate: |s| !s.model.is_empty(),
        sources: |s| vec![format!("models/{}", s.model)],
    },
    LayerStage {
        name: "review_task",
        role: "system",
        required: false,
        gate: |s| s.review_task,
        sources: |_| vec!["tasks/review".to_string()],
    },
    LayerStage {
        name: "review_history",
        role: "system",
        required: false,
        gate: |s| s.review_task && !s.collaboration_event.is_empty(),
        sources: |_| vec!["tasks/review_history".to_string()],
    },
    LayerStage {
        name: "collaboration",
        role: "system",
        required: false,
        gate: |s| !s.collaboration_mode.is_empty(),
        sources: |s| vec![format!("collab/{}", s.collaboration_mode)],
    },
    LayerStage {
        name: "compact_task",
        role: "system",
        required: false,
        gate: |s| s.compact_task,
        sources: |_| vec!["tasks/compact".to_string()],
    },
    LayerStage {
        name: "memory_task",
        role: "system",
        required: false,
        gate: |s| s.memory_task,
        sources: |_| vec!["tasks/memory".to_string()],
    },
    LayerStage {
        name: "collab_experimental",
        role: "system",
        required: false,
        gate: always,
        sources: |_| vec!["collab/experimental".to_string()],
    },
    LayerStage {
        name: "search_tool",
        role: "system",
        required: false,
        gate: |s| {
            s.available_tools
                .iter()
                .any(|t| t == "web_search" || t == "search")
        },
        sources: |_| vec!["tools/search".to_string()],
    },
    LayerStage {
        name: "local_policy",
        role: "system",
        required: false,
        gate: always,
        sources: |_| vec!["policy/local".to_string()],
    },
    LayerStage {
        name: "tool_guide",
        role: "system",
        required: false,
        gate: always,
        sources: |_| {
            vec![
                "tools/guide".to_string(),
                "tools/guide_legacy".to_string(),
                "tools/usage".to_string(),
            ]
        },
    },
];
