use serde::{Deserialize, Serialize};

use crate::error::PromptError;

/// Baseline prompt mode: a single external layer stands in for the whole
/// mode-specific pipeline.
pub const MODE_DEFAULT: &str = "default";
/// Extended prompt mode: the full fixed-precedence layer pipeline.
pub const MODE_CODEX: &str = "codex";

/// The set of prompt modes the compiler understands.
pub const KNOWN_MODES: &[&str] = &[MODE_DEFAULT, MODE_CODEX];

const DEFAULT_APPROVAL_POLICY: &str = "on-request";
const DEFAULT_SANDBOX_POLICY: &str = "workspace-write";

/// The turn's mode context, as supplied by the caller. Constructed per turn
/// and normalized before compilation; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRuntimeSnapshot {
    pub prompt_mode: String,
    pub collaboration_mode: String,
    pub collaboration_event: String,
    pub review_task: bool,
    pub compact_task: bool,
    pub memory_task: bool,
    pub approval_policy: String,
    pub sandbox_policy: String,
    pub available_tools: Vec<String>,
    pub dynamic_tools: Vec<String>,
    pub mcp_enabled: bool,
    /// MCP status label; derived from `mcp_enabled` when unset.
    pub mcp_status: Option<String>,
    pub session_id: String,
    pub model: String,
    pub personality: String,
}

/// The canonical form the compiler actually works from. Field order matters:
/// the aggregate hash covers the serialized struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedSnapshot {
    pub prompt_mode: String,
    pub collaboration_mode: String,
    pub collaboration_event: String,
    pub review_task: bool,
    pub compact_task: bool,
    pub memory_task: bool,
    pub approval_policy: String,
    pub sandbox_policy: String,
    pub available_tools: Vec<String>,
    pub dynamic_tools: Vec<String>,
    pub mcp_enabled: bool,
    pub mcp_status: String,
    pub session_id: String,
    pub model: String,
    pub personality: String,
}

impl TurnRuntimeSnapshot {
    /// Canonicalize the snapshot. Fails only for an unrecognized prompt mode.
    pub fn normalize(&self) -> Result<NormalizedSnapshot, PromptError> {
        let mode = self.prompt_mode.trim().to_lowercase();
        if !KNOWN_MODES.contains(&mode.as_str()) {
            return Err(PromptError::UnknownMode(self.prompt_mode.clone()));
        }

        let approval = match self.approval_policy.trim() {
            "" => DEFAULT_APPROVAL_POLICY.to_string(),
            other => other.to_lowercase(),
        };
        let sandbox = match self.sandbox_policy.trim() {
            "" => DEFAULT_SANDBOX_POLICY.to_string(),
            other => other.to_lowercase(),
        };

        let mcp_status = match &self.mcp_status {
            Some(s) if !s.trim().is_empty() => s.trim().to_lowercase(),
            _ if self.mcp_enabled => "enabled".to_string(),
            _ => "disabled".to_string(),
        };

        Ok(NormalizedSnapshot {
            prompt_mode: mode,
            collaboration_mode: self.collaboration_mode.trim().to_lowercase(),
            collaboration_event: self.collaboration_event.trim().to_lowercase(),
            review_task: self.review_task,
            compact_task: self.compact_task,
            memory_task: self.memory_task,
            approval_policy: approval,
            sandbox_policy: sandbox,
            available_tools: canonical_tools(&self.available_tools),
            dynamic_tools: canonical_tools(&self.dynamic_tools),
            mcp_enabled: self.mcp_enabled,
            mcp_status,
            session_id: self.session_id.trim().to_string(),
            model: self.model.trim().to_lowercase(),
            personality: self.personality.trim().to_string(),
        })
    }
}

/// Lowercase, trim, drop empties, dedup preserving first-occurrence order.
fn canonical_tools(tools: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tools.len());
    for tool in tools {
        let t = tool.trim().to_lowercase();
        if t.is_empty() || out.contains(&t) {
            continue;
        }
        out.push(t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(mode: &str) -> TurnRuntimeSnapshot {
        TurnRuntimeSnapshot {
            prompt_mode: mode.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = snap("turbo").normalize().unwrap_err();
        assert!(matches!(err, PromptError::UnknownMode(m) if m == "turbo"));
    }

    #[test]
    fn mode_is_case_and_whitespace_insensitive() {
        let n = snap("  Codex ").normalize().unwrap();
        assert_eq!(n.prompt_mode, MODE_CODEX);
    }

    #[test]
    fn blank_policies_get_defaults() {
        let n = snap("default").normalize().unwrap();
        assert_eq!(n.approval_policy, DEFAULT_APPROVAL_POLICY);
        assert_eq!(n.sandbox_policy, DEFAULT_SANDBOX_POLICY);
    }

    #[test]
    fn tool_lists_are_canonicalized() {
        let mut s = snap("default");
        s.available_tools = vec![
            " Shell ".into(),
            "shell".into(),
            "".into(),
            "web_search".into(),
        ];
        let n = s.normalize().unwrap();
        assert_eq!(n.available_tools, vec!["shell", "web_search"]);
    }

    #[test]
    fn mcp_status_derived_from_flag_when_unset() {
        let mut s = snap("default");
        s.mcp_enabled = true;
        assert_eq!(s.normalize().unwrap().mcp_status, "enabled");
        s.mcp_enabled = false;
        assert_eq!(s.normalize().unwrap().mcp_status, "disabled");
        s.mcp_status = Some("Degraded".into());
        assert_eq!(s.normalize().unwrap().mcp_status, "degraded");
    }
}
