//! Task-trigger recognition — intercepted before prompt compilation.
//!
//! The exact command grammar is a collaborator concern: the pipeline only
//! sees boolean predicates. [`SlashRecognizer`] is the built-in recognizer
//! for slash-style commands.

/// Which task commands the input triggered. Only meaningful when the
/// effective prompt mode is the extended mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTriggers {
    pub review: bool,
    pub compact: bool,
    pub memory: bool,
    pub plan: bool,
    pub execute: bool,
    pub pair: bool,
}

impl TaskTriggers {
    /// The collaboration mode selected by the triggered command, if any.
    pub fn collaboration_mode(&self) -> &'static str {
        if self.plan {
            "plan"
        } else if self.execute {
            "execute"
        } else if self.pair {
            "pair-programming"
        } else {
            ""
        }
    }
}

/// Opaque predicates over the input text. Implementations decide the
/// grammar; the pipeline only consumes the booleans.
pub trait TriggerRecognizer: Send + Sync {
    /// Whether the input is a context-reset command.
    fn is_context_reset(&self, text: &str) -> bool;

    /// Which task commands (if any) the input triggers.
    fn triggers(&self, text: &str) -> TaskTriggers;
}

/// Built-in recognizer for slash-style commands: `/reset` (or `/new`) plus
/// the task commands `/review`, `/compact`, `/memory`, `/plan`, `/execute`,
/// `/pair`.
pub struct SlashRecognizer;

impl SlashRecognizer {
    fn first_token(text: &str) -> &str {
        text.trim().split_whitespace().next().unwrap_or("")
    }
}

impl TriggerRecognizer for SlashRecognizer {
    fn is_context_reset(&self, text: &str) -> bool {
        let token = Self::first_token(text);
        token.eq_ignore_ascii_case("/reset") || token.eq_ignore_ascii_case("/new")
    }

    fn triggers(&self, text: &str) -> TaskTriggers {
        let token = Self::first_token(text).to_lowercase();
        TaskTriggers {
            review: token == "/review",
            compact: token == "/compact",
            memory: token == "/memory",
            plan: token == "/plan",
            execute: token == "/execute",
            pair: token == "/pair",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_matches_reset_and_new() {
        let r = SlashRecognizer;
        assert!(r.is_context_reset("/reset"));
        assert!(r.is_context_reset("  /NEW  "));
        assert!(!r.is_context_reset("please /reset later"));
        assert!(!r.is_context_reset("hello"));
    }

    #[test]
    fn task_commands_set_one_flag() {
        let r = SlashRecognizer;
        assert!(r.triggers("/review the diff").review);
        assert!(r.triggers("/plan a refactor").plan);
        assert_eq!(r.triggers("just chatting"), TaskTriggers::default());
    }

    #[test]
    fn collaboration_mode_follows_trigger() {
        let plan = TaskTriggers {
            plan: true,
            ..Default::default()
        };
        assert_eq!(plan.collaboration_mode(), "plan");
        assert_eq!(TaskTriggers::default().collaboration_mode(), "");
    }
}
