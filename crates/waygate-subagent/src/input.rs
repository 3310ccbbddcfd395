//! Normalizes heterogeneous tool-call payloads into a typed directive.
//!
//! Payloads arrive in two shapes: a wrapped single-item form (an `items`
//! array whose first element carries sub-agent directive fields) and a flat
//! map. The wrapped form takes priority; every field lookup scans the
//! candidates in that order and returns the first non-empty hit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SubAgentError;

/// Wait timeout applied when the payload names none, or names one that is
/// zero, negative, or above [`WAIT_MAX_MS`].
pub const WAIT_DEFAULT_MS: u64 = 30_000;
/// Ceiling on caller-supplied wait timeouts.
pub const WAIT_MAX_MS: u64 = 600_000;

/// Field names that mark an `items` first element as a wrapped sub-agent
/// directive rather than a multi-modal content block.
const WRAP_FIELDS: &[&str] = &[
    "id",
    "ids",
    "agent_id",
    "message",
    "input",
    "prompt",
    "task",
    "timeout_ms",
    "timeout",
    "yield_time_ms",
    "interrupt",
];

/// Free-text fields, checked before a renderable `items` list.
const TEXT_FIELDS: &[&str] = &["message", "input", "prompt"];

/// Numeric wait-timeout fields, in lookup order.
const TIMEOUT_FIELDS: &[&str] = &["timeout_ms", "timeout", "yield_time_ms"];

/// A parsed and validated sub-agent tool directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentDirective {
    /// Target agent id(s), deduplicated, order-preserving.
    pub ids: Vec<String>,
    /// Free-text turn input. May be empty.
    pub text: String,
    pub wait_timeout_ms: u64,
    pub interrupt: bool,
}

/// Parse a caller-opaque tool-input value into a [`SubAgentDirective`].
///
/// `allow_task` additionally accepts a `task` field as free-text input.
pub fn parse_directive(
    input: &Value,
    allow_task: bool,
) -> Result<SubAgentDirective, SubAgentError> {
    let candidates = candidates(input);
    if candidates.is_empty() {
        return Err(SubAgentError::IdRequired);
    }

    let ids = resolve_ids(&candidates)?;
    let text = resolve_text(&candidates, allow_task)?;
    let wait_timeout_ms = resolve_timeout(&candidates);
    let interrupt = resolve_interrupt(&candidates);

    Ok(SubAgentDirective {
        ids,
        text,
        wait_timeout_ms,
        interrupt,
    })
}

/// Candidate maps in search order: the wrapped first item (when recognized),
/// then the flat map itself.
fn candidates(input: &Value) -> Vec<&Map<String, Value>> {
    let mut out = Vec::with_capacity(2);
    let Some(obj) = input.as_object() else {
        return out;
    };
    if let Some(first) = obj
        .get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
    {
        if WRAP_FIELDS.iter().any(|f| first.contains_key(*f)) {
            out.push(first);
        }
    }
    out.push(obj);
    out
}

fn resolve_ids(candidates: &[&Map<String, Value>]) -> Result<Vec<String>, SubAgentError> {
    for candidate in candidates {
        // An explicit `ids` list wins over a single id on the same candidate.
        if let Some(value) = candidate.get("ids") {
            let arr = value
                .as_array()
                .ok_or_else(|| SubAgentError::IdsInvalid("ids must be an array".into()))?;
            let mut ids: Vec<String> = Vec::with_capacity(arr.len());
            for item in arr {
                let id = item
                    .as_str()
                    .ok_or_else(|| {
                        SubAgentError::IdsInvalid("ids elements must be strings".into())
                    })?
                    .trim();
                if id.is_empty() || ids.iter().any(|existing| existing == id) {
                    continue;
                }
                ids.push(id.to_string());
            }
            if ids.is_empty() {
                return Err(SubAgentError::IdsInvalid("ids list is empty".into()));
            }
            return Ok(ids);
        }
        for field in ["id", "agent_id"] {
            if let Some(id) = candidate.get(field).and_then(Value::as_str) {
                let id = id.trim();
                if !id.is_empty() {
                    return Ok(vec![id.to_string()]);
                }
            }
        }
    }
    Err(SubAgentError::IdRequired)
}

fn resolve_text(
    candidates: &[&Map<String, Value>],
    allow_task: bool,
) -> Result<String, SubAgentError> {
    let mut free = String::new();
    'search: for candidate in candidates {
        for field in TEXT_FIELDS
            .iter()
            .copied()
            .chain(allow_task.then_some("task"))
        {
            if let Some(text) = candidate.get(field).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    free = text.to_string();
                    break 'search;
                }
            }
        }
    }

    let mut rendered = String::new();
    for candidate in candidates {
        let Some(items) = candidate.get("items").and_then(Value::as_array) else {
            continue;
        };
        if is_wrapper(items) {
            continue;
        }
        let text = render_items(items)?;
        if !text.trim().is_empty() {
            rendered = text;
            break;
        }
    }

    if !free.is_empty() && !rendered.is_empty() {
        return Err(SubAgentError::InputConflict);
    }
    Ok(if free.is_empty() { rendered } else { free })
}

fn is_wrapper(items: &[Value]) -> bool {
    items
        .first()
        .and_then(Value::as_object)
        .is_some_and(|first| WRAP_FIELDS.iter().any(|f| first.contains_key(*f)))
}

/// Render a multi-modal block list to text: text passes through; image,
/// local_image, skill, and mention become bracketed tags.
fn render_items(items: &[Value]) -> Result<String, SubAgentError> {
    let mut parts: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let obj = item
            .as_object()
            .ok_or_else(|| SubAgentError::ItemsInvalid("items elements must be objects".into()))?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SubAgentError::ItemsInvalid("item is missing a type".into()))?;
        let rendered = match kind {
            "text" => required_str(obj, "text", kind)?.to_string(),
            "image" => format!("[image: {}]", required_str(obj, "url", kind)?),
            "local_image" => format!("[local_image: {}]", required_str(obj, "path", kind)?),
            "skill" => format!("[skill: {}]", required_str(obj, "name", kind)?),
            "mention" => format!("[mention: {}]", required_str(obj, "name", kind)?),
            other => {
                return Err(SubAgentError::ItemsInvalid(format!(
                    "unknown item type: {other}"
                )))
            }
        };
        parts.push(rendered);
    }
    Ok(parts.join("\n"))
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    kind: &str,
) -> Result<&'a str, SubAgentError> {
    obj.get(field).and_then(Value::as_str).ok_or_else(|| {
        SubAgentError::ItemsInvalid(format!("{kind} item is missing '{field}'"))
    })
}

/// First timeout field found wins; out-of-range values fall back to the
/// default rather than clamping.
fn resolve_timeout(candidates: &[&Map<String, Value>]) -> u64 {
    for candidate in candidates {
        for field in TIMEOUT_FIELDS {
            let Some(value) = candidate.get(*field) else {
                continue;
            };
            let parsed = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            return match parsed {
                Some(ms) if ms > 0.0 && ms <= WAIT_MAX_MS as f64 => ms as u64,
                _ => WAIT_DEFAULT_MS,
            };
        }
    }
    WAIT_DEFAULT_MS
}

fn resolve_interrupt(candidates: &[&Map<String, Value>]) -> bool {
    for candidate in candidates {
        let Some(value) = candidate.get("interrupt") else {
            continue;
        };
        match value {
            Value::Bool(b) => return *b,
            Value::Number(n) => return n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "on" => return true,
                "false" | "0" | "no" | "n" | "off" => return false,
                _ => continue,
            },
            _ => continue,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_map_with_single_id() {
        let d = parse_directive(&json!({"id": "a1", "message": "go"}), false).unwrap();
        assert_eq!(d.ids, vec!["a1"]);
        assert_eq!(d.text, "go");
        assert_eq!(d.wait_timeout_ms, WAIT_DEFAULT_MS);
        assert!(!d.interrupt);
    }

    #[test]
    fn ids_list_wins_over_single_id() {
        let d = parse_directive(
            &json!({"id": "x", "ids": ["a", "b", "a", " "], "prompt": "run"}),
            false,
        )
        .unwrap();
        assert_eq!(d.ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_ids_fails_with_id_required() {
        let err = parse_directive(&json!({"message": "hi"}), false).unwrap_err();
        assert_eq!(err.code(), "multi_agent_id_required");
    }

    #[test]
    fn malformed_ids_fails_with_ids_invalid() {
        let err = parse_directive(&json!({"ids": "a,b"}), false).unwrap_err();
        assert_eq!(err.code(), "multi_agent_ids_invalid");
        let err = parse_directive(&json!({"ids": ["a", 3]}), false).unwrap_err();
        assert_eq!(err.code(), "multi_agent_ids_invalid");
    }

    #[test]
    fn wrapped_item_takes_priority_over_flat_map() {
        let d = parse_directive(
            &json!({
                "id": "outer",
                "items": [{"agent_id": "inner", "input": "wrapped text"}]
            }),
            false,
        )
        .unwrap();
        assert_eq!(d.ids, vec!["inner"]);
        assert_eq!(d.text, "wrapped text");
    }

    #[test]
    fn items_render_to_bracketed_tags() {
        let d = parse_directive(
            &json!({
                "id": "a",
                "items": [
                    {"type": "text", "text": "look at this"},
                    {"type": "image", "url": "http://x/p.png"},
                    {"type": "skill", "name": "review"},
                    {"type": "mention", "name": "alice"}
                ]
            }),
            false,
        )
        .unwrap();
        assert_eq!(
            d.text,
            "look at this\n[image: http://x/p.png]\n[skill: review]\n[mention: alice]"
        );
    }

    #[test]
    fn free_text_plus_renderable_items_is_a_conflict() {
        let err = parse_directive(
            &json!({
                "id": "a",
                "message": "free text",
                "items": [{"type": "text", "text": "rendered"}]
            }),
            false,
        )
        .unwrap_err();
        assert_eq!(err.code(), "multi_agent_input_conflict");
    }

    #[test]
    fn malformed_items_fail_with_items_invalid() {
        let err =
            parse_directive(&json!({"id": "a", "items": [{"type": "hologram"}]}), false)
                .unwrap_err();
        assert_eq!(err.code(), "multi_agent_items_invalid");
        let err = parse_directive(&json!({"id": "a", "items": ["plain"]}), false).unwrap_err();
        assert_eq!(err.code(), "multi_agent_items_invalid");
    }

    #[test]
    fn task_field_only_counts_when_permitted() {
        let with = parse_directive(&json!({"id": "a", "task": "do it"}), true).unwrap();
        assert_eq!(with.text, "do it");
        let without = parse_directive(&json!({"id": "a", "task": "do it"}), false).unwrap();
        assert_eq!(without.text, "");
    }

    #[test]
    fn timeout_defaults_outside_range() {
        for (payload, expected) in [
            (json!({"id": "a", "timeout_ms": 5000}), 5000),
            (json!({"id": "a", "timeout": 0}), WAIT_DEFAULT_MS),
            (json!({"id": "a", "yield_time_ms": -4}), WAIT_DEFAULT_MS),
            (
                json!({"id": "a", "timeout_ms": WAIT_MAX_MS + 1}),
                WAIT_DEFAULT_MS,
            ),
            (json!({"id": "a", "timeout_ms": "2500"}), 2500),
            (json!({"id": "a"}), WAIT_DEFAULT_MS),
        ] {
            let d = parse_directive(&payload, false).unwrap();
            assert_eq!(d.wait_timeout_ms, expected, "payload: {payload}");
        }
    }

    #[test]
    fn interrupt_parses_boolean_like_values() {
        for (value, expected) in [
            (json!(true), true),
            (json!("yes"), true),
            (json!("ON"), true),
            (json!(1), true),
            (json!("off"), false),
            (json!(0), false),
            (json!("false"), false),
        ] {
            let d =
                parse_directive(&json!({"id": "a", "interrupt": value}), false).unwrap();
            assert_eq!(d.interrupt, expected);
        }
    }
}
