use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::PromptError;
use crate::layers::{LayerStage, PromptLayer, CODEX_STAGES};
use crate::snapshot::{NormalizedSnapshot, TurnRuntimeSnapshot, MODE_CODEX};
use crate::source::LayerSource;

/// Bumped whenever the layering or hashing rules change, so cached aggregate
/// hashes from older compilers never collide with current ones.
pub const COMPILER_VERSION: u32 = 1;

/// Tool names carrying this prefix are surfaced as the MCP subset in the
/// tool-availability layer.
const MCP_TOOL_PREFIX: &str = "mcp__";

/// A compiled layer together with the hash of its normalized content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashedLayer {
    pub layer: PromptLayer,
    pub content_hash: String,
}

/// Compiler output: the normalized snapshot, the ordered deduplicated layer
/// list, and one aggregate hash over everything semantically relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledSystemPrompt {
    pub snapshot: NormalizedSnapshot,
    pub layers: Vec<HashedLayer>,
    pub aggregate_hash: String,
}

impl CompiledSystemPrompt {
    /// Flatten all layer contents into a single prompt string.
    pub fn to_plain_text(&self) -> String {
        self.layers
            .iter()
            .map(|l| l.layer.content.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Compile the system prompt for one turn.
///
/// Pure with respect to its inputs: the same normalized snapshot and the
/// same layer source contents always produce the same layers and hashes.
pub fn compile(
    snapshot: &TurnRuntimeSnapshot,
    source: &dyn LayerSource,
) -> Result<CompiledSystemPrompt, PromptError> {
    let normalized = snapshot.normalize()?;

    let mut layers = if normalized.prompt_mode == MODE_CODEX {
        codex_layers(&normalized, source)?
    } else {
        default_layers(source)?
    };

    if let Some(layer) = tool_availability_layer(&normalized) {
        layers.push(layer);
    }

    let layers = dedup_layers(layers);
    let hashed: Vec<HashedLayer> = layers
        .into_iter()
        .map(|layer| {
            let content_hash = hash_hex(layer.content.trim().as_bytes());
            HashedLayer {
                layer,
                content_hash,
            }
        })
        .collect();

    let aggregate_hash = aggregate_hash(&normalized, &hashed);
    debug!(
        mode = %normalized.prompt_mode,
        layers = hashed.len(),
        hash = %aggregate_hash,
        "compiled system prompt"
    );

    Ok(CompiledSystemPrompt {
        snapshot: normalized,
        layers: hashed,
        aggregate_hash,
    })
}

/// Run the fixed-precedence stage list for the extended mode.
fn codex_layers(
    snapshot: &NormalizedSnapshot,
    source: &dyn LayerSource,
) -> Result<Vec<PromptLayer>, PromptError> {
    let mut layers = Vec::new();
    for stage in CODEX_STAGES {
        if !(stage.gate)(snapshot) {
            continue;
        }
        match first_available(stage, snapshot, source) {
            Some(layer) => layers.push(layer),
            None if stage.required => {
                return Err(PromptError::RequiredLayerMissing {
                    name: stage.name.to_string(),
                    source_name: (stage.sources)(snapshot).join(", "),
                })
            }
            // Optional sources that cannot be loaded are silently skipped.
            None => {}
        }
    }
    Ok(layers)
}

/// For the default mode a single external layer substitutes for the whole
/// mode-specific pipeline.
fn default_layers(source: &dyn LayerSource) -> Result<Vec<PromptLayer>, PromptError> {
    let content = source
        .load("default")
        .ok_or_else(|| PromptError::RequiredLayerMissing {
            name: "default".to_string(),
            source_name: "default".to_string(),
        })?;
    Ok(vec![PromptLayer::new("default", "system", "default", content)])
}

fn first_available(
    stage: &LayerStage,
    snapshot: &NormalizedSnapshot,
    source: &dyn LayerSource,
) -> Option<PromptLayer> {
    for candidate in (stage.sources)(snapshot) {
        if let Some(content) = source.load(&candidate) {
            return Some(PromptLayer::new(stage.name, stage.role, candidate, content));
        }
    }
    None
}

/// Synthesized when either MCP is enabled or any dynamic tool is declared:
/// lists the turn's tool surface verbatim and tells the model to ignore any
/// tool name from prior turns not in this list.
fn tool_availability_layer(snapshot: &NormalizedSnapshot) -> Option<PromptLayer> {
    if !snapshot.mcp_enabled && snapshot.dynamic_tools.is_empty() {
        return None;
    }

    let mcp_tools: Vec<&String> = snapshot
        .available_tools
        .iter()
        .filter(|t| t.starts_with(MCP_TOOL_PREFIX))
        .collect();

    let mut content = String::from("## Tool availability\n");
    content.push_str(&format!(
        "Available tools: {}\n",
        join_or_none(&snapshot.available_tools)
    ));
    content.push_str(&format!("MCP status: {}\n", snapshot.mcp_status));
    content.push_str(&format!(
        "MCP tools: {}\n",
        if mcp_tools.is_empty() {
            "(none)".to_string()
        } else {
            mcp_tools
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    ));
    content.push_str(&format!(
        "Dynamic tools: {}\n",
        join_or_none(&snapshot.dynamic_tools)
    ));
    content.push_str(
        "Ignore any tool name mentioned in earlier turns that does not appear in this list.",
    );

    Some(PromptLayer::new(
        "tool_availability",
        "system",
        "synthetic",
        content,
    ))
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Drop layers whose normalized content already appeared, keeping the first
/// occurrence and preserving order.
fn dedup_layers(layers: Vec<PromptLayer>) -> Vec<PromptLayer> {
    let mut seen: HashSet<String> = HashSet::with_capacity(layers.len());
    layers
        .into_iter()
        .filter(|l| seen.insert(l.content.trim().to_string()))
        .collect()
}

fn hash_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Aggregate hash over {compiler version, normalized snapshot, ordered
/// (name, role, source, content hash) tuples}. Changes iff any semantically
/// relevant input changes.
fn aggregate_hash(snapshot: &NormalizedSnapshot, layers: &[HashedLayer]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(COMPILER_VERSION.to_be_bytes());
    // Field order in NormalizedSnapshot is stable, so the JSON encoding is a
    // deterministic serialization of the snapshot.
    let snapshot_json =
        serde_json::to_string(snapshot).expect("normalized snapshot serializes");
    hasher.update(snapshot_json.as_bytes());
    for hl in layers {
        hasher.update([0u8]);
        hasher.update(hl.layer.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(hl.layer.role.as_bytes());
        hasher.update([0u8]);
        hasher.update(hl.layer.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(hl.content_hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}
