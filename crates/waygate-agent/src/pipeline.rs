//! The turn orchestrator: validate → resolve channel → (reset?) → resolve
//! mode → detect triggers → compile prompt → persist user turn → resolve
//! generation → delegate to the engine → persist assistant turn → dispatch
//! → detached memory pipeline.
//!
//! Every dependency is constructed at startup and injected here; the
//! pipeline holds no hidden global state. Turns run as independent
//! concurrent units and only share state through the store's transactions.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use waygate_channels::{ChannelRegistry, ResolvedChannel};
use waygate_core::config::AgentConfig;
use waygate_core::types::{
    truncate_chars, ChatKey, ContentBlock, Role, RuntimeMessage, META_MODEL, META_PROMPT_MODE,
    META_PROVIDER, PLACEHOLDER_CHAT_NAME,
};
use waygate_prompt::{compile, LayerSource, TurnRuntimeSnapshot, MODE_CODEX};
use waygate_store::StateStore;
use waygate_subagent::{parse_directive, SubAgentDirective};

use crate::engine::{EngineCall, ExecutionEngine};
use crate::error::AgentError;
use crate::events::ProcessEvent;
use crate::memory::{serialize_rollout, MemorySink};
use crate::provider::{resolve_generate_config, ProviderLookup, META_PROVIDER_RESPONSE_ID};
use crate::triggers::{TaskTriggers, TriggerRecognizer};

/// Biz-param key carrying an explicit sub-agent tool call.
pub const BIZ_TOOL_CALL: &str = "tool_call";
/// Biz-param key carrying scheduler-supplied chat metadata to merge.
pub const BIZ_CRON_META: &str = "cron";
/// Biz-param key carrying the turn's tool/MCP/policy declarations.
pub const BIZ_RUNTIME: &str = "runtime";

/// Maximum chat-name length derived from the first input.
const CHAT_NAME_MAX_CHARS: usize = 20;

/// Fixed reply dispatched for a recognized context-reset command.
const RESET_REPLY: &str = "Context cleared.";

/// One inbound message of a turn request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
}

impl InputMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![ContentBlock::text(text)],
        }
    }

    pub fn rendered_text(&self) -> String {
        self.blocks
            .iter()
            .map(ContentBlock::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The turn boundary contract: caller-supplied request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub input: Vec<InputMessage>,
    /// Explicit per-request prompt-mode override. Persisted into the chat's
    /// metadata and used for subsequent turns.
    pub prompt_mode: Option<String>,
    /// Free-form collaborator parameters (tool calls, cron metadata, …).
    #[serde(default)]
    pub biz_params: serde_json::Map<String, Value>,
    #[serde(default)]
    pub streaming: bool,
}

impl ProcessRequest {
    pub fn text(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            channel: channel.into(),
            input: vec![InputMessage::user_text(text)],
            prompt_mode: None,
            biz_params: serde_json::Map::new(),
            streaming: false,
        }
    }
}

/// Tool, MCP, and policy declarations for one turn, supplied by the
/// transport under the `runtime` biz-param key. Everything here flows into
/// the compiled prompt's snapshot; nothing is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeContext {
    #[serde(default)]
    pub available_tools: Vec<String>,
    #[serde(default)]
    pub dynamic_tools: Vec<String>,
    #[serde(default)]
    pub mcp_enabled: bool,
    #[serde(default)]
    pub mcp_status: Option<String>,
    #[serde(default)]
    pub approval_policy: String,
    #[serde(default)]
    pub sandbox_policy: String,
    #[serde(default)]
    pub collaboration_event: String,
    #[serde(default)]
    pub personality: String,
}

/// The turn's output: reply text plus its ordered event list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub reply: String,
    pub events: Vec<ProcessEvent>,
}

/// Values read back from the first write transaction.
struct TurnState {
    chat_id: String,
    chat_name: String,
    history: Vec<RuntimeMessage>,
    history_len_before: usize,
    provider_id: Option<String>,
    model_slot: Option<String>,
}

/// The orchestrator. All collaborators are injected at construction.
pub struct TurnPipeline {
    store: Arc<StateStore>,
    layers: Arc<dyn LayerSource>,
    channels: Arc<ChannelRegistry>,
    providers: Arc<dyn ProviderLookup>,
    engine: Arc<dyn ExecutionEngine>,
    recognizer: Arc<dyn TriggerRecognizer>,
    memory: Arc<dyn MemorySink>,
    config: AgentConfig,
}

impl TurnPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<StateStore>,
        layers: Arc<dyn LayerSource>,
        channels: Arc<ChannelRegistry>,
        providers: Arc<dyn ProviderLookup>,
        engine: Arc<dyn ExecutionEngine>,
        recognizer: Arc<dyn TriggerRecognizer>,
        memory: Arc<dyn MemorySink>,
        config: AgentConfig,
    ) -> Self {
        Self {
            store,
            layers,
            channels,
            providers,
            engine,
            recognizer,
            memory,
            config,
        }
    }

    /// Run one turn end to end.
    #[instrument(skip_all, fields(session = %request.session_id, user = %request.user_id, channel = %request.channel))]
    pub async fn process(
        &self,
        cancel: &CancellationToken,
        request: ProcessRequest,
    ) -> Result<ProcessResponse, AgentError> {
        // 1. Validate.
        if request.session_id.trim().is_empty() || request.user_id.trim().is_empty() {
            return Err(AgentError::InvalidRequest(
                "session_id and user_id are required".to_string(),
            ));
        }

        // 2. Resolve channel.
        let resolved = self.channels.resolve(&request.channel)?;
        let chat_key = ChatKey::new(
            request.session_id.trim(),
            request.user_id.trim(),
            &resolved.canonical_name,
        );

        let first_text = request
            .input
            .first()
            .map(InputMessage::rendered_text)
            .unwrap_or_default();

        // 3. Context-reset short-circuit: no compilation, no model call,
        // no history append.
        if self.recognizer.is_context_reset(&first_text) {
            return self.reset_context(&chat_key, &resolved).await;
        }

        // 4. Effective prompt mode: explicit override > chat metadata >
        // configured default. The chat's model slot is read in the same
        // snapshot so the compiled prompt sees it.
        let explicit_mode = request
            .prompt_mode
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_lowercase);
        let (meta_mode, meta_model) = self.store.read(|s| {
            let chat = s.find_chat(&chat_key);
            (
                chat.and_then(|c| c.meta_str(META_PROMPT_MODE))
                    .map(str::to_string),
                chat.and_then(|c| c.meta_str(META_MODEL)).map(str::to_string),
            )
        })?;
        let effective_mode = explicit_mode
            .clone()
            .or(meta_mode)
            .unwrap_or_else(|| self.config.default_mode.clone());

        // 5. Task triggers — only meaningful in the extended mode.
        let triggers = if effective_mode == MODE_CODEX {
            self.recognizer.triggers(&first_text)
        } else {
            TaskTriggers::default()
        };

        // 6. Compile the system prompt from the full turn context. Fails
        // before any state mutation.
        let runtime: RuntimeContext = match request.biz_params.get(BIZ_RUNTIME) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                AgentError::InvalidRequest(format!("malformed runtime params: {e}"))
            })?,
            None => RuntimeContext::default(),
        };
        let snapshot = TurnRuntimeSnapshot {
            prompt_mode: effective_mode.clone(),
            collaboration_mode: triggers.collaboration_mode().to_string(),
            collaboration_event: runtime.collaboration_event,
            review_task: triggers.review,
            compact_task: triggers.compact,
            memory_task: triggers.memory,
            approval_policy: runtime.approval_policy,
            sandbox_policy: runtime.sandbox_policy,
            available_tools: runtime.available_tools,
            dynamic_tools: runtime.dynamic_tools,
            mcp_enabled: runtime.mcp_enabled,
            mcp_status: runtime.mcp_status,
            session_id: chat_key.session_id.clone(),
            model: meta_model
                .or_else(|| self.config.model.clone())
                .unwrap_or_default(),
            personality: runtime.personality,
        };
        let compiled = compile(&snapshot, self.layers.as_ref()).map_err(|source| {
            AgentError::PromptUnavailable {
                mode: effective_mode.clone(),
                source,
            }
        })?;

        // 7. Load/create the chat and append the user turn, atomically.
        let input_messages: Vec<RuntimeMessage> = request
            .input
            .iter()
            .map(|m| RuntimeMessage::new(m.role, m.blocks.clone()))
            .collect();
        let cron_meta = request
            .biz_params
            .get(BIZ_CRON_META)
            .and_then(Value::as_object)
            .cloned();
        let turn = {
            let default_provider = self.config.provider.clone();
            let default_model = self.config.model.clone();
            let explicit_mode = explicit_mode.clone();
            let to_append = input_messages.clone();
            let key = chat_key.clone();
            self.store.write(move |s| {
                let (chat_id, chat_name, provider_id, model_slot) = {
                    let chat = s.get_or_create_chat(&key);
                    if let Some(mode) = &explicit_mode {
                        chat.meta
                            .insert(META_PROMPT_MODE.to_string(), Value::String(mode.clone()));
                    }
                    if let Some(extra) = &cron_meta {
                        for (k, v) in extra {
                            chat.meta.insert(k.clone(), v.clone());
                        }
                    }
                    chat.touch();
                    (
                        chat.id.clone(),
                        chat.name.clone(),
                        chat.meta_str(META_PROVIDER)
                            .map(str::to_string)
                            .or(default_provider),
                        chat.meta_str(META_MODEL)
                            .map(str::to_string)
                            .or(default_model),
                    )
                };
                let history_len_before = s.history(&chat_id).len();
                for msg in to_append {
                    s.append_message(&chat_id, msg)?;
                }
                Ok(TurnState {
                    history: s.history(&chat_id).to_vec(),
                    chat_id,
                    chat_name,
                    history_len_before,
                    provider_id,
                    model_slot,
                })
            })?
        };

        // 8. Explicit tool call, or resolve the generation configuration.
        let tool_call: Option<SubAgentDirective> = match request.biz_params.get(BIZ_TOOL_CALL) {
            Some(value) => Some(parse_directive(value, true)?),
            None => None,
        };
        let generate = if tool_call.is_some() {
            None
        } else {
            let entry = turn
                .provider_id
                .as_deref()
                .and_then(|id| self.providers.settings(id));
            Some(resolve_generate_config(
                entry.as_ref(),
                turn.model_slot.as_deref(),
                &chat_key.session_id,
                &turn.history,
            )?)
        };

        // Effective model input: compiled layers, then full history
        // (preferred) or the raw request input.
        let mut effective_input: Vec<RuntimeMessage> =
            Vec::with_capacity(compiled.layers.len() + turn.history.len());
        for layer in &compiled.layers {
            effective_input.push(RuntimeMessage::text(
                Role::System,
                layer.layer.content.clone(),
            ));
        }
        if turn.history.is_empty() {
            effective_input.extend(input_messages.iter().cloned());
        } else {
            effective_input.extend(turn.history.iter().cloned());
        }

        // 9. Delegate generation; stamp every emitted event with metadata
        // derived from the compiled prompt and generation config.
        let mut stamp = serde_json::Map::new();
        stamp.insert(
            "prompt_hash".to_string(),
            Value::String(compiled.aggregate_hash.clone()),
        );
        stamp.insert(
            "prompt_mode".to_string(),
            Value::String(effective_mode.clone()),
        );
        if let Some(g) = &generate {
            stamp.insert("provider".to_string(), Value::String(g.provider_id.clone()));
            stamp.insert("model".to_string(), Value::String(g.model.clone()));
        }
        let emitted: Arc<Mutex<Vec<ProcessEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let emit = {
            let emitted = Arc::clone(&emitted);
            let stamp = stamp.clone();
            move |mut event: ProcessEvent| {
                for (k, v) in &stamp {
                    event.meta.entry(k.clone()).or_insert_with(|| v.clone());
                }
                if let Ok(mut events) = emitted.lock() {
                    events.push(event);
                }
            }
        };

        let call = EngineCall {
            session_id: chat_key.session_id.clone(),
            user_id: chat_key.user_id.clone(),
            channel: chat_key.channel.clone(),
            prompt_mode: effective_mode.clone(),
            streaming: request.streaming,
            reply_chunk_size: self.config.reply_chunk_size,
            tool_call: tool_call.clone(),
            generate,
            effective_input,
        };
        let result = self.engine.process(cancel, call, &emit).await?;

        // Cancellation before persistence aborts the turn without a
        // partially persisted assistant reply.
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        // 10. Persist the assistant turn; derive the chat name on first
        // input; serialize the memory rollout when requested.
        let mut assistant = RuntimeMessage::text(Role::Assistant, result.reply.clone());
        if let Some(rid) = &result.provider_response_id {
            assistant.meta.insert(
                META_PROVIDER_RESPONSE_ID.to_string(),
                Value::String(rid.clone()),
            );
        }
        let want_rollout = triggers.memory && tool_call.is_none();
        let rollout = {
            let chat_id = turn.chat_id.clone();
            let chat_name = turn.chat_name.clone();
            let first_input = turn.history_len_before == 0;
            let name_seed = first_text.trim().to_string();
            self.store.write(move |s| {
                s.append_message(&chat_id, assistant)?;
                let rollout = want_rollout
                    .then(|| serialize_rollout(&chat_id, s.history(&chat_id)));
                if chat_name == PLACEHOLDER_CHAT_NAME && first_input && !name_seed.is_empty() {
                    if let Some(chat) = s.chat_by_id_mut(&chat_id) {
                        chat.name = truncate_chars(&name_seed, CHAT_NAME_MAX_CHARS);
                        chat.touch();
                    }
                }
                Ok(rollout)
            })?
        };

        // 11. Dispatch the reply. The turn's textual result already exists
        // in history even if delivery fails here.
        resolved
            .channel
            .send_text(
                &chat_key.user_id,
                &chat_key.session_id,
                &result.reply,
                &resolved.config,
            )
            .await?;

        // 12. Detached memory pipeline: fire-and-forget, errors isolated.
        if let Some(rollout) = rollout {
            let memory = Arc::clone(&self.memory);
            let chat_id = turn.chat_id.clone();
            tokio::spawn(async move {
                if let Err(e) = memory.store_rollout(&chat_id, rollout).await {
                    warn!(chat = %chat_id, error = %e, "memory pipeline failed");
                }
            });
        }

        // 13. Reply text plus the ordered event list.
        let events = {
            let collected = emitted.lock().map(|e| e.clone()).unwrap_or_default();
            if collected.is_empty() {
                result.events
            } else {
                collected
            }
        };
        info!(
            chat = %turn.chat_id,
            mode = %effective_mode,
            events = events.len(),
            reply_chars = result.reply.chars().count(),
            "turn complete"
        );
        Ok(ProcessResponse {
            reply: result.reply,
            events,
        })
    }

    /// Clear the chat's stored context and return the canned three-event
    /// response, bypassing compilation, generation, and history append.
    async fn reset_context(
        &self,
        key: &ChatKey,
        resolved: &ResolvedChannel,
    ) -> Result<ProcessResponse, AgentError> {
        let cleared = self.store.write(|s| Ok(s.clear_history(key)))?;
        info!(key = %key, cleared, "context reset");

        resolved
            .channel
            .send_text(&key.user_id, &key.session_id, RESET_REPLY, &resolved.config)
            .await?;

        Ok(ProcessResponse {
            reply: RESET_REPLY.to_string(),
            events: vec![
                ProcessEvent::step_started(1),
                ProcessEvent::assistant_delta(1, RESET_REPLY),
                ProcessEvent::completed(1, RESET_REPLY),
            ],
        })
    }
}
