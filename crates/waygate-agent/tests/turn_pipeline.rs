//! End-to-end turn processing against in-memory collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use waygate_agent::{
    AgentError, EngineCall, EngineResult, ExecutionEngine, InputMessage, MemorySink,
    NullMemorySink, ProcessEvent, ProcessRequest, SlashRecognizer, StaticProviders, TurnPipeline,
};
use waygate_channels::{Channel, ChannelError, ChannelRegistry, DispatchConfig};
use waygate_core::config::{AgentConfig, ProviderEntry, DEFAULT_PROVIDER_TIMEOUT_MS};
use waygate_core::types::{ChatKey, Role, META_PROMPT_MODE};
use waygate_prompt::{LayerSource, MapLayerSource};
use waygate_store::StateStore;

struct MockEngine {
    reply: String,
    calls: Mutex<Vec<EngineCall>>,
    cancel_before_return: bool,
}

impl MockEngine {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
            cancel_before_return: false,
        }
    }

    fn cancelling(reply: &str) -> Self {
        Self {
            cancel_before_return: true,
            ..Self::new(reply)
        }
    }

    fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn process(
        &self,
        cancel: &CancellationToken,
        call: EngineCall,
        emit: &(dyn Fn(ProcessEvent) + Send + Sync),
    ) -> Result<EngineResult, AgentError> {
        self.calls.lock().unwrap().push(call);
        emit(ProcessEvent::step_started(1));
        emit(ProcessEvent::assistant_delta(1, self.reply.clone()));
        emit(ProcessEvent::completed(1, self.reply.clone()));
        if self.cancel_before_return {
            cancel.cancel();
        }
        Ok(EngineResult {
            reply: self.reply.clone(),
            events: Vec::new(),
            provider_response_id: Some("resp-1".to_string()),
        })
    }
}

struct RecordingChannel {
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_text(
        &self,
        _user_id: &str,
        _session_id: &str,
        text: &str,
        _config: &DispatchConfig,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct FailingChannel;

#[async_trait]
impl Channel for FailingChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_text(
        &self,
        _user_id: &str,
        _session_id: &str,
        _text: &str,
        _config: &DispatchConfig,
    ) -> Result<(), ChannelError> {
        Err(ChannelError::Dispatch {
            channel: "console".to_string(),
            reason: "connection reset".to_string(),
        })
    }
}

struct ChannelMemorySink {
    tx: tokio::sync::mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl MemorySink for ChannelMemorySink {
    async fn store_rollout(&self, chat_id: &str, rollout: String) -> Result<(), String> {
        self.tx
            .send((chat_id.to_string(), rollout))
            .map_err(|e| e.to_string())
    }
}

fn default_layers() -> MapLayerSource {
    MapLayerSource::new().with("default", "baseline instructions")
}

fn codex_layers() -> MapLayerSource {
    MapLayerSource::new()
        .with("default", "baseline instructions")
        .with("base", "base instructions")
}

struct Harness {
    store: Arc<StateStore>,
    engine: Arc<MockEngine>,
    channel: Arc<RecordingChannel>,
    pipeline: TurnPipeline,
}

fn harness_with(
    layers: MapLayerSource,
    engine: MockEngine,
    providers: StaticProviders,
    config: AgentConfig,
    memory: Arc<dyn MemorySink>,
) -> Harness {
    let store = Arc::new(StateStore::new());
    let engine = Arc::new(engine);
    let channel = Arc::new(RecordingChannel::new());
    let mut registry = ChannelRegistry::new();
    registry.register(channel.clone(), DispatchConfig::default());
    let pipeline = TurnPipeline::new(
        store.clone(),
        Arc::new(layers) as Arc<dyn LayerSource>,
        Arc::new(registry),
        Arc::new(providers),
        engine.clone(),
        Arc::new(SlashRecognizer),
        memory,
        config,
    );
    Harness {
        store,
        engine,
        channel,
        pipeline,
    }
}

fn harness() -> Harness {
    harness_with(
        default_layers(),
        MockEngine::new("ok"),
        StaticProviders::empty(),
        AgentConfig::default(),
        Arc::new(NullMemorySink),
    )
}

fn openai_entry(enabled: bool) -> ProviderEntry {
    ProviderEntry {
        id: "openai".to_string(),
        enabled,
        api_key: Some("sk-test".to_string()),
        base_url: None,
        adapter: None,
        default_model: Some("gpt-4o".to_string()),
        aliases: std::collections::HashMap::new(),
        headers: std::collections::HashMap::new(),
        timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
        reasoning_effort: None,
        store: true,
    }
}

#[tokio::test]
async fn first_turn_persists_names_and_dispatches() {
    let h = harness();
    let cancel = CancellationToken::new();
    let response = h
        .pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap();

    assert_eq!(response.reply, "ok");
    assert_eq!(response.events.len(), 3);
    // Every emitted event is stamped with the compiled-prompt metadata.
    for event in &response.events {
        assert_eq!(event.meta["prompt_mode"], "default");
        assert!(event.meta["prompt_hash"].as_str().unwrap().len() == 64);
    }
    assert_eq!(*h.channel.sent.lock().unwrap(), ["ok"]);

    h.store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            assert_eq!(chat.name, "hi");
            let history = s.history(&chat.id);
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].role, Role::User);
            assert_eq!(history[1].role, Role::Assistant);
            assert_eq!(
                history[1].meta["provider_response_id"].as_str(),
                Some("resp-1")
            );
        })
        .unwrap();
}

#[tokio::test]
async fn long_first_input_truncates_the_chat_name() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.pipeline
        .process(
            &cancel,
            ProcessRequest::text("s1", "u1", "console", "please summarize everything we did"),
        )
        .await
        .unwrap();

    h.store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            assert_eq!(chat.name.chars().count(), 20);
            assert!("please summarize everything we did".starts_with(&chat.name));
        })
        .unwrap();
}

#[tokio::test]
async fn reset_clears_history_without_calling_the_engine() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap();
    assert_eq!(h.engine.calls().len(), 1);

    let response = h
        .pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "/reset"))
        .await
        .unwrap();

    assert_eq!(h.engine.calls().len(), 1);
    assert_eq!(response.events.len(), 3);
    assert_eq!(response.reply, "Context cleared.");

    h.store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            assert!(s.history(&chat.id).is_empty());
        })
        .unwrap();
}

#[tokio::test]
async fn dispatch_failure_surfaces_after_persistence() {
    let store = Arc::new(StateStore::new());
    let mut registry = ChannelRegistry::new();
    registry.register(Arc::new(FailingChannel), DispatchConfig::default());
    let pipeline = TurnPipeline::new(
        store.clone(),
        Arc::new(default_layers()) as Arc<dyn LayerSource>,
        Arc::new(registry),
        Arc::new(StaticProviders::empty()),
        Arc::new(MockEngine::new("ok")),
        Arc::new(SlashRecognizer),
        Arc::new(NullMemorySink),
        AgentConfig::default(),
    );

    let cancel = CancellationToken::new();
    let err = pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "channel_dispatch_failed");

    // The turn's record survives the delivery failure.
    store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            assert_eq!(s.history(&chat.id).len(), 2);
        })
        .unwrap();
}

#[tokio::test]
async fn prompt_failure_happens_before_any_chat_is_created() {
    let h = harness_with(
        MapLayerSource::new(),
        MockEngine::new("ok"),
        StaticProviders::empty(),
        AgentConfig::default(),
        Arc::new(NullMemorySink),
    );
    let cancel = CancellationToken::new();
    let err = h
        .pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "prompt_unavailable");
    assert!(h.engine.calls().is_empty());
    h.store.read(|s| assert_eq!(s.chat_count(), 0)).unwrap();
}

#[tokio::test]
async fn disabled_provider_fails_but_keeps_the_user_message() {
    let config = AgentConfig {
        provider: Some("openai".to_string()),
        model: Some("gpt-4o".to_string()),
        ..AgentConfig::default()
    };
    let h = harness_with(
        default_layers(),
        MockEngine::new("ok"),
        StaticProviders::new(vec![openai_entry(false)]),
        config,
        Arc::new(NullMemorySink),
    );
    let cancel = CancellationToken::new();
    let err = h
        .pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "provider_disabled");
    assert!(h.engine.calls().is_empty());

    h.store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            assert_eq!(s.history(&chat.id).len(), 1);
        })
        .unwrap();
}

#[tokio::test]
async fn no_configured_provider_falls_back_to_demo() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap();

    let calls = h.engine.calls();
    let generate = calls[0].generate.as_ref().unwrap();
    assert_eq!(generate.provider_id, "demo");
    assert_eq!(generate.model, "demo-chat");
    assert_eq!(generate.cache_key, "s1");
}

#[tokio::test]
async fn explicit_tool_call_bypasses_generation() {
    let h = harness();
    let cancel = CancellationToken::new();
    let mut request = ProcessRequest::text("s1", "u1", "console", "dispatch work");
    request.biz_params.insert(
        "tool_call".to_string(),
        serde_json::json!({ "id": "worker-1", "message": "go" }),
    );
    h.pipeline.process(&cancel, request).await.unwrap();

    let calls = h.engine.calls();
    assert!(calls[0].generate.is_none());
    let directive = calls[0].tool_call.as_ref().unwrap();
    assert_eq!(directive.ids, ["worker-1"]);
    assert_eq!(directive.text, "go");
}

#[tokio::test]
async fn malformed_tool_call_keeps_its_granular_code() {
    let h = harness();
    let cancel = CancellationToken::new();
    let mut request = ProcessRequest::text("s1", "u1", "console", "dispatch work");
    request.biz_params.insert(
        "tool_call".to_string(),
        serde_json::json!({
            "id": "worker-1",
            "message": "go",
            "items": [{ "type": "text", "text": "also go" }]
        }),
    );
    let err = h.pipeline.process(&cancel, request).await.unwrap_err();
    assert_eq!(err.code(), "multi_agent_input_conflict");
}

#[tokio::test]
async fn mode_override_persists_into_the_chat() {
    let h = harness_with(
        codex_layers(),
        MockEngine::new("ok"),
        StaticProviders::empty(),
        AgentConfig::default(),
        Arc::new(NullMemorySink),
    );
    let cancel = CancellationToken::new();

    let mut first = ProcessRequest::text("s1", "u1", "console", "hi");
    first.prompt_mode = Some("codex".to_string());
    h.pipeline.process(&cancel, first).await.unwrap();

    // Second turn names no mode but the chat remembers.
    h.pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "again"))
        .await
        .unwrap();

    let calls = h.engine.calls();
    assert_eq!(calls[0].prompt_mode, "codex");
    assert_eq!(calls[1].prompt_mode, "codex");
    h.store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            assert_eq!(chat.meta_str(META_PROMPT_MODE), Some("codex"));
        })
        .unwrap();
}

#[tokio::test]
async fn memory_trigger_delivers_a_rollout() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let config = AgentConfig {
        default_mode: "codex".to_string(),
        ..AgentConfig::default()
    };
    let h = harness_with(
        codex_layers(),
        MockEngine::new("stored"),
        StaticProviders::empty(),
        config,
        Arc::new(ChannelMemorySink { tx }),
    );
    let cancel = CancellationToken::new();
    h.pipeline
        .process(
            &cancel,
            ProcessRequest::text("s1", "u1", "console", "/memory keep this"),
        )
        .await
        .unwrap();

    let (chat_id, rollout) = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&rollout).unwrap();
    assert_eq!(value["chat_id"], chat_id.as_str());
    assert_eq!(value["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn declared_tools_surface_in_the_compiled_prompt() {
    let h = harness();
    let cancel = CancellationToken::new();
    let mut request = ProcessRequest::text("s1", "u1", "console", "what tools do I have?");
    request.biz_params.insert(
        "runtime".to_string(),
        serde_json::json!({
            "mcp_enabled": true,
            "available_tools": ["shell", "mcp__files_read"],
            "dynamic_tools": ["weather"]
        }),
    );
    h.pipeline.process(&cancel, request).await.unwrap();

    let calls = h.engine.calls();
    let tool_layer = calls[0]
        .effective_input
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.rendered_text())
        .find(|text| text.contains("Tool availability"))
        .expect("tool availability layer in the model input");
    assert!(tool_layer.contains("shell, mcp__files_read"));
    assert!(tool_layer.contains("MCP status: enabled"));
    assert!(tool_layer.contains("Dynamic tools: weather"));
}

#[tokio::test]
async fn configured_model_selects_its_instruction_layer() {
    let config = AgentConfig {
        default_mode: "codex".to_string(),
        model: Some("gpt-4o".to_string()),
        ..AgentConfig::default()
    };
    let layers = codex_layers().with("models/gpt-4o", "gpt-4o guidance");
    let h = harness_with(
        layers,
        MockEngine::new("ok"),
        StaticProviders::empty(),
        config,
        Arc::new(NullMemorySink),
    );
    let cancel = CancellationToken::new();
    h.pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap();

    let calls = h.engine.calls();
    assert!(calls[0]
        .effective_input
        .iter()
        .any(|m| m.role == Role::System && m.rendered_text() == "gpt-4o guidance"));
}

#[tokio::test]
async fn malformed_runtime_params_are_rejected() {
    let h = harness();
    let cancel = CancellationToken::new();
    let mut request = ProcessRequest::text("s1", "u1", "console", "hi");
    request.biz_params.insert(
        "runtime".to_string(),
        serde_json::json!(["not", "an", "object"]),
    );
    let err = h.pipeline.process(&cancel, request).await.unwrap_err();
    assert_eq!(err.code(), "invalid_request");
    h.store.read(|s| assert_eq!(s.chat_count(), 0)).unwrap();
}

#[tokio::test]
async fn blank_identifiers_are_rejected() {
    let h = harness();
    let cancel = CancellationToken::new();
    let err = h
        .pipeline
        .process(&cancel, ProcessRequest::text("  ", "u1", "console", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_request");
}

#[tokio::test]
async fn unknown_channel_is_rejected_up_front() {
    let h = harness();
    let cancel = CancellationToken::new();
    let err = h
        .pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "telegraph", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "channel_not_found");
    h.store.read(|s| assert_eq!(s.chat_count(), 0)).unwrap();
}

#[tokio::test]
async fn cancellation_during_generation_skips_the_assistant_record() {
    let h = harness_with(
        default_layers(),
        MockEngine::cancelling("late"),
        StaticProviders::empty(),
        AgentConfig::default(),
        Arc::new(NullMemorySink),
    );
    let cancel = CancellationToken::new();
    let err = h
        .pipeline
        .process(&cancel, ProcessRequest::text("s1", "u1", "console", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "cancelled");

    h.store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            // Only the user turn made it in.
            assert_eq!(s.history(&chat.id).len(), 1);
        })
        .unwrap();
}

#[tokio::test]
async fn multi_block_input_renders_every_block() {
    let h = harness();
    let cancel = CancellationToken::new();
    let request = ProcessRequest {
        input: vec![InputMessage {
            role: Role::User,
            blocks: vec![
                waygate_core::types::ContentBlock::text("look at"),
                waygate_core::types::ContentBlock::Image {
                    url: "http://x/y.png".to_string(),
                },
            ],
        }],
        ..ProcessRequest::text("s1", "u1", "console", "")
    };
    h.pipeline.process(&cancel, request).await.unwrap();

    h.store
        .read(|s| {
            let chat = s.find_chat(&ChatKey::new("s1", "u1", "console")).unwrap();
            let rendered = s.history(&chat.id)[0].rendered_text();
            assert_eq!(rendered, "look at\n[image: http://x/y.png]");
        })
        .unwrap();
}
