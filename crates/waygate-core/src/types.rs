use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name given to a chat before its first input derives a real one.
pub const PLACEHOLDER_CHAT_NAME: &str = "New Chat";

/// Chat metadata key holding a persisted prompt-mode override.
pub const META_PROMPT_MODE: &str = "prompt_mode";

/// Chat metadata key holding the active provider id for this chat.
pub const META_PROVIDER: &str = "provider";

/// Chat metadata key holding the active model slot for this chat.
pub const META_MODEL: &str = "model";

/// The triple that uniquely identifies a conversation thread among
/// currently-known chats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatKey {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
}

impl ChatKey {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            channel: channel.into(),
        }
    }
}

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.session_id, self.user_id, self.channel)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One content block inside a message. Multi-modal blocks render to
/// bracketed text tags when a plain-text view is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String },
    LocalImage { path: String },
    Skill { name: String },
    Mention { name: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Plain-text rendering: text passes through, everything else becomes a
    /// bracketed tag carrying its url/path/name.
    pub fn render(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Image { url } => format!("[image: {url}]"),
            ContentBlock::LocalImage { path } => format!("[local_image: {path}]"),
            ContentBlock::Skill { name } => format!("[skill: {name}]"),
            ContentBlock::Mention { name } => format!("[mention: {name}]"),
        }
    }
}

/// One message in a chat's history. Append-only: never mutated or removed
/// once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMessage {
    /// UUIDv7 — time-sortable, unique within a chat.
    pub id: String,
    pub role: Role,
    /// Message kind label (e.g. `"message"`). Open for collaborator use.
    pub kind: String,
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl RuntimeMessage {
    pub fn new(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role,
            kind: "message".to_string(),
            blocks,
            meta: serde_json::Map::new(),
        }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ContentBlock::text(text)])
    }

    /// Flatten all blocks into one plain-text string.
    pub fn rendered_text(&self) -> String {
        self.blocks
            .iter()
            .map(ContentBlock::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One conversation thread. Created on the first turn that matches no
/// existing (session_id, user_id, channel) triple; mutated on every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSpec {
    /// UUIDv7 primary key.
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    /// Open key-value bag: prompt-mode override, cron-supplied metadata, etc.
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}

impl ChatSpec {
    pub fn new(key: &ChatKey) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: Uuid::now_v7().to_string(),
            name: PLACEHOLDER_CHAT_NAME.to_string(),
            session_id: key.session_id.clone(),
            user_id: key.user_id.clone(),
            channel: key.channel.clone(),
            meta: serde_json::Map::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn key(&self) -> ChatKey {
        ChatKey::new(&self.session_id, &self.user_id, &self.channel)
    }

    pub fn matches(&self, key: &ChatKey) -> bool {
        self.session_id == key.session_id
            && self.user_id == key.user_id
            && self.channel == key.channel
    }

    /// String metadata value, if present and a string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
