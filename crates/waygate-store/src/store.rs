use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, instrument};

use waygate_core::types::{ChatKey, ChatSpec, RuntimeMessage};

use crate::error::{Result, StoreError};

/// The mutable state guarded by the store: known chats plus per-chat
/// append-only histories keyed by chat id.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    chats: Vec<ChatSpec>,
    histories: HashMap<String, Vec<RuntimeMessage>>,
}

impl StoreState {
    /// Linear scan for the chat matching the (session, user, channel) triple.
    pub fn find_chat(&self, key: &ChatKey) -> Option<&ChatSpec> {
        self.chats.iter().find(|c| c.matches(key))
    }

    pub fn find_chat_mut(&mut self, key: &ChatKey) -> Option<&mut ChatSpec> {
        self.chats.iter_mut().find(|c| c.matches(key))
    }

    pub fn chat_by_id(&self, id: &str) -> Option<&ChatSpec> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn chat_by_id_mut(&mut self, id: &str) -> Option<&mut ChatSpec> {
        self.chats.iter_mut().find(|c| c.id == id)
    }

    /// Return the existing chat for `key` or create a fresh one (upsert).
    /// Only valid inside a write transaction, so two turns racing on the
    /// same triple cannot create duplicate chats.
    pub fn get_or_create_chat(&mut self, key: &ChatKey) -> &mut ChatSpec {
        if let Some(idx) = self.chats.iter().position(|c| c.matches(key)) {
            return &mut self.chats[idx];
        }
        debug!(key = %key, "creating chat");
        let chat = ChatSpec::new(key);
        self.histories.insert(chat.id.clone(), Vec::new());
        self.chats.push(chat);
        self.chats.last_mut().expect("chat just pushed")
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    pub fn history(&self, chat_id: &str) -> &[RuntimeMessage] {
        self.histories
            .get(chat_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Append one message. Message ids must be unique within a chat; the
    /// history itself is append-only.
    pub fn append_message(&mut self, chat_id: &str, message: RuntimeMessage) -> Result<()> {
        if self.chat_by_id(chat_id).is_none() {
            return Err(StoreError::ChatNotFound {
                id: chat_id.to_string(),
            });
        }
        let history = self.histories.entry(chat_id.to_string()).or_default();
        if history.iter().any(|m| m.id == message.id) {
            return Err(StoreError::DuplicateMessage {
                chat_id: chat_id.to_string(),
                message_id: message.id,
            });
        }
        history.push(message);
        Ok(())
    }

    /// Drop the stored context of the chat matching `key`, if any.
    /// Returns whether a chat was found.
    pub fn clear_history(&mut self, key: &ChatKey) -> bool {
        let Some(chat) = self.find_chat_mut(key) else {
            return false;
        };
        chat.touch();
        let id = chat.id.clone();
        self.histories.insert(id, Vec::new());
        true
    }
}

/// Process-wide conversation state behind scoped transactions.
///
/// `read` sees a consistent snapshot with no partial writes from concurrent
/// writers. `write` has exclusive mutation rights and commits everything the
/// closure did, or discards everything when the closure returns `Err`.
/// Rollback is structural: the closure runs against a copy that only
/// replaces the live state on success.
pub struct StateStore {
    inner: RwLock<StoreState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreState::default()),
        }
    }

    /// Run `f` against a consistent snapshot of the state.
    #[instrument(skip_all)]
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T> {
        let state = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&state))
    }

    /// Run `f` with exclusive mutation rights. Commits on `Ok`, discards all
    /// changes and propagates the error on `Err`.
    #[instrument(skip_all)]
    pub fn write<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let mut draft = state.clone();
        let out = f(&mut draft)?;
        *state = draft;
        Ok(out)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_core::types::Role;

    fn key(n: &str) -> ChatKey {
        ChatKey::new("s1", n, "console")
    }

    #[test]
    fn write_commits_on_ok() {
        let store = StateStore::new();
        let id = store
            .write(|s| {
                let chat = s.get_or_create_chat(&key("u1"));
                Ok(chat.id.clone())
            })
            .unwrap();

        store
            .read(|s| {
                assert_eq!(s.chat_count(), 1);
                assert!(s.chat_by_id(&id).is_some());
            })
            .unwrap();
    }

    #[test]
    fn write_rolls_back_on_err() {
        let store = StateStore::new();
        let result: Result<()> = store.write(|s| {
            s.get_or_create_chat(&key("u1"));
            Err(StoreError::Aborted("boom".into()))
        });
        assert!(result.is_err());
        store.read(|s| assert_eq!(s.chat_count(), 0)).unwrap();
    }

    #[test]
    fn duplicate_message_id_is_rejected() {
        let store = StateStore::new();
        let err = store.write(|s| {
            let id = s.get_or_create_chat(&key("u1")).id.clone();
            let msg = RuntimeMessage::text(Role::User, "hi");
            s.append_message(&id, msg.clone())?;
            s.append_message(&id, msg)
        });
        assert!(matches!(err, Err(StoreError::DuplicateMessage { .. })));
        // The whole transaction rolled back — not even the first append.
        store
            .read(|s| assert_eq!(s.chat_count(), 0))
            .unwrap();
    }

    #[test]
    fn get_or_create_is_idempotent_per_triple() {
        let store = StateStore::new();
        let (a, b) = store
            .write(|s| {
                let a = s.get_or_create_chat(&key("u1")).id.clone();
                let b = s.get_or_create_chat(&key("u1")).id.clone();
                Ok((a, b))
            })
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_writers_on_distinct_triples_never_merge() {
        let store = std::sync::Arc::new(StateStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let k = ChatKey::new("s1", format!("u{i}"), "console");
                for _ in 0..20 {
                    store
                        .write(|s| {
                            let id = s.get_or_create_chat(&k).id.clone();
                            s.append_message(&id, RuntimeMessage::text(Role::User, "hi"))
                        })
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        store
            .read(|s| {
                assert_eq!(s.chat_count(), 8);
                for i in 0..8 {
                    let k = ChatKey::new("s1", format!("u{i}"), "console");
                    let id = s.find_chat(&k).unwrap().id.clone();
                    assert_eq!(s.history(&id).len(), 20);
                }
            })
            .unwrap();
    }

    #[test]
    fn clear_history_keeps_the_chat() {
        let store = StateStore::new();
        let id = store
            .write(|s| {
                let id = s.get_or_create_chat(&key("u1")).id.clone();
                s.append_message(&id, RuntimeMessage::text(Role::User, "hi"))?;
                Ok(id)
            })
            .unwrap();

        store
            .write(|s| {
                assert!(s.clear_history(&key("u1")));
                Ok(())
            })
            .unwrap();

        store
            .read(|s| {
                assert_eq!(s.chat_count(), 1);
                assert!(s.history(&id).is_empty());
            })
            .unwrap();
    }
}
