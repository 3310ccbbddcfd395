use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::channel::{Channel, DispatchConfig};
use crate::error::ChannelError;

struct ChannelEntry {
    channel: Arc<dyn Channel>,
    config: DispatchConfig,
}

/// A resolved dispatch target: the adapter, its config, and the canonical
/// channel name (after alias resolution).
pub struct ResolvedChannel {
    pub channel: Arc<dyn Channel>,
    pub config: DispatchConfig,
    pub canonical_name: String,
}

impl std::fmt::Debug for ResolvedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedChannel")
            .field("channel", &self.channel.name())
            .field("config", &self.config)
            .field("canonical_name", &self.canonical_name)
            .finish()
    }
}

/// Maps requested channel names to registered adapters.
///
/// Names are case-insensitive; aliases let transports use legacy names
/// (e.g. `"terminal"` → `"console"`).
pub struct ChannelRegistry {
    entries: HashMap<String, ChannelEntry>,
    aliases: HashMap<String, String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Register a channel adapter under its canonical name.
    ///
    /// If a channel with the same name is already registered it is replaced.
    pub fn register(&mut self, channel: Arc<dyn Channel>, config: DispatchConfig) {
        let name = channel.name().to_lowercase();
        info!(channel = %name, "registering channel adapter");
        self.entries.insert(name, ChannelEntry { channel, config });
    }

    /// Register an alternate name for an already-canonical channel name.
    pub fn alias(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.aliases
            .insert(from.into().to_lowercase(), to.into().to_lowercase());
    }

    /// Resolve a requested channel name to a dispatch target.
    pub fn resolve(&self, name: &str) -> Result<ResolvedChannel, ChannelError> {
        let requested = name.trim().to_lowercase();
        let canonical = self
            .aliases
            .get(&requested)
            .cloned()
            .unwrap_or(requested);

        let entry = self
            .entries
            .get(&canonical)
            .ok_or_else(|| ChannelError::NotFound {
                name: name.to_string(),
            })?;
        entry.channel.validate_config(&entry.config)?;

        Ok(ResolvedChannel {
            channel: Arc::clone(&entry.channel),
            config: entry.config.clone(),
            canonical_name: canonical,
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleChannel;

    fn registry() -> ChannelRegistry {
        let mut reg = ChannelRegistry::new();
        reg.register(Arc::new(ConsoleChannel::new()), DispatchConfig::default());
        reg.alias("terminal", "console");
        reg
    }

    #[test]
    fn resolves_canonical_and_aliased_names() {
        let reg = registry();
        assert_eq!(reg.resolve("console").unwrap().canonical_name, "console");
        assert_eq!(reg.resolve(" Terminal ").unwrap().canonical_name, "console");
    }

    #[test]
    fn names_lists_canonical_entries_sorted() {
        let reg = registry();
        // Aliases are not separate entries.
        assert_eq!(reg.names(), vec!["console"]);
    }

    #[test]
    fn unknown_channel_is_not_found() {
        let err = registry().resolve("qq").unwrap_err();
        assert!(matches!(err, ChannelError::NotFound { name } if name == "qq"));
    }
}
