use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Per-source size cap (characters). Oversized instruction files are tail-cut
/// so one runaway file cannot dominate the prompt.
const MAX_SOURCE_CHARS: usize = 20_000;

/// Supplies raw instruction text by source identifier.
///
/// `None` means the source is unavailable; whether that is fatal depends on
/// whether the requesting layer stage is required.
pub trait LayerSource: Send + Sync {
    fn load(&self, source: &str) -> Option<String>;
}

/// Reads instruction layers from `<dir>/<source>.md`.
///
/// Source identifiers may carry path segments (e.g. `tasks/review`), which
/// map to subdirectories.
pub struct FsLayerSource {
    dir: PathBuf,
}

impl FsLayerSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LayerSource for FsLayerSource {
    fn load(&self, source: &str) -> Option<String> {
        let path = self.dir.join(format!("{source}.md"));
        read_capped(&path)
    }
}

fn read_capped(path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read layer source");
            return None;
        }
    };
    if content.trim().is_empty() {
        return None;
    }
    if content.chars().count() > MAX_SOURCE_CHARS {
        return Some(content.chars().take(MAX_SOURCE_CHARS).collect());
    }
    Some(content)
}

/// In-memory layer source, used in tests and for embedded defaults.
#[derive(Debug, Clone, Default)]
pub struct MapLayerSource {
    entries: HashMap<String, String>,
}

impl MapLayerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(source.into(), content.into());
        self
    }

    pub fn insert(&mut self, source: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(source.into(), content.into());
    }
}

impl LayerSource for MapLayerSource {
    fn load(&self, source: &str) -> Option<String> {
        self.entries
            .get(source)
            .filter(|c| !c.trim().is_empty())
            .cloned()
    }
}
