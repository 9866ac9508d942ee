use super::contents::StoreContents;
use crate::core::{MigrationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Physical format of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    #[serde(rename = "json-file")]
    JsonFile,
    #[serde(rename = "msgpack-file")]
    MessagePackFile,
    #[serde(rename = "in-memory")]
    InMemory,
}

impl StoreKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::JsonFile => "json-file",
            Self::MessagePackFile => "msgpack-file",
            Self::InMemory => "in-memory",
        }
    }

    /// Guesses the kind from a file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Some(Self::JsonFile),
            Some("msgpack") | Some("mpk") => Some(Self::MessagePackFile),
            _ => None,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for StoreKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json-file" | "json" => Ok(Self::JsonFile),
            "msgpack-file" | "msgpack" => Ok(Self::MessagePackFile),
            "in-memory" | "memory" => Ok(Self::InMemory),
            other => Err(MigrationError::Store(format!("unknown store kind '{other}'"))),
        }
    }
}

/// Reads, writes and swaps the physical stores of one kind.
#[async_trait]
pub trait StoreEngine: Send + Sync {
    fn kind(&self) -> StoreKind;

    async fn exists(&self, location: &Path) -> Result<bool>;

    async fn load(&self, location: &Path) -> Result<StoreContents>;

    async fn load_metadata(&self, location: &Path) -> Result<BTreeMap<String, String>> {
        Ok(self.load(location).await?.metadata)
    }

    /// Writes `contents` so that a reader sees either the old or the new store.
    async fn write(&self, location: &Path, contents: &StoreContents) -> Result<()>;

    /// Moves `replacement` over `target`.
    async fn replace(&self, target: &Path, replacement: &Path) -> Result<()>;

    /// Removes the store at `location`. Missing stores are not an error.
    async fn destroy(&self, location: &Path) -> Result<()>;

    /// Key under which migrations of `location` are serialized.
    ///
    /// Two spellings of one store must produce the same key.
    async fn lock_key(&self, location: &Path) -> Result<PathBuf> {
        Ok(normalize_location(location))
    }

    /// A fresh location next to `anchor` for an intermediate store.
    fn scratch_location(&self, anchor: &Path) -> PathBuf {
        let file_name = anchor
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        anchor.with_file_name(format!(".{}.{}.scratch", file_name, Uuid::new_v4()))
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
pub fn normalize_location(location: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in location.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Engines by kind.
#[derive(Clone)]
pub struct StoreEngines {
    engines: HashMap<StoreKind, Arc<dyn StoreEngine>>,
}

impl StoreEngines {
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// JSON, MessagePack and in-memory engines.
    pub fn with_defaults() -> Self {
        Self::empty()
            .with_engine(Arc::new(super::file::FileStoreEngine::json()))
            .with_engine(Arc::new(super::file::FileStoreEngine::message_pack()))
            .with_engine(Arc::new(super::memory::MemoryStoreEngine::new()))
    }

    /// Registers `engine`, replacing any engine of the same kind.
    pub fn with_engine(mut self, engine: Arc<dyn StoreEngine>) -> Self {
        self.engines.insert(engine.kind(), engine);
        self
    }

    pub fn engine(&self, kind: StoreKind) -> Result<Arc<dyn StoreEngine>> {
        self.engines
            .get(&kind)
            .cloned()
            .ok_or_else(|| MigrationError::Store(format!("no engine registered for '{kind}'")))
    }
}

impl Default for StoreEngines {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for StoreEngines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.engines.keys().map(StoreKind::tag).collect();
        kinds.sort_unstable();
        f.debug_struct("StoreEngines").field("kinds", &kinds).finish()
    }
}
