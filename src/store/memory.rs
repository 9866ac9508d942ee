use super::contents::StoreContents;
use super::engine::{StoreEngine, StoreKind};
use crate::core::{MigrationError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Stores kept in process memory, keyed by location.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreEngine {
    stores: Arc<Mutex<HashMap<PathBuf, StoreContents>>>,
}

impl MemoryStoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locations currently holding a store, sorted.
    pub fn locations(&self) -> Result<Vec<PathBuf>> {
        let mut locations: Vec<_> = self.stores.lock()?.keys().cloned().collect();
        locations.sort();
        Ok(locations)
    }
}

#[async_trait]
impl StoreEngine for MemoryStoreEngine {
    fn kind(&self) -> StoreKind {
        StoreKind::InMemory
    }

    async fn exists(&self, location: &Path) -> Result<bool> {
        Ok(self.stores.lock()?.contains_key(location))
    }

    async fn load(&self, location: &Path) -> Result<StoreContents> {
        self.stores
            .lock()?
            .get(location)
            .cloned()
            .ok_or_else(|| {
                MigrationError::Store(format!("store '{}' does not exist", location.display()))
            })
    }

    async fn write(&self, location: &Path, contents: &StoreContents) -> Result<()> {
        self.stores
            .lock()?
            .insert(location.to_path_buf(), contents.clone());
        Ok(())
    }

    async fn replace(&self, target: &Path, replacement: &Path) -> Result<()> {
        let mut stores = self.stores.lock()?;
        let contents = stores.remove(replacement).ok_or_else(|| {
            MigrationError::Store(format!("store '{}' does not exist", replacement.display()))
        })?;
        stores.insert(target.to_path_buf(), contents);
        Ok(())
    }

    async fn destroy(&self, location: &Path) -> Result<()> {
        self.stores.lock()?.remove(location);
        Ok(())
    }
}
