use crate::core::{MigrationError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Registry of store lock keys with a migration underway.
///
/// Keys come from `StoreEngine::lock_key`, so one store reached through
/// different paths is held once.
///
/// Clones share the registry, so every executor built from one controller
/// sees the same set of held locations.
#[derive(Debug, Clone, Default)]
pub struct MigrationLocks {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MigrationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `location`, failing fast when it is already claimed.
    pub fn acquire(&self, location: &Path) -> Result<MigrationLockGuard> {
        let mut held = self.held.lock()?;
        if !held.insert(location.to_path_buf()) {
            return Err(MigrationError::MigrationInProgress(
                location.display().to_string(),
            ));
        }
        Ok(MigrationLockGuard {
            held: self.held.clone(),
            location: location.to_path_buf(),
        })
    }

    pub fn is_locked(&self, location: &Path) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(location))
            .unwrap_or(false)
    }
}

/// Releases its location when dropped.
#[derive(Debug)]
pub struct MigrationLockGuard {
    held: Arc<Mutex<HashSet<PathBuf>>>,
    location: PathBuf,
}

impl Drop for MigrationLockGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.location);
        }
    }
}
