//! Registry of every schema version known to the application.
//!
//! Definitions are loaded once, either from a models directory of `*.json`
//! files or from definitions built in code. After construction every call is
//! a pure lookup.

use super::model::SchemaDefinition;
use super::version::SchemaVersion;
use crate::core::{MigrationError, Result};
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SchemaVersionRegistry {
    /// Versions in enumeration order.
    versions: Vec<Arc<SchemaVersion>>,
    by_name: HashMap<String, usize>,
    by_identity: HashMap<String, usize>,
    /// Index of the last enumerated definition, which may be an alias.
    latest: usize,
}

impl SchemaVersionRegistry {
    /// Builds a registry from in-memory definitions.
    ///
    /// Any malformed definition fails the whole registry.
    pub fn from_definitions(definitions: Vec<SchemaDefinition>) -> Result<Self> {
        if definitions.is_empty() {
            return Err(MigrationError::SchemaLoad {
                path: "<memory>".to_string(),
                reason: "no schema definitions supplied".to_string(),
            });
        }

        let mut definitions = definitions;
        definitions.sort_by(|a, b| natural_cmp(&a.name, &b.name));

        let mut registry = Self {
            versions: Vec::new(),
            by_name: HashMap::new(),
            by_identity: HashMap::new(),
            latest: 0,
        };

        for definition in definitions {
            definition
                .check_well_formed()
                .map_err(|reason| MigrationError::SchemaLoad {
                    path: definition.name.clone(),
                    reason,
                })?;
            registry.insert(definition)?;
        }

        Ok(registry)
    }

    /// Loads every `*.json` schema definition in `models_dir`.
    pub fn load(models_dir: impl AsRef<Path>) -> Result<Self> {
        let models_dir = models_dir.as_ref();
        let entries = fs::read_dir(models_dir).map_err(|err| MigrationError::SchemaLoad {
            path: models_dir.display().to_string(),
            reason: err.to_string(),
        })?;

        let mut definitions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MigrationError::SchemaLoad {
                path: models_dir.display().to_string(),
                reason: err.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let raw = fs::read_to_string(&path).map_err(|err| MigrationError::SchemaLoad {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
            let definition: SchemaDefinition =
                serde_json::from_str(&raw).map_err(|err| MigrationError::SchemaLoad {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?;
            debug!("loaded schema '{}' from '{}'", definition.name, path.display());
            definitions.push(definition);
        }

        if definitions.is_empty() {
            return Err(MigrationError::SchemaLoad {
                path: models_dir.display().to_string(),
                reason: "directory contains no schema definitions".to_string(),
            });
        }

        Self::from_definitions(definitions)
    }

    fn insert(&mut self, definition: SchemaDefinition) -> Result<()> {
        if self.by_name.contains_key(&definition.name) {
            return Err(MigrationError::SchemaLoad {
                path: definition.name.clone(),
                reason: "duplicate schema version name".to_string(),
            });
        }

        let version = SchemaVersion::new(definition);
        if let Some(&existing) = self.by_identity.get(version.identity()) {
            warn!(
                "schema '{}' is structurally identical to '{}'; treating it as an alias",
                version.name(),
                self.versions[existing].name()
            );
            self.by_name.insert(version.name().to_string(), existing);
            self.latest = existing;
            return Ok(());
        }

        let index = self.versions.len();
        self.by_name.insert(version.name().to_string(), index);
        self.by_identity.insert(version.identity().to_string(), index);
        self.versions.push(Arc::new(version));
        self.latest = index;
        Ok(())
    }

    /// All distinct versions in enumeration order.
    pub fn all_versions(&self) -> &[Arc<SchemaVersion>] {
        &self.versions
    }

    pub fn version_named(&self, name: &str) -> Result<Arc<SchemaVersion>> {
        self.by_name
            .get(name)
            .map(|&index| self.versions[index].clone())
            .ok_or_else(|| MigrationError::VersionNotFound(name.to_string()))
    }

    pub fn version_with_identity(&self, identity: &str) -> Option<Arc<SchemaVersion>> {
        self.by_identity
            .get(identity)
            .map(|&index| self.versions[index].clone())
    }

    /// Enumeration position of a version, used for deterministic tie-breaks.
    pub fn position(&self, identity: &str) -> Option<usize> {
        self.by_identity.get(identity).copied()
    }

    /// The version of the last enumerated definition.
    ///
    /// When that definition reverts to an earlier structure, this is the
    /// version it aliases rather than the last distinct one.
    pub fn latest(&self) -> Arc<SchemaVersion> {
        self.versions[self.latest].clone()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Orders names so that embedded numbers compare numerically (`v2` < `v10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let mut l_digits = String::new();
                while let Some(c) = left.peek().copied().filter(char::is_ascii_digit) {
                    l_digits.push(c);
                    left.next();
                }
                let mut r_digits = String::new();
                while let Some(c) = right.peek().copied().filter(char::is_ascii_digit) {
                    r_digits.push(c);
                    right.next();
                }
                let l_trimmed = l_digits.trim_start_matches('0');
                let r_trimmed = r_digits.trim_start_matches('0');
                let ordering = l_trimmed
                    .len()
                    .cmp(&r_trimmed.len())
                    .then_with(|| l_trimmed.cmp(r_trimmed));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}
