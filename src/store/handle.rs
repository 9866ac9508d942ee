use super::contents::{STORE_FINGERPRINT_KEY, STORE_VERSION_NAME_KEY};
use super::engine::StoreKind;
use crate::core::{MigrationError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A reference to a persisted store plus the metadata last read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    location: PathBuf,
    kind: StoreKind,
    metadata: BTreeMap<String, String>,
}

impl Store {
    pub fn new(
        location: impl Into<PathBuf>,
        kind: StoreKind,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            location: location.into(),
            kind,
            metadata,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Identity of the schema version the store was last written with.
    pub fn fingerprint(&self) -> Result<&str> {
        self.metadata
            .get(STORE_FINGERPRINT_KEY)
            .map(String::as_str)
            .ok_or_else(|| {
                MigrationError::Store(format!(
                    "store '{}' has no '{}' metadata",
                    self.location.display(),
                    STORE_FINGERPRINT_KEY
                ))
            })
    }

    pub fn version_name(&self) -> Option<&str> {
        self.metadata.get(STORE_VERSION_NAME_KEY).map(String::as_str)
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location.display(), self.kind)
    }
}
