use crate::core::{MigrationError, Result};
use crate::schema::SchemaVersion;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key holding the identity of the schema a store was written with.
pub const STORE_FINGERPRINT_KEY: &str = "schema_fingerprint";
/// Metadata key holding the human-readable version name.
pub const STORE_VERSION_NAME_KEY: &str = "schema_version_name";
/// Metadata key holding the RFC 3339 time of the last write.
pub const STORE_WRITTEN_AT_KEY: &str = "written_at";

pub const STORE_FORMAT_VERSION: u16 = 1;

/// One persisted object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub entity: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Relationship name to ordered target object ids.
    #[serde(default)]
    pub relationships: BTreeMap<String, Vec<String>>,
}

impl StoredObject {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity: entity.into(),
            attributes: serde_json::Map::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_relationship<I, S>(mut self, name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships
            .insert(name.into(), targets.into_iter().map(Into::into).collect());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// Physical payload behind a store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreContents {
    pub format_version: u16,
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub objects: Vec<StoredObject>,
}

impl StoreContents {
    /// An empty store stamped with `version`.
    pub fn empty(version: &SchemaVersion) -> Self {
        let mut contents = Self {
            format_version: STORE_FORMAT_VERSION,
            metadata: BTreeMap::new(),
            objects: Vec::new(),
        };
        contents.stamp(version);
        contents
    }

    /// Records `version` as the schema the contents conform to.
    pub fn stamp(&mut self, version: &SchemaVersion) {
        self.metadata.insert(
            STORE_FINGERPRINT_KEY.to_string(),
            version.identity().to_string(),
        );
        self.metadata.insert(
            STORE_VERSION_NAME_KEY.to_string(),
            version.name().to_string(),
        );
        self.metadata
            .insert(STORE_WRITTEN_AT_KEY.to_string(), Utc::now().to_rfc3339());
    }

    pub fn fingerprint(&self) -> Result<&str> {
        self.metadata
            .get(STORE_FINGERPRINT_KEY)
            .map(String::as_str)
            .ok_or_else(|| {
                MigrationError::Store(format!(
                    "store metadata has no '{STORE_FINGERPRINT_KEY}' entry"
                ))
            })
    }

    pub fn objects_of<'a, 'e>(
        &'a self,
        entity: &'e str,
    ) -> impl Iterator<Item = &'a StoredObject> + use<'a, 'e> {
        self.objects.iter().filter(move |object| object.entity == entity)
    }

    pub fn object(&self, id: &str) -> Option<&StoredObject> {
        self.objects.iter().find(|object| object.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityDefinition, SchemaDefinition};

    #[test]
    fn test_objects_of_outlives_the_entity_name() {
        let version = SchemaVersion::new(
            SchemaDefinition::new("v1")
                .with_entity(EntityDefinition::new("Book"))
                .with_entity(EntityDefinition::new("Note")),
        );
        let mut contents = StoreContents::empty(&version);
        contents.objects = vec![
            StoredObject::new("Book").with_id("b1"),
            StoredObject::new("Note").with_id("n1"),
            StoredObject::new("Book").with_id("b2"),
        ];

        let books: Vec<&StoredObject> = {
            let entity = String::from("Book");
            contents.objects_of(&entity).collect()
        };
        let ids: Vec<_> = books.iter().map(|object| object.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
        assert_eq!(contents.fingerprint().unwrap(), version.identity());
    }
}
