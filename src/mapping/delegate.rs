//! Caller hooks supplying mapping documents.

use super::document::{MappingDocument, MappingFile};
use crate::core::{MigrationError, Result};
use crate::schema::{SchemaVersion, SchemaVersionRegistry};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Supplies candidate mappings for a source version, in priority order.
pub trait MappingDelegate: Send + Sync {
    fn candidate_mappings(&self, source: &SchemaVersion) -> Vec<MappingDocument>;
}

impl<F> MappingDelegate for F
where
    F: Fn(&SchemaVersion) -> Vec<MappingDocument> + Send + Sync,
{
    fn candidate_mappings(&self, source: &SchemaVersion) -> Vec<MappingDocument> {
        self(source)
    }
}

/// A fixed list of documents, filtered by source identity.
#[derive(Debug, Clone, Default)]
pub struct StaticMappingDelegate {
    documents: Vec<MappingDocument>,
}

impl StaticMappingDelegate {
    pub fn new(documents: Vec<MappingDocument>) -> Self {
        Self { documents }
    }

    pub fn with_document(mut self, document: MappingDocument) -> Self {
        self.documents.push(document);
        self
    }
}

impl MappingDelegate for StaticMappingDelegate {
    fn candidate_mappings(&self, source: &SchemaVersion) -> Vec<MappingDocument> {
        self.documents
            .iter()
            .filter(|doc| doc.source == source.identity())
            .cloned()
            .collect()
    }
}

/// Mapping files loaded from a directory and bound to registry identities.
#[derive(Debug, Clone, Default)]
pub struct DirectoryMappingDelegate {
    by_source: HashMap<String, Vec<MappingDocument>>,
}

impl DirectoryMappingDelegate {
    pub fn load(dir: impl AsRef<Path>, registry: &SchemaVersionRegistry) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<_> = fs::read_dir(dir)
            .map_err(|err| {
                MigrationError::Io(format!(
                    "Failed to read mapping directory '{}': {}",
                    dir.display(),
                    err
                ))
            })?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .collect();
        // file name order is the priority order
        files.sort();

        let mut by_source: HashMap<String, Vec<MappingDocument>> = HashMap::new();
        for path in files {
            let raw = fs::read_to_string(&path).map_err(|err| {
                MigrationError::Io(format!(
                    "Failed to read mapping file '{}': {}",
                    path.display(),
                    err
                ))
            })?;
            let file: MappingFile = serde_json::from_str(&raw).map_err(|err| {
                MigrationError::InvalidMapping(format!("'{}': {}", path.display(), err))
            })?;

            let (source, destination) = match (
                registry.version_named(&file.source),
                registry.version_named(&file.destination),
            ) {
                (Ok(source), Ok(destination)) => (source, destination),
                _ => {
                    warn!(
                        "skipping mapping file '{}': versions '{}' -> '{}' are not registered",
                        path.display(),
                        file.source,
                        file.destination
                    );
                    continue;
                }
            };

            let document = file.bind(&source, &destination);
            document.check_against(&source, &destination)?;
            debug!(
                "loaded mapping '{}' -> '{}' from '{}'",
                source.name(),
                destination.name(),
                path.display()
            );
            by_source
                .entry(source.identity().to_string())
                .or_default()
                .push(document);
        }

        Ok(Self { by_source })
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MappingDelegate for DirectoryMappingDelegate {
    fn candidate_mappings(&self, source: &SchemaVersion) -> Vec<MappingDocument> {
        self.by_source
            .get(source.identity())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDefinition, AttributeKind, EntityDefinition, SchemaDefinition};
    use serde_json::json;

    fn registry() -> SchemaVersionRegistry {
        SchemaVersionRegistry::from_definitions(vec![
            SchemaDefinition::new("v1").with_entity(
                EntityDefinition::new("Book")
                    .with_attribute(AttributeDefinition::new("title", AttributeKind::String)),
            ),
            SchemaDefinition::new("v2").with_entity(
                EntityDefinition::new("Book")
                    .with_attribute(AttributeDefinition::new("title", AttributeKind::String))
                    .with_attribute(AttributeDefinition::new("author", AttributeKind::String)),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_directory_delegate_binds_names() {
        let dir = tempfile::tempdir().unwrap();
        let file = json!({
            "source": "v1",
            "destination": "v2",
            "entities": [{
                "name": "BookToBook",
                "source_entities": ["Book"],
                "destination_entity": "Book",
                "attributes": [
                    { "destination": "title", "rule": "source", "attribute": "title" },
                    { "destination": "author", "rule": "constant", "value": "" }
                ]
            }]
        });
        fs::write(dir.path().join("v1_to_v2.json"), file.to_string()).unwrap();
        fs::write(
            dir.path().join("v7_to_v8.json"),
            json!({ "source": "v7", "destination": "v8" }).to_string(),
        )
        .unwrap();

        let registry = registry();
        let delegate = DirectoryMappingDelegate::load(dir.path(), &registry).unwrap();
        assert_eq!(delegate.len(), 1);

        let v1 = registry.version_named("v1").unwrap();
        let candidates = delegate.candidate_mappings(&v1);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].destination, registry.version_named("v2").unwrap().identity());
    }

    #[test]
    fn test_closure_delegate() {
        let registry = registry();
        let delegate = |_: &SchemaVersion| Vec::<MappingDocument>::new();
        assert!(delegate.candidate_mappings(&registry.latest()).is_empty());
    }
}
