use super::delegate::MappingDelegate;
use super::document::{EntityMapping, MappingDocument, MappingOrigin};
use super::inference::infer_mapping;
use crate::core::{MigrationError, Result};
use crate::schema::SchemaVersion;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Resolves the mapping document for one (source, destination) hop.
///
/// Delegated candidates are consulted first; inference is the fallback.
/// Successful resolutions are cached for the lifetime of the resolver,
/// which callers scope to one migration run.
pub struct MappingResolver {
    delegate: Option<Arc<dyn MappingDelegate>>,
    infer: bool,
    cache: Mutex<HashMap<(String, String), Arc<MappingDocument>>>,
}

impl MappingResolver {
    pub fn new(delegate: Option<Arc<dyn MappingDelegate>>) -> Self {
        Self {
            delegate,
            infer: true,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Disables inference so only delegated mappings are used.
    pub fn without_inference(mut self) -> Self {
        self.infer = false;
        self
    }

    pub fn with_inference(mut self, infer: bool) -> Self {
        self.infer = infer;
        self
    }

    pub fn resolve(
        &self,
        source: &SchemaVersion,
        destination: &SchemaVersion,
    ) -> Result<Arc<MappingDocument>> {
        let key = (
            source.identity().to_string(),
            destination.identity().to_string(),
        );
        if let Some(cached) = self.cache.lock()?.get(&key) {
            return Ok(cached.clone());
        }

        let document = Arc::new(self.resolve_uncached(source, destination)?);
        self.cache.lock()?.insert(key, document.clone());
        Ok(document)
    }

    fn resolve_uncached(
        &self,
        source: &SchemaVersion,
        destination: &SchemaVersion,
    ) -> Result<MappingDocument> {
        if let Some(delegate) = &self.delegate {
            let chosen = delegate
                .candidate_mappings(source)
                .into_iter()
                .find(|candidate| candidate.destination == destination.identity());
            if let Some(mut document) = chosen {
                document.check_against(source, destination)?;
                document.origin = MappingOrigin::Delegated;
                return Ok(document);
            }
        }

        if source == destination {
            return Ok(identity_mapping(source));
        }

        if !self.infer {
            return Err(MigrationError::NoMappingFound {
                from: source.name().to_string(),
                to: destination.name().to_string(),
                reason: "no delegated mapping and inference is disabled".to_string(),
            });
        }

        infer_mapping(source, destination)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

fn identity_mapping(version: &SchemaVersion) -> MappingDocument {
    MappingDocument {
        source: version.identity().to_string(),
        destination: version.identity().to_string(),
        origin: MappingOrigin::Inferred,
        entities: version
            .entities()
            .iter()
            .map(|entity| {
                let mut mapping = EntityMapping::new(entity.name.clone(), entity.name.clone());
                for attr in &entity.attributes {
                    mapping = mapping.copy_attribute(attr.name.clone());
                }
                for rel in &entity.relationships {
                    mapping = mapping.with_relationship(rel.name.clone(), rel.name.clone());
                }
                mapping
            })
            .collect(),
        dropped_entities: Vec::new(),
    }
}
