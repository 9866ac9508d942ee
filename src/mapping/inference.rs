use super::document::{
    AttributeMapping, EntityMapping, MappingDocument, MappingOrigin, RelationshipMapping,
    ValueRule,
};
use crate::core::{MigrationError, Result};
use crate::schema::{SchemaComparison, SchemaVersion, compare};

/// Infers a mapping when the two versions are structurally compatible.
pub fn infer_mapping(source: &SchemaVersion, destination: &SchemaVersion) -> Result<MappingDocument> {
    match compare(source.definition(), destination.definition()) {
        SchemaComparison::Compatible(correspondences) => {
            let entities = correspondences
                .into_iter()
                .map(|entity| EntityMapping {
                    name: format!("{}To{}", entity.source, entity.destination),
                    source_entities: vec![entity.source],
                    destination_entity: entity.destination,
                    attributes: entity
                        .attributes
                        .into_iter()
                        .map(|attr| AttributeMapping {
                            destination: attr.destination,
                            rule: match attr.source {
                                Some(attribute) => ValueRule::Source { attribute },
                                None => ValueRule::Default,
                            },
                        })
                        .collect(),
                    relationships: entity
                        .relationships
                        .into_iter()
                        .filter_map(|rel| {
                            rel.source.map(|source| RelationshipMapping {
                                destination: rel.destination,
                                source,
                            })
                        })
                        .collect(),
                })
                .collect();

            Ok(MappingDocument {
                source: source.identity().to_string(),
                destination: destination.identity().to_string(),
                origin: MappingOrigin::Inferred,
                entities,
                dropped_entities: Vec::new(),
            })
        }
        SchemaComparison::Ambiguous { entity, candidates } => {
            Err(MigrationError::AmbiguousMapping {
                from: source.name().to_string(),
                to: destination.name().to_string(),
                entity,
                candidates,
            })
        }
        SchemaComparison::Incompatible(reason) => Err(MigrationError::NoMappingFound {
            from: source.name().to_string(),
            to: destination.name().to_string(),
            reason,
        }),
    }
}
