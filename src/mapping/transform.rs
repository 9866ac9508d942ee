//! Applies a mapping document to the objects of a source store.

use super::document::{EntityMapping, MappingDocument, ValueRule};
use crate::core::{MigrationError, Result};
use crate::schema::{EntityDefinition, SchemaVersion};
use crate::store::StoredObject;
use std::collections::HashMap;
use uuid::Uuid;

/// Number of source objects processed between progress callbacks.
pub const PROGRESS_INTERVAL: usize = 64;

const SPLIT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x2b7e_9c41_5d08_4f6a_b3e2_81c0_d4a9_6e17);

/// Transforms `objects` from `source` into `destination` following `document`.
///
/// Relationships are re-associated through the source object ids, so a
/// reference to a split object points at the split part whose entity the
/// destination relationship expects. `on_progress(done, total)` is called
/// periodically; an error from it aborts the transformation.
pub fn transform_objects<F>(
    objects: &[StoredObject],
    document: &MappingDocument,
    source: &SchemaVersion,
    destination: &SchemaVersion,
    mut on_progress: F,
) -> Result<Vec<StoredObject>>
where
    F: FnMut(usize, usize) -> Result<()>,
{
    document.check_against(source, destination)?;

    let mut mappings_by_source: HashMap<&str, Vec<&EntityMapping>> = HashMap::new();
    for mapping in &document.entities {
        for src_entity in &mapping.source_entities {
            mappings_by_source
                .entry(src_entity.as_str())
                .or_default()
                .push(mapping);
        }
    }

    let total = objects.len();
    let mut produced: Vec<StoredObject> = Vec::with_capacity(total);
    // destination index -> (source object, entity mapping)
    let mut origins: Vec<(&StoredObject, &EntityMapping)> = Vec::with_capacity(total);
    // source id -> [(destination entity, destination id)]
    let mut associations: HashMap<&str, Vec<(&str, String)>> = HashMap::with_capacity(total);

    for (index, object) in objects.iter().enumerate() {
        if index % PROGRESS_INTERVAL == 0 {
            on_progress(index, total)?;
        }

        let Some(mappings) = mappings_by_source.get(object.entity.as_str()) else {
            if !document.drops(&object.entity) {
                return Err(MigrationError::Validation(format!(
                    "object '{}' has entity '{}' which the mapping neither maps nor drops",
                    object.id, object.entity
                )));
            }
            // references to dropped objects resolve to nothing
            associations.entry(object.id.as_str()).or_default();
            continue;
        };
        let split = mappings.len() > 1;

        for &mapping in mappings {
            let dst_entity = destination
                .entity(&mapping.destination_entity)
                .ok_or_else(|| {
                    MigrationError::InvalidMapping(format!(
                        "unknown destination entity '{}'",
                        mapping.destination_entity
                    ))
                })?;

            let id = if split {
                Uuid::new_v5(
                    &SPLIT_ID_NAMESPACE,
                    format!("{}/{}", object.id, mapping.name).as_bytes(),
                )
                .to_string()
            } else {
                object.id.clone()
            };

            let attributes = map_attributes(object, mapping, dst_entity);
            associations
                .entry(object.id.as_str())
                .or_default()
                .push((mapping.destination_entity.as_str(), id.clone()));
            produced.push(StoredObject {
                id,
                entity: mapping.destination_entity.clone(),
                attributes,
                relationships: Default::default(),
            });
            origins.push((object, mapping));
        }
    }

    for (produced_object, (object, mapping)) in produced.iter_mut().zip(origins) {
        let Some(dst_entity) = destination.entity(&mapping.destination_entity) else {
            continue;
        };
        for rel_mapping in &mapping.relationships {
            let Some(dst_rel) = dst_entity.relationship(&rel_mapping.destination) else {
                continue;
            };
            let Some(source_targets) = object.relationships.get(&rel_mapping.source) else {
                continue;
            };

            let mut targets = Vec::with_capacity(source_targets.len());
            for target in source_targets {
                let associated = associations.get(target.as_str()).ok_or_else(|| {
                    MigrationError::Validation(format!(
                        "object '{}' references missing object '{}' through '{}'",
                        object.id, target, rel_mapping.source
                    ))
                })?;
                targets.extend(
                    associated
                        .iter()
                        .filter(|(entity, _)| *entity == dst_rel.destination)
                        .map(|(_, id)| id.clone()),
                );
            }
            produced_object
                .relationships
                .insert(rel_mapping.destination.clone(), targets);
        }
    }

    on_progress(total, total)?;
    Ok(produced)
}

fn map_attributes(
    object: &StoredObject,
    mapping: &EntityMapping,
    dst_entity: &EntityDefinition,
) -> serde_json::Map<String, serde_json::Value> {
    let mut attributes = serde_json::Map::new();

    for attr_mapping in &mapping.attributes {
        let fallback = dst_entity
            .attribute(&attr_mapping.destination)
            .and_then(|attr| attr.default.clone());
        let mut value = evaluate(&attr_mapping.rule, object, fallback.as_ref());
        if value.is_null()
            && let Some(default) = fallback
        {
            value = default;
        }
        if !value.is_null() {
            attributes.insert(attr_mapping.destination.clone(), value);
        }
    }

    // unmapped destination attributes still get their defaults
    for attr in &dst_entity.attributes {
        if attributes.contains_key(&attr.name) {
            continue;
        }
        if let Some(default) = &attr.default
            && !mapping.attributes.iter().any(|m| m.destination == attr.name)
        {
            attributes.insert(attr.name.clone(), default.clone());
        }
    }

    attributes
}

fn evaluate(
    rule: &ValueRule,
    object: &StoredObject,
    destination_default: Option<&serde_json::Value>,
) -> serde_json::Value {
    use serde_json::Value as J;

    match rule {
        ValueRule::Source { attribute } => object.attribute(attribute).cloned().unwrap_or(J::Null),
        ValueRule::Constant { value } => value.clone(),
        ValueRule::Default => destination_default.cloned().unwrap_or(J::Null),
        ValueRule::Concat {
            attributes,
            separator,
        } => {
            let parts: Vec<String> = attributes
                .iter()
                .filter_map(|name| object.attribute(name))
                .filter(|value| !value.is_null())
                .map(|value| match value {
                    J::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            if parts.is_empty() {
                J::Null
            } else {
                J::String(parts.join(separator))
            }
        }
        ValueRule::SplitPart {
            attribute,
            separator,
            index,
        } => match object.attribute(attribute) {
            Some(J::String(s)) if !separator.is_empty() => s
                .split(separator.as_str())
                .nth(*index)
                .map(|part| J::String(part.to_string()))
                .unwrap_or(J::Null),
            _ => J::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{AttributeMapping, EntityMapping, MappingDocument};
    use crate::schema::{
        AttributeDefinition, AttributeKind, EntityDefinition, RelationshipDefinition,
        SchemaDefinition,
    };
    use serde_json::json;

    fn no_progress(_: usize, _: usize) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_split_entity_produces_one_object_per_mapping() {
        // v1: Person{name, street} ; v2: Person{name} -> Address{street}
        let v1 = SchemaVersion::new(SchemaDefinition::new("v1").with_entity(
            EntityDefinition::new("Person")
                .with_attribute(AttributeDefinition::new("name", AttributeKind::String))
                .with_attribute(AttributeDefinition::new("street", AttributeKind::String)),
        ));
        let v2 = SchemaVersion::new(
            SchemaDefinition::new("v2")
                .with_entity(
                    EntityDefinition::new("Person")
                        .with_attribute(AttributeDefinition::new("name", AttributeKind::String))
                        .with_relationship(RelationshipDefinition::to_one("address", "Address").optional()),
                )
                .with_entity(
                    EntityDefinition::new("Address")
                        .with_attribute(AttributeDefinition::new("street", AttributeKind::String)),
                ),
        );

        let doc = MappingDocument::new(&v1, &v2)
            .with_entity(EntityMapping::new("Person", "Address").copy_attribute("street"))
            .with_entity(EntityMapping::new("Person", "Person").copy_attribute("name"));

        let objects = vec![
            StoredObject::new("Person")
                .with_id("p1")
                .with_attribute("name", json!("Ada"))
                .with_attribute("street", json!("Main St")),
        ];
        let produced = transform_objects(&objects, &doc, &v1, &v2, no_progress).unwrap();
        assert_eq!(produced.len(), 2);
        let address = produced.iter().find(|o| o.entity == "Address").unwrap();
        assert_eq!(address.attribute("street"), Some(&json!("Main St")));
        assert_ne!(address.id, "p1");
        let person = produced.iter().find(|o| o.entity == "Person").unwrap();
        assert_eq!(person.attribute("name"), Some(&json!("Ada")));
        assert!(person.attribute("street").is_none());
    }

    #[test]
    fn test_merge_and_relationship_remap() {
        let v1 = SchemaVersion::new(
            SchemaDefinition::new("v1")
                .with_entity(
                    EntityDefinition::new("Novel")
                        .with_attribute(AttributeDefinition::new("title", AttributeKind::String))
                        .with_relationship(RelationshipDefinition::to_one("writer", "Author")),
                )
                .with_entity(
                    EntityDefinition::new("Essay")
                        .with_attribute(AttributeDefinition::new("title", AttributeKind::String))
                        .with_relationship(RelationshipDefinition::to_one("writer", "Author")),
                )
                .with_entity(
                    EntityDefinition::new("Author")
                        .with_attribute(AttributeDefinition::new("first", AttributeKind::String))
                        .with_attribute(AttributeDefinition::new("last", AttributeKind::String)),
                ),
        );
        let v2 = SchemaVersion::new(
            SchemaDefinition::new("v2")
                .with_entity(
                    EntityDefinition::new("Work")
                        .with_attribute(AttributeDefinition::new("title", AttributeKind::String))
                        .with_attribute(AttributeDefinition::new("kind", AttributeKind::String).optional())
                        .with_relationship(RelationshipDefinition::to_one("author", "Writer")),
                )
                .with_entity(
                    EntityDefinition::new("Writer")
                        .with_attribute(AttributeDefinition::new("full_name", AttributeKind::String)),
                ),
        );

        let doc = MappingDocument::new(&v1, &v2)
            .with_entity(
                EntityMapping::merging(["Novel", "Essay"], "Work")
                    .copy_attribute("title")
                    .with_relationship("author", "writer"),
            )
            .with_entity(EntityMapping::new("Author", "Writer").with_attribute(
                AttributeMapping::with_rule(
                    "full_name",
                    ValueRule::Concat {
                        attributes: vec!["first".to_string(), "last".to_string()],
                        separator: " ".to_string(),
                    },
                ),
            ));

        let objects = vec![
            StoredObject::new("Author")
                .with_id("a1")
                .with_attribute("first", json!("Frank"))
                .with_attribute("last", json!("Herbert")),
            StoredObject::new("Novel")
                .with_id("n1")
                .with_attribute("title", json!("Dune"))
                .with_relationship("writer", ["a1"]),
            StoredObject::new("Essay")
                .with_id("e1")
                .with_attribute("title", json!("On Deserts"))
                .with_relationship("writer", ["a1"]),
        ];

        let mut calls = Vec::new();
        let produced = transform_objects(&objects, &doc, &v1, &v2, |done, total| {
            calls.push((done, total));
            Ok(())
        })
        .unwrap();

        assert_eq!(produced.len(), 3);
        let writer = produced.iter().find(|o| o.id == "a1").unwrap();
        assert_eq!(writer.entity, "Writer");
        assert_eq!(writer.attribute("full_name"), Some(&json!("Frank Herbert")));
        for id in ["n1", "e1"] {
            let work = produced.iter().find(|o| o.id == id).unwrap();
            assert_eq!(work.entity, "Work");
            assert_eq!(work.relationships["author"], vec!["a1".to_string()]);
        }
        assert_eq!(calls.last(), Some(&(3, 3)));
    }

    #[test]
    fn test_split_part_and_defaults() {
        let v1 = SchemaVersion::new(SchemaDefinition::new("v1").with_entity(
            EntityDefinition::new("Contact")
                .with_attribute(AttributeDefinition::new("name", AttributeKind::String)),
        ));
        let v2 = SchemaVersion::new(SchemaDefinition::new("v2").with_entity(
            EntityDefinition::new("Contact")
                .with_attribute(AttributeDefinition::new("first", AttributeKind::String))
                .with_attribute(AttributeDefinition::new("last", AttributeKind::String).with_default(json!("?")))
                .with_attribute(AttributeDefinition::new("vip", AttributeKind::Boolean).with_default(json!(false))),
        ));
        let doc = MappingDocument::new(&v1, &v2).with_entity(
            EntityMapping::new("Contact", "Contact")
                .with_attribute(AttributeMapping::with_rule(
                    "first",
                    ValueRule::SplitPart {
                        attribute: "name".to_string(),
                        separator: " ".to_string(),
                        index: 0,
                    },
                ))
                .with_attribute(AttributeMapping::with_rule(
                    "last",
                    ValueRule::SplitPart {
                        attribute: "name".to_string(),
                        separator: " ".to_string(),
                        index: 1,
                    },
                )),
        );
        let objects = vec![StoredObject::new("Contact").with_attribute("name", json!("Cher"))];
        let produced = transform_objects(&objects, &doc, &v1, &v2, no_progress).unwrap();
        assert_eq!(produced[0].attribute("first"), Some(&json!("Cher")));
        assert_eq!(produced[0].attribute("last"), Some(&json!("?")));
        assert_eq!(produced[0].attribute("vip"), Some(&json!(false)));
    }

    #[test]
    fn test_only_explicitly_dropped_entities_lose_objects() {
        let v1 = SchemaVersion::new(
            SchemaDefinition::new("v1")
                .with_entity(
                    EntityDefinition::new("Book")
                        .with_attribute(AttributeDefinition::new("title", AttributeKind::String))
                        .with_relationship(RelationshipDefinition::to_many("notes", "Note").optional()),
                )
                .with_entity(
                    EntityDefinition::new("Note")
                        .with_attribute(AttributeDefinition::new("text", AttributeKind::String)),
                ),
        );
        let v2 = SchemaVersion::new(SchemaDefinition::new("v2").with_entity(
            EntityDefinition::new("Book")
                .with_attribute(AttributeDefinition::new("title", AttributeKind::String)),
        ));
        let objects = vec![
            StoredObject::new("Book")
                .with_id("b1")
                .with_attribute("title", json!("Dune"))
                .with_relationship("notes", ["n1"]),
            StoredObject::new("Note")
                .with_id("n1")
                .with_attribute("text", json!("reread")),
        ];

        let partial = MappingDocument::new(&v1, &v2)
            .with_entity(EntityMapping::new("Book", "Book").copy_attribute("title"));
        let err = transform_objects(&objects, &partial, &v1, &v2, no_progress).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidMapping(_)));

        let produced =
            transform_objects(&objects, &partial.dropping("Note"), &v1, &v2, no_progress).unwrap();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].id, "b1");
    }

    #[test]
    fn test_progress_error_aborts() {
        let v1 = SchemaVersion::new(
            SchemaDefinition::new("v1").with_entity(EntityDefinition::new("Book")),
        );
        let doc = MappingDocument::new(&v1, &v1).with_entity(EntityMapping::new("Book", "Book"));
        let objects = vec![StoredObject::new("Book")];
        let err = transform_objects(&objects, &doc, &v1, &v1, |_, _| Err(MigrationError::Cancelled))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Cancelled));
    }
}
