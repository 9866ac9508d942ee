//! Conformance checks of stored objects against a schema version.

use super::version::SchemaVersion;
use crate::core::{MigrationError, Result};
use crate::store::StoredObject;
use std::collections::{HashMap, HashSet};

/// Checks that every object conforms to `version`.
///
/// Reports the first violation found: unknown entities or properties,
/// values of the wrong kind, missing required values, to-one relationships
/// with several targets and references to missing or mistyped objects.
pub fn validate_objects(objects: &[StoredObject], version: &SchemaVersion) -> Result<()> {
    let mut entity_of: HashMap<&str, &str> = HashMap::with_capacity(objects.len());
    for object in objects {
        if entity_of
            .insert(object.id.as_str(), object.entity.as_str())
            .is_some()
        {
            return Err(violation(version, format!("duplicate object id '{}'", object.id)));
        }
    }

    for object in objects {
        let Some(entity) = version.entity(&object.entity) else {
            return Err(violation(
                version,
                format!("object '{}' has unknown entity '{}'", object.id, object.entity),
            ));
        };

        for name in object.attributes.keys() {
            if entity.attribute(name).is_none() {
                return Err(violation(
                    version,
                    format!("object '{}' has unknown attribute '{}.{}'", object.id, entity.name, name),
                ));
            }
        }
        for attr in &entity.attributes {
            match object.attribute(&attr.name) {
                Some(value) if !value.is_null() => {
                    if !attr.kind.accepts(value) {
                        return Err(violation(
                            version,
                            format!(
                                "object '{}' attribute '{}.{}' is not a valid {}",
                                object.id, entity.name, attr.name, attr.kind
                            ),
                        ));
                    }
                }
                _ if !attr.optional => {
                    return Err(violation(
                        version,
                        format!(
                            "object '{}' is missing required attribute '{}.{}'",
                            object.id, entity.name, attr.name
                        ),
                    ));
                }
                _ => {}
            }
        }

        for name in object.relationships.keys() {
            if entity.relationship(name).is_none() {
                return Err(violation(
                    version,
                    format!(
                        "object '{}' has unknown relationship '{}.{}'",
                        object.id, entity.name, name
                    ),
                ));
            }
        }
        for rel in &entity.relationships {
            let targets = object
                .relationships
                .get(&rel.name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if targets.is_empty() && !rel.optional {
                return Err(violation(
                    version,
                    format!(
                        "object '{}' is missing required relationship '{}.{}'",
                        object.id, entity.name, rel.name
                    ),
                ));
            }
            if !rel.to_many && targets.len() > 1 {
                return Err(violation(
                    version,
                    format!(
                        "object '{}' has {} targets for to-one relationship '{}.{}'",
                        object.id,
                        targets.len(),
                        entity.name,
                        rel.name
                    ),
                ));
            }

            let mut seen = HashSet::new();
            for target in targets {
                match entity_of.get(target.as_str()) {
                    Some(target_entity) if *target_entity == rel.destination => {}
                    Some(target_entity) => {
                        return Err(violation(
                            version,
                            format!(
                                "'{}.{}' of object '{}' points at a {} instead of a {}",
                                entity.name, rel.name, object.id, target_entity, rel.destination
                            ),
                        ));
                    }
                    None => {
                        return Err(violation(
                            version,
                            format!(
                                "'{}.{}' of object '{}' points at missing object '{}'",
                                entity.name, rel.name, object.id, target
                            ),
                        ));
                    }
                }
                if !seen.insert(target.as_str()) {
                    return Err(violation(
                        version,
                        format!(
                            "'{}.{}' of object '{}' lists '{}' twice",
                            entity.name, rel.name, object.id, target
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn violation(version: &SchemaVersion, detail: String) -> MigrationError {
    MigrationError::Validation(format!("{}: {}", version.name(), detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        AttributeDefinition, AttributeKind, EntityDefinition, RelationshipDefinition,
        SchemaDefinition,
    };
    use serde_json::json;

    fn library() -> SchemaVersion {
        SchemaVersion::new(
            SchemaDefinition::new("v1")
                .with_entity(
                    EntityDefinition::new("Book")
                        .with_attribute(AttributeDefinition::new("title", AttributeKind::String))
                        .with_attribute(AttributeDefinition::new("pages", AttributeKind::Integer).optional())
                        .with_relationship(RelationshipDefinition::to_one("author", "Author")),
                )
                .with_entity(
                    EntityDefinition::new("Author")
                        .with_attribute(AttributeDefinition::new("name", AttributeKind::String))
                        .with_relationship(RelationshipDefinition::to_many("books", "Book").optional()),
                ),
        )
    }

    fn author() -> StoredObject {
        StoredObject::new("Author")
            .with_id("a1")
            .with_attribute("name", json!("Frank Herbert"))
    }

    #[test]
    fn test_valid_objects_pass() {
        let objects = vec![
            author().with_relationship("books", ["b1"]),
            StoredObject::new("Book")
                .with_id("b1")
                .with_attribute("title", json!("Dune"))
                .with_relationship("author", ["a1"]),
        ];
        assert!(validate_objects(&objects, &library()).is_ok());
    }

    #[test]
    fn test_missing_required_attribute() {
        let objects = vec![
            author(),
            StoredObject::new("Book").with_id("b1").with_relationship("author", ["a1"]),
        ];
        let err = validate_objects(&objects, &library()).unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_wrong_kind_and_unknown_attribute() {
        let wrong_kind = vec![
            author(),
            StoredObject::new("Book")
                .with_id("b1")
                .with_attribute("title", json!("Dune"))
                .with_attribute("pages", json!("many"))
                .with_relationship("author", ["a1"]),
        ];
        assert!(validate_objects(&wrong_kind, &library()).is_err());

        let unknown = vec![author().with_attribute("born", json!(1920))];
        assert!(matches!(
            validate_objects(&unknown, &library()),
            Err(MigrationError::Validation(_))
        ));
    }

    #[test]
    fn test_relationship_targets_are_checked() {
        let dangling = vec![
            StoredObject::new("Book")
                .with_id("b1")
                .with_attribute("title", json!("Dune"))
                .with_relationship("author", ["a9"]),
        ];
        assert!(validate_objects(&dangling, &library()).is_err());

        let mistyped = vec![
            StoredObject::new("Book")
                .with_id("b1")
                .with_attribute("title", json!("Dune"))
                .with_relationship("author", ["b1"]),
        ];
        assert!(validate_objects(&mistyped, &library()).is_err());

        let two_authors = vec![
            author(),
            author().with_id("a2"),
            StoredObject::new("Book")
                .with_id("b1")
                .with_attribute("title", json!("Dune"))
                .with_relationship("author", ["a1", "a2"]),
        ];
        assert!(validate_objects(&two_authors, &library()).is_err());
    }
}
