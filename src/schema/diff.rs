//! Structural comparison of two schema definitions.
//!
//! The comparison decides whether a mapping can be inferred without help
//! from the caller. Only additive changes and explicitly hinted renames are
//! accepted; anything that would drop data or require a guess is rejected.

use super::model::{EntityDefinition, SchemaDefinition};
use std::collections::{BTreeMap, HashMap, HashSet};

/// How one destination property is filled from the source entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyCorrespondence {
    pub destination: String,
    /// `None` when the property is new in the destination.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCorrespondence {
    pub source: String,
    pub destination: String,
    pub attributes: Vec<PropertyCorrespondence>,
    pub relationships: Vec<PropertyCorrespondence>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaComparison {
    Compatible(Vec<EntityCorrespondence>),
    Ambiguous {
        entity: String,
        candidates: Vec<String>,
    },
    Incompatible(String),
}

impl SchemaComparison {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible(_))
    }
}

pub fn compare(source: &SchemaDefinition, destination: &SchemaDefinition) -> SchemaComparison {
    let matches = match match_entities(source, destination) {
        Ok(matches) => matches,
        Err(comparison) => return comparison,
    };

    let mut correspondences = Vec::with_capacity(matches.len());
    for src_entity in &source.entities {
        let Some(dst_name) = matches.get(src_entity.name.as_str()) else {
            continue;
        };
        let Some(dst_entity) = destination.entity(dst_name) else {
            continue;
        };
        match compare_entity(src_entity, dst_entity, &matches) {
            Ok(correspondence) => correspondences.push(correspondence),
            Err(reason) => return SchemaComparison::Incompatible(reason),
        }
    }

    SchemaComparison::Compatible(correspondences)
}

/// Pairs every source entity with exactly one destination entity.
fn match_entities<'a>(
    source: &'a SchemaDefinition,
    destination: &'a SchemaDefinition,
) -> Result<HashMap<&'a str, &'a str>, SchemaComparison> {
    let mut matches: HashMap<&str, &str> = HashMap::new();
    let mut claimed: HashSet<&str> = HashSet::new();

    // Explicit rename hints win over equal names.
    let mut hinted: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for dst in &destination.entities {
        if let Some(previous) = dst.renaming_id.as_deref()
            && previous != dst.name
            && source.entity(previous).is_some()
        {
            hinted.entry(previous).or_default().push(dst.name.as_str());
        }
    }
    for (src_name, targets) in hinted {
        if targets.len() > 1 {
            return Err(SchemaComparison::Ambiguous {
                entity: src_name.to_string(),
                candidates: targets.iter().map(|t| t.to_string()).collect(),
            });
        }
        matches.insert(src_name, targets[0]);
        claimed.insert(targets[0]);
    }

    for src in &source.entities {
        if matches.contains_key(src.name.as_str()) {
            continue;
        }
        if let Some(dst) = destination.entity(&src.name)
            && !claimed.contains(dst.name.as_str())
        {
            matches.insert(src.name.as_str(), dst.name.as_str());
            claimed.insert(dst.name.as_str());
        }
    }

    // Remaining source entities may only be unhinted renames: a destination
    // entity with identical structure that nothing else claimed.
    let mut candidates_by_source: Vec<(&str, Vec<&str>)> = Vec::new();
    for src in &source.entities {
        if matches.contains_key(src.name.as_str()) {
            continue;
        }
        let candidates: Vec<&str> = destination
            .entities
            .iter()
            .filter(|dst| !claimed.contains(dst.name.as_str()))
            .filter(|dst| source.entity(&dst.name).is_none())
            .filter(|dst| same_shape(src, dst))
            .map(|dst| dst.name.as_str())
            .collect();
        candidates_by_source.push((src.name.as_str(), candidates));
    }

    for (src_name, candidates) in &candidates_by_source {
        match candidates.as_slice() {
            [] => {
                return Err(SchemaComparison::Incompatible(format!(
                    "entity '{src_name}' has no counterpart in '{}'",
                    destination.name
                )));
            }
            [single] => {
                let contested = candidates_by_source
                    .iter()
                    .filter(|(_, other)| other.contains(single))
                    .count();
                if contested > 1 {
                    return Err(SchemaComparison::Ambiguous {
                        entity: src_name.to_string(),
                        candidates: vec![single.to_string()],
                    });
                }
                matches.insert(*src_name, *single);
                claimed.insert(*single);
            }
            many => {
                return Err(SchemaComparison::Ambiguous {
                    entity: src_name.to_string(),
                    candidates: many.iter().map(|c| c.to_string()).collect(),
                });
            }
        }
    }

    Ok(matches)
}

fn same_shape(a: &EntityDefinition, b: &EntityDefinition) -> bool {
    let attrs = |entity: &EntityDefinition| {
        let mut shape: Vec<_> = entity
            .attributes
            .iter()
            .map(|attr| (attr.name.clone(), attr.kind, attr.optional))
            .collect();
        shape.sort();
        shape
    };
    let rels = |entity: &EntityDefinition| {
        let mut shape: Vec<_> = entity
            .relationships
            .iter()
            .map(|rel| (rel.name.clone(), rel.to_many, rel.optional))
            .collect();
        shape.sort();
        shape
    };
    attrs(a) == attrs(b) && rels(a) == rels(b)
}

fn compare_entity(
    src: &EntityDefinition,
    dst: &EntityDefinition,
    entity_matches: &HashMap<&str, &str>,
) -> Result<EntityCorrespondence, String> {
    let mut attributes = Vec::with_capacity(dst.attributes.len());
    let mut used_attrs = HashSet::new();

    for dst_attr in &dst.attributes {
        let src_attr = dst_attr
            .renaming_id
            .as_deref()
            .and_then(|previous| src.attribute(previous))
            .or_else(|| src.attribute(&dst_attr.name));

        match src_attr {
            Some(src_attr) => {
                if !used_attrs.insert(src_attr.name.as_str()) {
                    return Err(format!(
                        "attribute '{}.{}' is mapped more than once",
                        src.name, src_attr.name
                    ));
                }
                if src_attr.kind != dst_attr.kind {
                    return Err(format!(
                        "attribute '{}.{}' changes kind from {} to {}",
                        src.name, src_attr.name, src_attr.kind, dst_attr.kind
                    ));
                }
                if src_attr.optional && !dst_attr.can_be_absent() {
                    return Err(format!(
                        "attribute '{}.{}' becomes required without a default",
                        dst.name, dst_attr.name
                    ));
                }
                attributes.push(PropertyCorrespondence {
                    destination: dst_attr.name.clone(),
                    source: Some(src_attr.name.clone()),
                });
            }
            None => {
                if !dst_attr.can_be_absent() {
                    return Err(format!(
                        "new attribute '{}.{}' is required and has no default",
                        dst.name, dst_attr.name
                    ));
                }
                attributes.push(PropertyCorrespondence {
                    destination: dst_attr.name.clone(),
                    source: None,
                });
            }
        }
    }

    if let Some(dropped) = src
        .attributes
        .iter()
        .find(|attr| !used_attrs.contains(attr.name.as_str()))
    {
        return Err(format!(
            "attribute '{}.{}' would be dropped",
            src.name, dropped.name
        ));
    }

    let mut relationships = Vec::with_capacity(dst.relationships.len());
    let mut used_rels = HashSet::new();

    for dst_rel in &dst.relationships {
        let src_rel = dst_rel
            .renaming_id
            .as_deref()
            .and_then(|previous| src.relationship(previous))
            .or_else(|| src.relationship(&dst_rel.name));

        match src_rel {
            Some(src_rel) => {
                if !used_rels.insert(src_rel.name.as_str()) {
                    return Err(format!(
                        "relationship '{}.{}' is mapped more than once",
                        src.name, src_rel.name
                    ));
                }
                let mapped_target = entity_matches.get(src_rel.destination.as_str()).copied();
                if mapped_target != Some(dst_rel.destination.as_str()) {
                    return Err(format!(
                        "relationship '{}.{}' changes its target from '{}' to '{}'",
                        src.name, src_rel.name, src_rel.destination, dst_rel.destination
                    ));
                }
                if src_rel.to_many && !dst_rel.to_many {
                    return Err(format!(
                        "relationship '{}.{}' narrows from to-many to to-one",
                        src.name, src_rel.name
                    ));
                }
                if src_rel.optional && !dst_rel.optional {
                    return Err(format!(
                        "relationship '{}.{}' becomes required",
                        dst.name, dst_rel.name
                    ));
                }
                relationships.push(PropertyCorrespondence {
                    destination: dst_rel.name.clone(),
                    source: Some(src_rel.name.clone()),
                });
            }
            None => {
                if !dst_rel.optional {
                    return Err(format!(
                        "new relationship '{}.{}' is required",
                        dst.name, dst_rel.name
                    ));
                }
                relationships.push(PropertyCorrespondence {
                    destination: dst_rel.name.clone(),
                    source: None,
                });
            }
        }
    }

    if let Some(dropped) = src
        .relationships
        .iter()
        .find(|rel| !used_rels.contains(rel.name.as_str()))
    {
        return Err(format!(
            "relationship '{}.{}' would be dropped",
            src.name, dropped.name
        ));
    }

    Ok(EntityCorrespondence {
        source: src.name.clone(),
        destination: dst.name.clone(),
        attributes,
        relationships,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::{AttributeDefinition, AttributeKind, RelationshipDefinition};
    use serde_json::json;

    fn title() -> AttributeDefinition {
        AttributeDefinition::new("title", AttributeKind::String)
    }

    #[test]
    fn test_identical_schemas_are_compatible() {
        let schema = SchemaDefinition::new("v1")
            .with_entity(EntityDefinition::new("Book").with_attribute(title()));
        let comparison = compare(&schema, &schema.clone());
        let SchemaComparison::Compatible(entities) = comparison else {
            panic!("expected compatible");
        };
        assert_eq!(entities[0].attributes[0].source.as_deref(), Some("title"));
    }

    #[test]
    fn test_additive_optional_attribute_is_compatible() {
        let v1 = SchemaDefinition::new("v1")
            .with_entity(EntityDefinition::new("Book").with_attribute(title()));
        let v2 = SchemaDefinition::new("v2").with_entity(
            EntityDefinition::new("Book")
                .with_attribute(title())
                .with_attribute(AttributeDefinition::new("isbn", AttributeKind::String).optional()),
        );
        let SchemaComparison::Compatible(entities) = compare(&v1, &v2) else {
            panic!("expected compatible");
        };
        assert_eq!(entities[0].attributes[1].source, None);
    }

    #[test]
    fn test_required_attribute_without_default_is_incompatible() {
        let v1 = SchemaDefinition::new("v1")
            .with_entity(EntityDefinition::new("Book").with_attribute(title()));
        let v2 = SchemaDefinition::new("v2").with_entity(
            EntityDefinition::new("Book")
                .with_attribute(title())
                .with_attribute(AttributeDefinition::new("author", AttributeKind::String)),
        );
        assert!(matches!(compare(&v1, &v2), SchemaComparison::Incompatible(_)));

        let v2_default = SchemaDefinition::new("v2").with_entity(
            EntityDefinition::new("Book").with_attribute(title()).with_attribute(
                AttributeDefinition::new("author", AttributeKind::String).with_default(json!("")),
            ),
        );
        assert!(compare(&v1, &v2_default).is_compatible());
    }

    #[test]
    fn test_removed_attribute_is_incompatible() {
        let v1 = SchemaDefinition::new("v1").with_entity(
            EntityDefinition::new("Book")
                .with_attribute(title())
                .with_attribute(AttributeDefinition::new("isbn", AttributeKind::String)),
        );
        let v2 = SchemaDefinition::new("v2")
            .with_entity(EntityDefinition::new("Book").with_attribute(title()));
        assert!(matches!(compare(&v1, &v2), SchemaComparison::Incompatible(_)));
    }

    #[test]
    fn test_hinted_entity_rename() {
        let v1 = SchemaDefinition::new("v1")
            .with_entity(EntityDefinition::new("Volume").with_attribute(title()));
        let v2 = SchemaDefinition::new("v2").with_entity(
            EntityDefinition::new("Book")
                .renamed_from("Volume")
                .with_attribute(AttributeDefinition::new("name", AttributeKind::String).renamed_from("title")),
        );
        let SchemaComparison::Compatible(entities) = compare(&v1, &v2) else {
            panic!("expected compatible");
        };
        assert_eq!(entities[0].source, "Volume");
        assert_eq!(entities[0].destination, "Book");
        assert_eq!(entities[0].attributes[0].source.as_deref(), Some("title"));
    }

    #[test]
    fn test_unhinted_rename_with_two_candidates_is_ambiguous() {
        let v1 = SchemaDefinition::new("v1")
            .with_entity(EntityDefinition::new("Volume").with_attribute(title()));
        let v2 = SchemaDefinition::new("v2")
            .with_entity(EntityDefinition::new("Book").with_attribute(title()))
            .with_entity(EntityDefinition::new("Tome").with_attribute(title()));
        match compare(&v1, &v2) {
            SchemaComparison::Ambiguous { entity, candidates } => {
                assert_eq!(entity, "Volume");
                assert_eq!(candidates, vec!["Book".to_string(), "Tome".to_string()]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_unhinted_rename_with_single_candidate_is_inferred() {
        let v1 = SchemaDefinition::new("v1")
            .with_entity(EntityDefinition::new("Volume").with_attribute(title()));
        let v2 = SchemaDefinition::new("v2")
            .with_entity(EntityDefinition::new("Book").with_attribute(title()));
        let SchemaComparison::Compatible(entities) = compare(&v1, &v2) else {
            panic!("expected compatible");
        };
        assert_eq!(entities[0].destination, "Book");
    }

    #[test]
    fn test_relationship_narrowing_is_incompatible() {
        let v1 = SchemaDefinition::new("v1")
            .with_entity(
                EntityDefinition::new("Author")
                    .with_relationship(RelationshipDefinition::to_many("books", "Book").optional()),
            )
            .with_entity(EntityDefinition::new("Book").with_attribute(title()));
        let v2 = SchemaDefinition::new("v2")
            .with_entity(
                EntityDefinition::new("Author")
                    .with_relationship(RelationshipDefinition::to_one("books", "Book").optional()),
            )
            .with_entity(EntityDefinition::new("Book").with_attribute(title()));
        assert!(matches!(compare(&v1, &v2), SchemaComparison::Incompatible(_)));
        assert!(compare(&v2, &v1).is_compatible());
    }
}
