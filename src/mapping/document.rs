use crate::core::{MigrationError, Result};
use crate::schema::SchemaVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a mapping document came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingOrigin {
    /// Supplied by the caller, in code or as a mapping file.
    Delegated,
    /// Synthesized from a structural comparison.
    Inferred,
}

/// Expression producing one destination attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValueRule {
    /// Copy a source attribute.
    Source { attribute: String },
    /// A fixed value.
    Constant { value: serde_json::Value },
    /// The destination attribute's default, or null.
    Default,
    /// Join the string forms of several source attributes.
    Concat {
        attributes: Vec<String>,
        #[serde(default)]
        separator: String,
    },
    /// Take one part of a source attribute split by `separator`.
    SplitPart {
        attribute: String,
        separator: String,
        index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub destination: String,
    #[serde(flatten)]
    pub rule: ValueRule,
}

impl AttributeMapping {
    pub fn copy(destination: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            rule: ValueRule::Source {
                attribute: source.into(),
            },
        }
    }

    pub fn constant(destination: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            destination: destination.into(),
            rule: ValueRule::Constant { value },
        }
    }

    pub fn default_value(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            rule: ValueRule::Default,
        }
    }

    pub fn with_rule(destination: impl Into<String>, rule: ValueRule) -> Self {
        Self {
            destination: destination.into(),
            rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMapping {
    pub destination: String,
    pub source: String,
}

/// Transformation of one or more source entities into a destination entity.
///
/// Several source entities in one mapping merge them; the same source
/// entity in several mappings splits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub name: String,
    pub source_entities: Vec<String>,
    pub destination_entity: String,
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
    #[serde(default)]
    pub relationships: Vec<RelationshipMapping>,
}

impl EntityMapping {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        let source = source.into();
        let destination = destination.into();
        Self {
            name: format!("{source}To{destination}"),
            source_entities: vec![source],
            destination_entity: destination,
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn merging<I, S>(sources: I, destination: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let destination = destination.into();
        Self {
            name: format!("MergeTo{destination}"),
            source_entities: sources.into_iter().map(Into::into).collect(),
            destination_entity: destination,
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, mapping: AttributeMapping) -> Self {
        self.attributes.push(mapping);
        self
    }

    pub fn copy_attribute(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_attribute(AttributeMapping::copy(name.clone(), name))
    }

    pub fn with_relationship(
        mut self,
        destination: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.relationships.push(RelationshipMapping {
            destination: destination.into(),
            source: source.into(),
        });
        self
    }

    pub fn maps_source(&self, entity: &str) -> bool {
        self.source_entities.iter().any(|name| name == entity)
    }
}

/// Describes how to transform a store from one schema version to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    /// Identity of the source schema version.
    pub source: String,
    /// Identity of the destination schema version.
    pub destination: String,
    pub origin: MappingOrigin,
    pub entities: Vec<EntityMapping>,
    /// Source entities whose objects are deliberately not carried over.
    #[serde(default)]
    pub dropped_entities: Vec<String>,
}

impl MappingDocument {
    pub fn new(source: &SchemaVersion, destination: &SchemaVersion) -> Self {
        Self {
            source: source.identity().to_string(),
            destination: destination.identity().to_string(),
            origin: MappingOrigin::Delegated,
            entities: Vec::new(),
            dropped_entities: Vec::new(),
        }
    }

    pub fn with_entity(mut self, mapping: EntityMapping) -> Self {
        self.entities.push(mapping);
        self
    }

    /// Discards every object of the source entity `entity`.
    pub fn dropping(mut self, entity: impl Into<String>) -> Self {
        self.dropped_entities.push(entity.into());
        self
    }

    pub fn drops(&self, entity: &str) -> bool {
        self.dropped_entities.iter().any(|name| name == entity)
    }

    pub fn is_inferred(&self) -> bool {
        self.origin == MappingOrigin::Inferred
    }

    pub fn mappings_for_source<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = &'a EntityMapping> + 'a {
        self.entities.iter().filter(move |m| m.maps_source(entity))
    }

    /// Checks that every name in the document exists in the schemas it
    /// claims to connect, and that every source entity is either mapped or
    /// explicitly dropped.
    pub fn check_against(&self, source: &SchemaVersion, destination: &SchemaVersion) -> Result<()> {
        if self.source != source.identity() || self.destination != destination.identity() {
            return Err(MigrationError::InvalidMapping(format!(
                "mapping declares '{}' -> '{}' but was used for '{}' -> '{}'",
                self.source,
                self.destination,
                source.identity(),
                destination.identity()
            )));
        }

        let mut names = HashSet::new();
        for mapping in &self.entities {
            if !names.insert(mapping.name.as_str()) {
                return Err(MigrationError::InvalidMapping(format!(
                    "duplicate entity mapping '{}'",
                    mapping.name
                )));
            }
            if mapping.source_entities.is_empty() {
                return Err(MigrationError::InvalidMapping(format!(
                    "entity mapping '{}' has no source entity",
                    mapping.name
                )));
            }

            let Some(dst_entity) = destination.entity(&mapping.destination_entity) else {
                return Err(MigrationError::InvalidMapping(format!(
                    "entity mapping '{}' targets unknown entity '{}'",
                    mapping.name, mapping.destination_entity
                )));
            };

            for src_name in &mapping.source_entities {
                let Some(src_entity) = source.entity(src_name) else {
                    return Err(MigrationError::InvalidMapping(format!(
                        "entity mapping '{}' reads unknown entity '{}'",
                        mapping.name, src_name
                    )));
                };

                for attr in &mapping.attributes {
                    for read in attr.rule.source_attributes() {
                        if src_entity.attribute(read).is_none() {
                            return Err(MigrationError::InvalidMapping(format!(
                                "entity mapping '{}' reads unknown attribute '{}.{}'",
                                mapping.name, src_name, read
                            )));
                        }
                    }
                }
                for rel in &mapping.relationships {
                    if src_entity.relationship(&rel.source).is_none() {
                        return Err(MigrationError::InvalidMapping(format!(
                            "entity mapping '{}' reads unknown relationship '{}.{}'",
                            mapping.name, src_name, rel.source
                        )));
                    }
                }
            }

            for attr in &mapping.attributes {
                if dst_entity.attribute(&attr.destination).is_none() {
                    return Err(MigrationError::InvalidMapping(format!(
                        "entity mapping '{}' writes unknown attribute '{}.{}'",
                        mapping.name, dst_entity.name, attr.destination
                    )));
                }
            }
            for rel in &mapping.relationships {
                if dst_entity.relationship(&rel.destination).is_none() {
                    return Err(MigrationError::InvalidMapping(format!(
                        "entity mapping '{}' writes unknown relationship '{}.{}'",
                        mapping.name, dst_entity.name, rel.destination
                    )));
                }
            }
        }

        for dropped in &self.dropped_entities {
            if source.entity(dropped).is_none() {
                return Err(MigrationError::InvalidMapping(format!(
                    "mapping drops unknown entity '{dropped}'"
                )));
            }
            if self.entities.iter().any(|mapping| mapping.maps_source(dropped)) {
                return Err(MigrationError::InvalidMapping(format!(
                    "entity '{dropped}' is both mapped and dropped"
                )));
            }
        }

        for entity in source.entities() {
            let mapped = self.entities.iter().any(|mapping| mapping.maps_source(&entity.name));
            if !mapped && !self.drops(&entity.name) {
                return Err(MigrationError::InvalidMapping(format!(
                    "source entity '{}' is neither mapped nor dropped",
                    entity.name
                )));
            }
        }

        Ok(())
    }
}

impl ValueRule {
    /// Source attribute names read by this rule.
    pub fn source_attributes(&self) -> Vec<&str> {
        match self {
            Self::Source { attribute } | Self::SplitPart { attribute, .. } => {
                vec![attribute.as_str()]
            }
            Self::Concat { attributes, .. } => attributes.iter().map(String::as_str).collect(),
            Self::Constant { .. } | Self::Default => Vec::new(),
        }
    }
}

/// A mapping file on disk names versions instead of identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingFile {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
    #[serde(default)]
    pub dropped_entities: Vec<String>,
}

impl MappingFile {
    pub fn bind(self, source: &SchemaVersion, destination: &SchemaVersion) -> MappingDocument {
        MappingDocument {
            source: source.identity().to_string(),
            destination: destination.identity().to_string(),
            origin: MappingOrigin::Delegated,
            entities: self.entities,
            dropped_entities: self.dropped_entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDefinition, AttributeKind, EntityDefinition, SchemaDefinition};
    use serde_json::json;

    fn versions() -> (SchemaVersion, SchemaVersion) {
        let v1 = SchemaDefinition::new("v1").with_entity(
            EntityDefinition::new("Book")
                .with_attribute(AttributeDefinition::new("title", AttributeKind::String)),
        );
        let v2 = SchemaDefinition::new("v2").with_entity(
            EntityDefinition::new("Book")
                .with_attribute(AttributeDefinition::new("title", AttributeKind::String))
                .with_attribute(AttributeDefinition::new("author", AttributeKind::String)),
        );
        (SchemaVersion::new(v1), SchemaVersion::new(v2))
    }

    #[test]
    fn test_rule_serialization_is_tagged() {
        let mapping = AttributeMapping::constant("author", json!(""));
        let value = serde_json::to_value(&mapping).unwrap();
        assert_eq!(value, json!({ "destination": "author", "rule": "constant", "value": "" }));
        let back: AttributeMapping = serde_json::from_value(value).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn test_check_against_accepts_valid_document() {
        let (v1, v2) = versions();
        let doc = MappingDocument::new(&v1, &v2).with_entity(
            EntityMapping::new("Book", "Book")
                .copy_attribute("title")
                .with_attribute(AttributeMapping::constant("author", json!(""))),
        );
        assert!(doc.check_against(&v1, &v2).is_ok());
    }

    #[test]
    fn test_check_against_rejects_unknown_names() {
        let (v1, v2) = versions();
        let doc = MappingDocument::new(&v1, &v2)
            .with_entity(EntityMapping::new("Book", "Book").copy_attribute("subtitle"));
        assert!(matches!(
            doc.check_against(&v1, &v2),
            Err(MigrationError::InvalidMapping(_))
        ));

        let swapped = MappingDocument::new(&v2, &v1);
        assert!(swapped.check_against(&v1, &v2).is_err());
    }

    #[test]
    fn test_check_against_requires_every_source_entity() {
        let v1 = SchemaVersion::new(
            SchemaDefinition::new("v1")
                .with_entity(
                    EntityDefinition::new("Book")
                        .with_attribute(AttributeDefinition::new("title", AttributeKind::String)),
                )
                .with_entity(EntityDefinition::new("Note")),
        );
        let (_, v2) = versions();
        let book = EntityMapping::new("Book", "Book")
            .copy_attribute("title")
            .with_attribute(AttributeMapping::constant("author", json!("")));

        let partial = MappingDocument::new(&v1, &v2).with_entity(book.clone());
        assert!(matches!(
            partial.check_against(&v1, &v2),
            Err(MigrationError::InvalidMapping(_))
        ));

        let explicit = partial.clone().dropping("Note");
        assert!(explicit.check_against(&v1, &v2).is_ok());

        let contradictory = explicit.dropping("Book");
        assert!(contradictory.check_against(&v1, &v2).is_err());
        assert!(partial.dropping("Shelf").check_against(&v1, &v2).is_err());
    }
}
