use super::model::{EntityDefinition, SchemaDefinition};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Namespace for schema identities, so they never collide with other v5 ids.
const SCHEMA_IDENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d0e_93a4_4b8e_a1d7_5c3e_0b9f_7a21);

/// A loaded schema definition with its content-derived identity.
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    name: String,
    identity: String,
    definition: SchemaDefinition,
}

impl SchemaVersion {
    pub fn new(definition: SchemaDefinition) -> Self {
        let identity = structural_identity(&definition);
        Self {
            name: definition.name.clone(),
            identity,
            definition,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identity recorded in store metadata.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.definition.entity(name)
    }

    pub fn entities(&self) -> &[EntityDefinition] {
        &self.definition.entities
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for SchemaVersion {}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.identity)
    }
}

#[derive(Serialize)]
struct CanonicalAttribute<'a> {
    kind: String,
    optional: bool,
    default: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
struct CanonicalRelationship<'a> {
    destination: &'a str,
    to_many: bool,
    optional: bool,
    inverse: Option<&'a str>,
}

#[derive(Serialize)]
struct CanonicalEntity<'a> {
    attributes: BTreeMap<&'a str, CanonicalAttribute<'a>>,
    relationships: BTreeMap<&'a str, CanonicalRelationship<'a>>,
}

/// Hashes the structure of a schema. Version names and rename hints are
/// excluded, so structurally identical schemas share one identity.
pub fn structural_identity(definition: &SchemaDefinition) -> String {
    let entities: BTreeMap<&str, CanonicalEntity<'_>> = definition
        .entities
        .iter()
        .map(|entity| {
            let attributes = entity
                .attributes
                .iter()
                .map(|attr| {
                    (
                        attr.name.as_str(),
                        CanonicalAttribute {
                            kind: attr.kind.to_string(),
                            optional: attr.optional,
                            default: attr.default.as_ref(),
                        },
                    )
                })
                .collect();
            let relationships = entity
                .relationships
                .iter()
                .map(|rel| {
                    (
                        rel.name.as_str(),
                        CanonicalRelationship {
                            destination: rel.destination.as_str(),
                            to_many: rel.to_many,
                            optional: rel.optional,
                            inverse: rel.inverse.as_deref(),
                        },
                    )
                })
                .collect();
            (
                entity.name.as_str(),
                CanonicalEntity {
                    attributes,
                    relationships,
                },
            )
        })
        .collect();

    // BTreeMap keys give a canonical field order; serializing a map of plain
    // structs cannot fail.
    let bytes = serde_json::to_vec(&entities).unwrap_or_default();
    Uuid::new_v5(&SCHEMA_IDENTITY_NAMESPACE, &bytes).to_string()
}
