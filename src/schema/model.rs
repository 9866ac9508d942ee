//! Entity, attribute and relationship definitions of one schema version.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp stored as a string.
    Date,
    /// Base64 payload stored as a string.
    Binary,
    Json,
}

impl AttributeKind {
    /// Checks whether a stored JSON value is acceptable for this kind.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value as J;
        match (self, value) {
            (_, J::Null) => true,
            (Self::String, J::String(_)) => true,
            (Self::Integer, J::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, J::Number(_)) => true,
            (Self::Boolean, J::Bool(_)) => true,
            (Self::Date, J::String(s)) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            (Self::Binary, J::String(_)) => true,
            (Self::Json, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Binary => "binary",
            Self::Json => "json",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    pub kind: AttributeKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Name of the source attribute this one replaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renaming_id: Option<String>,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            default: None,
            renaming_id: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.renaming_id = Some(previous.into());
        self
    }

    /// Whether an object may omit the attribute when written.
    pub fn can_be_absent(&self) -> bool {
        self.optional || self.default.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub name: String,
    /// Target entity name.
    pub destination: String,
    #[serde(default)]
    pub to_many: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renaming_id: Option<String>,
}

impl RelationshipDefinition {
    pub fn to_one(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            to_many: false,
            optional: false,
            inverse: None,
            renaming_id: None,
        }
    }

    pub fn to_many(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            to_many: true,
            ..Self::to_one(name, destination)
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.renaming_id = Some(previous.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renaming_id: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            renaming_id: None,
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeDefinition) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipDefinition) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.renaming_id = Some(previous.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDefinition> {
        self.relationships.iter().find(|rel| rel.name == name)
    }
}

/// A complete schema definition as read from a models directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    pub fn with_entity(mut self, entity: EntityDefinition) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    /// Rejects duplicate names and relationships pointing at unknown entities.
    pub fn check_well_formed(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("schema name must not be empty".to_string());
        }

        let mut entity_names = std::collections::HashSet::new();
        for entity in &self.entities {
            if !entity_names.insert(entity.name.as_str()) {
                return Err(format!("duplicate entity '{}'", entity.name));
            }
        }

        for entity in &self.entities {
            let mut property_names = std::collections::HashSet::new();
            for attr in &entity.attributes {
                if !property_names.insert(attr.name.as_str()) {
                    return Err(format!(
                        "duplicate property '{}' in entity '{}'",
                        attr.name, entity.name
                    ));
                }
                if let Some(default) = &attr.default
                    && !attr.kind.accepts(default)
                {
                    return Err(format!(
                        "default of '{}.{}' is not a valid {}",
                        entity.name, attr.name, attr.kind
                    ));
                }
            }
            for rel in &entity.relationships {
                if !property_names.insert(rel.name.as_str()) {
                    return Err(format!(
                        "duplicate property '{}' in entity '{}'",
                        rel.name, entity.name
                    ));
                }
                if !entity_names.contains(rel.destination.as_str()) {
                    return Err(format!(
                        "relationship '{}.{}' targets unknown entity '{}'",
                        entity.name, rel.name, rel.destination
                    ));
                }
            }
        }

        Ok(())
    }
}
