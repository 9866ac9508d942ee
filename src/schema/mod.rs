pub mod diff;
pub mod model;
pub mod registry;
pub mod validate;
pub mod version;

pub use diff::{EntityCorrespondence, PropertyCorrespondence, SchemaComparison, compare};
pub use model::{
    AttributeDefinition, AttributeKind, EntityDefinition, RelationshipDefinition, SchemaDefinition,
};
pub use registry::{SchemaVersionRegistry, natural_cmp};
pub use validate::validate_objects;
pub use version::SchemaVersion;
