pub mod delegate;
pub mod document;
pub mod inference;
pub mod resolver;
pub mod transform;

pub use delegate::{DirectoryMappingDelegate, MappingDelegate, StaticMappingDelegate};
pub use document::{
    AttributeMapping, EntityMapping, MappingDocument, MappingFile, MappingOrigin,
    RelationshipMapping, ValueRule,
};
pub use inference::infer_mapping;
pub use resolver::MappingResolver;
pub use transform::transform_objects;
