// ============================================================================
// schemashift Library
// ============================================================================

pub mod config;
pub mod controller;
pub mod core;
pub mod mapping;
pub mod migration;
pub mod schema;
pub mod store;

// Re-export main types for convenience
pub use config::MigrationConfig;
pub use controller::{OpenStore, StoreController};
pub use core::{MigrationError, Result};

pub use mapping::{
    AttributeMapping, DirectoryMappingDelegate, EntityMapping, MappingDelegate, MappingDocument,
    MappingOrigin, MappingResolver, RelationshipMapping, StaticMappingDelegate, ValueRule,
};
pub use migration::{
    CancellationToken, ChannelObserver, MigrationExecutor, MigrationLocks, MigrationOptions,
    MigrationPathResolver, MigrationPlan, MigrationStep, ProgressObserver, ProgressReporter,
};
pub use schema::{
    AttributeDefinition, AttributeKind, EntityDefinition, RelationshipDefinition, SchemaDefinition,
    SchemaVersion, SchemaVersionRegistry,
};
pub use store::{
    FileStoreEngine, MemoryStoreEngine, Store, StoreContents, StoreEngine, StoreEngines,
    StoreKind, StoredObject,
};
