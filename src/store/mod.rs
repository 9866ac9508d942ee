pub mod contents;
pub mod engine;
pub mod file;
pub mod handle;
pub mod memory;

pub use contents::{
    STORE_FINGERPRINT_KEY, STORE_FORMAT_VERSION, STORE_VERSION_NAME_KEY, STORE_WRITTEN_AT_KEY,
    StoreContents, StoredObject,
};
pub use engine::{StoreEngine, StoreEngines, StoreKind, normalize_location};
pub use file::{FileFormat, FileStoreEngine};
pub use handle::Store;
pub use memory::MemoryStoreEngine;
