use crate::core::{MigrationError, Result};
use crate::schema::{SchemaVersion, validate_objects};
use crate::store::{Store, StoreContents, StoreEngine, StoredObject};
use std::sync::Arc;

/// A store opened at the current schema version.
///
/// Reads and inserts work on an in-memory copy; [`OpenStore::save`] writes
/// it back atomically after validating it.
pub struct OpenStore {
    store: Store,
    engine: Arc<dyn StoreEngine>,
    version: Arc<SchemaVersion>,
    contents: StoreContents,
    dirty: bool,
}

impl OpenStore {
    pub(crate) async fn load(
        store: Store,
        engine: Arc<dyn StoreEngine>,
        version: Arc<SchemaVersion>,
    ) -> Result<Self> {
        let contents = engine.load(store.location()).await?;
        let fingerprint = contents.fingerprint()?;
        if fingerprint != version.identity() {
            return Err(MigrationError::Store(format!(
                "store '{}' is at '{}', expected '{}'",
                store.location().display(),
                fingerprint,
                version.name()
            )));
        }
        Ok(Self {
            store,
            engine,
            version,
            contents,
            dirty: false,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn version(&self) -> &Arc<SchemaVersion> {
        &self.version
    }

    pub fn fingerprint(&self) -> &str {
        self.version.identity()
    }

    pub fn len(&self) -> usize {
        self.contents.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.objects.is_empty()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub fn objects(&self, entity: &str) -> Result<Vec<&StoredObject>> {
        if self.version.entity(entity).is_none() {
            return Err(MigrationError::Validation(format!(
                "entity '{}' does not exist in '{}'",
                entity,
                self.version.name()
            )));
        }
        Ok(self.contents.objects_of(entity).collect())
    }

    pub fn get(&self, id: &str) -> Option<&StoredObject> {
        self.contents.object(id)
    }

    /// Adds `object`. Relationship targets are only checked on save, so
    /// objects referencing each other can be inserted in any order.
    pub fn insert(&mut self, object: StoredObject) -> Result<()> {
        if self.version.entity(&object.entity).is_none() {
            return Err(MigrationError::Validation(format!(
                "entity '{}' does not exist in '{}'",
                object.entity,
                self.version.name()
            )));
        }
        if self.contents.object(&object.id).is_some() {
            return Err(MigrationError::Validation(format!(
                "object '{}' already exists",
                object.id
            )));
        }
        self.contents.objects.push(object);
        self.dirty = true;
        Ok(())
    }

    pub async fn save(&mut self) -> Result<&Store> {
        validate_objects(&self.contents.objects, &self.version)?;
        self.contents.stamp(&self.version);
        self.engine
            .write(self.store.location(), &self.contents)
            .await?;
        self.store = Store::new(
            self.store.location(),
            self.store.kind(),
            self.contents.metadata.clone(),
        );
        self.dirty = false;
        Ok(&self.store)
    }
}

impl std::fmt::Debug for OpenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStore")
            .field("store", &self.store)
            .field("version", &self.version.name())
            .field("objects", &self.contents.objects.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
