//! Owner of everything a migration needs, and the entry point callers use.

pub mod session;

pub use session::OpenStore;

use crate::config::MigrationConfig;
use crate::core::{MigrationError, Result};
use crate::mapping::{DirectoryMappingDelegate, MappingDelegate, MappingResolver};
use crate::migration::{
    MigrationExecutor, MigrationLocks, MigrationOptions, MigrationPathResolver, MigrationPlan,
    ProgressObserver, ProgressReporter,
};
use crate::schema::{SchemaVersion, SchemaVersionRegistry};
use crate::store::{Store, StoreContents, StoreEngine, StoreEngines, StoreKind};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Decides whether a store needs migrating, migrates it and opens it.
///
/// Clones share the schema registry, engines, hooks and the per-location
/// migration locks.
#[derive(Clone)]
pub struct StoreController {
    registry: Arc<SchemaVersionRegistry>,
    config: MigrationConfig,
    engines: StoreEngines,
    delegate: Option<Arc<dyn MappingDelegate>>,
    observer: Option<Arc<dyn ProgressObserver>>,
    locks: MigrationLocks,
}

impl StoreController {
    /// Loads the registry from `config.models_dir` and, when configured, the
    /// mapping files from `config.mappings_dir`.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let registry = SchemaVersionRegistry::load(&config.models_dir)?;
        Self::with_registry(registry, config)
    }

    pub fn with_registry(registry: SchemaVersionRegistry, config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let delegate: Option<Arc<dyn MappingDelegate>> = match &config.mappings_dir {
            Some(dir) => {
                let delegate = DirectoryMappingDelegate::load(dir, &registry)?;
                debug!("loaded {} mapping files from '{}'", delegate.len(), dir.display());
                Some(Arc::new(delegate))
            }
            None => None,
        };

        let controller = Self {
            registry: Arc::new(registry),
            config,
            engines: StoreEngines::with_defaults(),
            delegate,
            observer: None,
            locks: MigrationLocks::new(),
        };
        // fail early on an unknown target version
        controller.current_version()?;
        Ok(controller)
    }

    /// Replaces the mapping delegate.
    pub fn with_delegate(mut self, delegate: impl MappingDelegate + 'static) -> Self {
        self.delegate = Some(Arc::new(delegate));
        self
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Registers `engine` for its kind, replacing the default one.
    pub fn with_engine(mut self, engine: Arc<dyn StoreEngine>) -> Self {
        self.engines = self.engines.with_engine(engine);
        self
    }

    pub fn registry(&self) -> &SchemaVersionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn engine(&self, kind: StoreKind) -> Result<Arc<dyn StoreEngine>> {
        self.engines.engine(kind)
    }

    /// The configured target version, or the latest registered one.
    pub fn current_version(&self) -> Result<Arc<SchemaVersion>> {
        match &self.config.target_version {
            Some(name) => self.registry.version_named(name),
            None => Ok(self.registry.latest()),
        }
    }

    /// Reads the metadata of an existing store.
    pub async fn open_store(&self, location: impl AsRef<Path>, kind: StoreKind) -> Result<Store> {
        let location = location.as_ref();
        let engine = self.engines.engine(kind)?;
        if !engine.exists(location).await? {
            return Err(MigrationError::Store(format!(
                "store '{}' does not exist",
                location.display()
            )));
        }
        let metadata = engine.load_metadata(location).await?;
        Ok(Store::new(location, kind, metadata))
    }

    /// Writes an empty store stamped with the current version.
    pub async fn create_store(&self, location: impl AsRef<Path>, kind: StoreKind) -> Result<Store> {
        let location = location.as_ref();
        let engine = self.engines.engine(kind)?;
        if engine.exists(location).await? {
            return Err(MigrationError::Store(format!(
                "store '{}' already exists",
                location.display()
            )));
        }
        let version = self.current_version()?;
        let contents = StoreContents::empty(&version);
        engine.write(location, &contents).await?;
        info!("created store '{}' at version '{}'", location.display(), version.name());
        Ok(Store::new(location, kind, contents.metadata))
    }

    pub fn is_migration_needed(&self, store: &Store) -> Result<bool> {
        let fingerprint = store.fingerprint()?;
        let current = self.current_version()?;
        if fingerprint == current.identity() {
            return Ok(false);
        }
        if self.registry.version_with_identity(fingerprint).is_none() {
            return Err(MigrationError::UnknownSourceVersion(fingerprint.to_string()));
        }
        Ok(true)
    }

    pub fn plan(&self, store: &Store) -> Result<MigrationPlan> {
        let current = self.current_version()?;
        let mappings = self.mapping_resolver();
        MigrationPathResolver::new(&self.registry, &mappings).plan(store.fingerprint()?, &current)
    }

    pub fn can_migrate(&self, store: &Store) -> bool {
        self.plan(store).is_ok()
    }

    pub async fn migrate(&self, store: &Store) -> Result<Store> {
        let options = MigrationOptions::default().deleting_source(self.config.delete_source);
        self.migrate_with(store, options).await
    }

    pub async fn migrate_with(&self, store: &Store, options: MigrationOptions) -> Result<Store> {
        let plan = self.plan(store)?;
        if plan.is_empty() {
            debug!("store '{}' is current, nothing to migrate", store.location().display());
        } else {
            info!("migrating '{}': {}", store.location().display(), plan.describe());
        }

        let executor = MigrationExecutor::new(self.engines.clone(), self.locks.clone())
            .with_validation(self.config.validate_steps);
        let mut progress = ProgressReporter::new(self.observer.clone())
            .with_min_delta(self.config.progress_min_delta);
        executor.execute(store, &plan, &options, &mut progress).await
    }

    /// Runs [`StoreController::migrate_with`] on a tokio worker task.
    pub fn spawn_migration(&self, store: Store, options: MigrationOptions) -> JoinHandle<Result<Store>> {
        let controller = self.clone();
        tokio::spawn(async move { controller.migrate_with(&store, options).await })
    }

    /// Migrates `store` when needed, then opens it.
    ///
    /// A failed migration leaves the store closed and returns the failure.
    pub async fn open_with_migration(&self, store: &Store) -> Result<OpenStore> {
        let store = if self.is_migration_needed(store)? {
            self.migrate(store).await?
        } else {
            store.clone()
        };
        let engine = self.engines.engine(store.kind())?;
        OpenStore::load(store, engine, self.current_version()?).await
    }

    fn mapping_resolver(&self) -> MappingResolver {
        MappingResolver::new(self.delegate.clone()).with_inference(self.config.infer_mappings)
    }
}

impl std::fmt::Debug for StoreController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreController")
            .field("versions", &self.registry.len())
            .field("config", &self.config)
            .field("engines", &self.engines)
            .field("has_delegate", &self.delegate.is_some())
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}
