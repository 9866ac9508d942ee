//! Runs a migration plan through scratch stores.
//!
//! The original store is never written to. Each step reads the previous
//! store, writes its result to a fresh scratch location next to the target
//! and checks it there. Only after the last step is the target replaced, by
//! a single rename. On any failure every scratch store is removed.

use super::cancel::CancellationToken;
use super::lock::MigrationLocks;
use super::plan::{MigrationPlan, MigrationStep};
use super::progress::ProgressReporter;
use crate::core::{MigrationError, Result};
use crate::mapping::transform_objects;
use crate::schema::validate_objects;
use crate::store::{STORE_FINGERPRINT_KEY, Store, StoreContents, StoreEngine, StoreEngines};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{Instrument, Level, event, info_span};

/// Per-run knobs of a migration.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Write the migrated store here instead of replacing the original.
    pub target_location: Option<PathBuf>,
    /// Remove the original once the store was migrated to another location.
    pub delete_source: bool,
    pub cancellation: Option<CancellationToken>,
}

impl MigrationOptions {
    pub fn into_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.target_location = Some(location.into());
        self
    }

    pub fn deleting_source(mut self, delete_source: bool) -> Self {
        self.delete_source = delete_source;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancellation {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationExecutor {
    engines: StoreEngines,
    locks: MigrationLocks,
    validate_steps: bool,
}

impl MigrationExecutor {
    pub fn new(engines: StoreEngines, locks: MigrationLocks) -> Self {
        Self {
            engines,
            locks,
            validate_steps: true,
        }
    }

    /// Toggles object validation of every intermediate store.
    pub fn with_validation(mut self, validate_steps: bool) -> Self {
        self.validate_steps = validate_steps;
        self
    }

    pub async fn execute(
        &self,
        store: &Store,
        plan: &MigrationPlan,
        options: &MigrationOptions,
        progress: &mut ProgressReporter,
    ) -> Result<Store> {
        if plan.is_empty() {
            progress.finish();
            return Ok(store.clone());
        }
        plan.validate()?;

        let original = store.location().to_path_buf();
        let target = options
            .target_location
            .clone()
            .unwrap_or_else(|| original.clone());

        let engine = self.engines.engine(store.kind())?;
        let source_key = engine.lock_key(&original).await?;
        let target_key = engine.lock_key(&target).await?;
        let in_place = source_key == target_key;
        let _source_guard = self.locks.acquire(&source_key)?;
        let _target_guard = if in_place {
            None
        } else {
            Some(self.locks.acquire(&target_key)?)
        };
        let span = info_span!(
            "migration.execute",
            store = %original.display(),
            plan = %plan.describe(),
            steps = plan.len()
        );

        let mut scratches = Vec::with_capacity(plan.len());
        let outcome = self
            .migrate_through_scratch(
                engine.as_ref(),
                &original,
                &target,
                in_place,
                plan,
                options,
                progress,
                &mut scratches,
            )
            .instrument(span.clone())
            .await;

        for scratch in &scratches {
            if let Err(err) = engine.destroy(scratch).await {
                let _enter = span.enter();
                event!(Level::WARN, scratch = %scratch.display(), error = %err, "scratch store cleanup failed");
            }
        }

        let _enter = span.enter();
        match outcome {
            Ok(metadata) => {
                progress.finish();
                event!(Level::INFO, target = %target.display(), "migration completed");
                Ok(Store::new(target, store.kind(), metadata))
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "migration failed, original store left untouched");
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn migrate_through_scratch(
        &self,
        engine: &dyn StoreEngine,
        original: &Path,
        target: &Path,
        in_place: bool,
        plan: &MigrationPlan,
        options: &MigrationOptions,
        progress: &mut ProgressReporter,
        scratches: &mut Vec<PathBuf>,
    ) -> Result<BTreeMap<String, String>> {
        self.check_source(engine, original, plan).await?;
        let (final_scratch, metadata) = self
            .run_steps(engine, original, target, plan, options, progress, scratches)
            .await?;
        self.commit(engine, original, target, in_place, &final_scratch, options)
            .await?;
        Ok(metadata)
    }

    async fn check_source(
        &self,
        engine: &dyn StoreEngine,
        original: &Path,
        plan: &MigrationPlan,
    ) -> Result<()> {
        let metadata = engine.load_metadata(original).await?;
        let fingerprint = metadata.get(STORE_FINGERPRINT_KEY).map(String::as_str);
        let expected = plan.source().map(|version| version.identity());
        if fingerprint != expected {
            return Err(MigrationError::InvalidPlan(format!(
                "store '{}' is at '{}' but the plan starts at '{}'",
                original.display(),
                fingerprint.unwrap_or("<none>"),
                expected.unwrap_or("<none>")
            )));
        }
        Ok(())
    }

    /// Returns the final scratch store and its metadata.
    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        &self,
        engine: &dyn StoreEngine,
        original: &Path,
        target: &Path,
        plan: &MigrationPlan,
        options: &MigrationOptions,
        progress: &mut ProgressReporter,
        scratches: &mut Vec<PathBuf>,
    ) -> Result<(PathBuf, BTreeMap<String, String>)> {
        let step_count = plan.len();
        let mut input = original.to_path_buf();
        let mut metadata = BTreeMap::new();

        for (index, step) in plan.steps().iter().enumerate() {
            options.check_cancelled()?;
            progress.report(index, step_count, 0.0);

            // must share the target's filesystem for the final rename
            let scratch = engine.scratch_location(target);
            scratches.push(scratch.clone());

            let span = info_span!(
                "migration.step",
                index,
                from = %step.source().name(),
                to = %step.destination().name(),
                origin = ?step.mapping().origin
            );
            metadata = self
                .run_step(engine, index, step_count, step, &input, &scratch, options, progress)
                .instrument(span)
                .await
                .map_err(|err| err.at_step(index, step.source().name(), step.destination().name()))?;

            if input != original {
                engine.destroy(&input).await?;
            }
            input = scratch;
            progress.report(index, step_count, 1.0);
        }

        Ok((input, metadata))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        engine: &dyn StoreEngine,
        index: usize,
        step_count: usize,
        step: &MigrationStep,
        input: &Path,
        scratch: &Path,
        options: &MigrationOptions,
        progress: &mut ProgressReporter,
    ) -> Result<BTreeMap<String, String>> {
        let contents = engine.load(input).await?;
        let objects = transform_objects(
            &contents.objects,
            step.mapping(),
            step.source(),
            step.destination(),
            |done, total| {
                options.check_cancelled()?;
                if total > 0 {
                    progress.report(index, step_count, done as f64 / total as f64);
                }
                Ok(())
            },
        )?;
        event!(
            Level::DEBUG,
            read = contents.objects.len(),
            written = objects.len(),
            "step transformed objects"
        );

        let mut migrated = StoreContents {
            format_version: contents.format_version,
            metadata: contents.metadata,
            objects,
        };
        migrated.stamp(step.destination());
        engine.write(scratch, &migrated).await?;

        let written = engine.load_metadata(scratch).await?;
        if written.get(STORE_FINGERPRINT_KEY).map(String::as_str) != Some(step.destination().identity()) {
            return Err(MigrationError::Validation(format!(
                "scratch store '{}' does not carry the identity of '{}'",
                scratch.display(),
                step.destination().name()
            )));
        }
        if self.validate_steps {
            validate_objects(&migrated.objects, step.destination())?;
        }
        Ok(written)
    }

    /// Once the replace succeeded the migration counts as committed; later
    /// failures are only logged.
    async fn commit(
        &self,
        engine: &dyn StoreEngine,
        original: &Path,
        target: &Path,
        in_place: bool,
        final_scratch: &Path,
        options: &MigrationOptions,
    ) -> Result<()> {
        // last point at which cancellation is honoured
        options.check_cancelled()?;
        engine.replace(target, final_scratch).await?;
        if options.delete_source && !in_place {
            if let Err(err) = engine.destroy(original).await {
                event!(
                    Level::WARN,
                    source = %original.display(),
                    error = %err,
                    "migrated store committed but the source could not be removed"
                );
            }
        }
        Ok(())
    }
}
