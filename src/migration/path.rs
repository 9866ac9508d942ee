//! Shortest-path planning over the graph of resolvable mappings.

use super::plan::{MigrationPlan, MigrationStep};
use crate::core::{MigrationError, Result};
use crate::mapping::{MappingDocument, MappingResolver};
use crate::schema::{SchemaVersion, SchemaVersionRegistry};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::Arc;

/// Finds the migration path from a store's version to a target version.
///
/// Edges exist wherever the mapping resolver produces a document. The
/// search is breadth-first with neighbours taken in registry order, so the
/// plan has the fewest hops and ties go to earlier registered versions.
pub struct MigrationPathResolver<'a> {
    registry: &'a SchemaVersionRegistry,
    mappings: &'a MappingResolver,
}

impl<'a> MigrationPathResolver<'a> {
    pub fn new(registry: &'a SchemaVersionRegistry, mappings: &'a MappingResolver) -> Self {
        Self { registry, mappings }
    }

    pub fn plan(&self, from_fingerprint: &str, to: &SchemaVersion) -> Result<MigrationPlan> {
        let source = self
            .registry
            .version_with_identity(from_fingerprint)
            .ok_or_else(|| MigrationError::UnknownSourceVersion(from_fingerprint.to_string()))?;
        if source.identity() == to.identity() {
            return Ok(MigrationPlan::empty());
        }

        let versions = self.registry.all_versions();
        let start = self
            .registry
            .position(source.identity())
            .ok_or_else(|| MigrationError::UnknownSourceVersion(from_fingerprint.to_string()))?;
        let goal = self
            .registry
            .position(to.identity())
            .ok_or_else(|| MigrationError::VersionNotFound(to.name().to_string()))?;

        let mut visited = vec![false; versions.len()];
        let mut parent: Vec<Option<(usize, Arc<MappingDocument>)>> = vec![None; versions.len()];
        let mut ambiguity: Option<MigrationError> = None;
        let mut queue = VecDeque::from([start]);
        visited[start] = true;

        while let Some(current) = queue.pop_front() {
            for (next, candidate) in versions.iter().enumerate() {
                if visited[next] {
                    continue;
                }
                match self.mappings.resolve(&versions[current], candidate) {
                    Ok(mapping) => {
                        visited[next] = true;
                        parent[next] = Some((current, mapping));
                        if next == goal {
                            return self.build(versions, &parent, start, goal);
                        }
                        queue.push_back(next);
                    }
                    Err(err @ MigrationError::NoMappingFound { .. }) => {
                        debug!("no edge: {err}");
                    }
                    Err(err @ MigrationError::AmbiguousMapping { .. }) => {
                        warn!("ambiguous edge skipped: {err}");
                        ambiguity.get_or_insert(err);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Err(ambiguity.unwrap_or_else(|| MigrationError::NoMigrationPath {
            from: source.name().to_string(),
            to: to.name().to_string(),
        }))
    }

    /// Whether a store with `from_fingerprint` can be brought to `to`.
    pub fn can_migrate(&self, from_fingerprint: &str, to: &SchemaVersion) -> bool {
        self.plan(from_fingerprint, to).is_ok()
    }

    fn build(
        &self,
        versions: &[Arc<SchemaVersion>],
        parent: &[Option<(usize, Arc<MappingDocument>)>],
        start: usize,
        goal: usize,
    ) -> Result<MigrationPlan> {
        let mut steps = Vec::new();
        let mut cursor = goal;
        while cursor != start {
            let (previous, mapping) = parent[cursor].clone().ok_or_else(|| {
                MigrationError::InvalidPlan(format!(
                    "broken path at version '{}'",
                    versions[cursor].name()
                ))
            })?;
            steps.push(MigrationStep::new(
                versions[previous].clone(),
                versions[cursor].clone(),
                mapping,
            ));
            cursor = previous;
        }
        steps.reverse();

        let plan = MigrationPlan::from_steps(steps)?;
        debug!("planned migration {}", plan.describe());
        Ok(plan)
    }
}
