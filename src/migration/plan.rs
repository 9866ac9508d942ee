use crate::core::{MigrationError, Result};
use crate::mapping::MappingDocument;
use crate::schema::SchemaVersion;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// One hop of a migration: a mapping between two adjacent versions.
#[derive(Clone)]
pub struct MigrationStep {
    source: Arc<SchemaVersion>,
    destination: Arc<SchemaVersion>,
    mapping: Arc<MappingDocument>,
}

impl MigrationStep {
    pub fn new(
        source: Arc<SchemaVersion>,
        destination: Arc<SchemaVersion>,
        mapping: Arc<MappingDocument>,
    ) -> Self {
        Self {
            source,
            destination,
            mapping,
        }
    }

    pub fn source(&self) -> &Arc<SchemaVersion> {
        &self.source
    }

    pub fn destination(&self) -> &Arc<SchemaVersion> {
        &self.destination
    }

    pub fn mapping(&self) -> &Arc<MappingDocument> {
        &self.mapping
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.source.name())
            .field("to", &self.destination.name())
            .field("origin", &self.mapping.origin)
            .field("entity_mappings", &self.mapping.entities.len())
            .finish()
    }
}

/// Ordered steps leading a store from its current version to the target.
///
/// An empty plan means the store is already current.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a plan, validating it immediately.
    pub fn from_steps(steps: Vec<MigrationStep>) -> Result<Self> {
        let plan = Self { steps };
        plan.validate()?;
        Ok(plan)
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn source(&self) -> Option<&Arc<SchemaVersion>> {
        self.steps.first().map(MigrationStep::source)
    }

    pub fn target(&self) -> Option<&Arc<SchemaVersion>> {
        self.steps.last().map(MigrationStep::destination)
    }

    /// Version names along the path, `v1 -> v2 -> v3`.
    pub fn describe(&self) -> String {
        let Some(first) = self.source() else {
            return "(no migration needed)".to_string();
        };
        let mut names = vec![first.name()];
        names.extend(self.steps.iter().map(|step| step.destination.name()));
        names.join(" -> ")
    }

    /// Checks that the steps form a simple path and that every mapping
    /// connects the versions of its step.
    pub fn validate(&self) -> Result<()> {
        let mut visited = HashSet::new();
        if let Some(first) = self.source() {
            visited.insert(first.identity());
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.mapping.source != step.source.identity()
                || step.mapping.destination != step.destination.identity()
            {
                return Err(MigrationError::InvalidPlan(format!(
                    "step {} mapping does not connect '{}' -> '{}'",
                    index,
                    step.source.name(),
                    step.destination.name()
                )));
            }
            if index > 0 && self.steps[index - 1].destination.identity() != step.source.identity() {
                return Err(MigrationError::InvalidPlan(format!(
                    "step {} starts at '{}' but the previous step ends at '{}'",
                    index,
                    step.source.name(),
                    self.steps[index - 1].destination.name()
                )));
            }
            if !visited.insert(step.destination.identity()) {
                return Err(MigrationError::InvalidPlan(format!(
                    "version '{}' appears twice in the plan",
                    step.destination.name()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDefinition, AttributeKind, EntityDefinition, SchemaDefinition};

    fn version(name: &str, attributes: &[&str]) -> Arc<SchemaVersion> {
        let mut entity = EntityDefinition::new("Note");
        for attr in attributes {
            entity = entity.with_attribute(AttributeDefinition::new(*attr, AttributeKind::String).optional());
        }
        Arc::new(SchemaVersion::new(SchemaDefinition::new(name).with_entity(entity)))
    }

    fn step(from: &Arc<SchemaVersion>, to: &Arc<SchemaVersion>) -> MigrationStep {
        MigrationStep::new(from.clone(), to.clone(), Arc::new(MappingDocument::new(from, to)))
    }

    #[test]
    fn test_empty_plan() {
        let plan = MigrationPlan::empty();
        assert!(plan.is_empty());
        assert!(plan.validate().is_ok());
        assert_eq!(plan.describe(), "(no migration needed)");
    }

    #[test]
    fn test_contiguous_plan_is_valid() {
        let (v1, v2, v3) = (version("v1", &[]), version("v2", &["a"]), version("v3", &["a", "b"]));
        let plan = MigrationPlan::from_steps(vec![step(&v1, &v2), step(&v2, &v3)]).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.describe(), "v1 -> v2 -> v3");
        assert_eq!(plan.target().unwrap().name(), "v3");
    }

    #[test]
    fn test_gap_and_cycle_are_rejected() {
        let (v1, v2, v3) = (version("v1", &[]), version("v2", &["a"]), version("v3", &["a", "b"]));
        assert!(matches!(
            MigrationPlan::from_steps(vec![step(&v1, &v2), step(&v1, &v3)]),
            Err(MigrationError::InvalidPlan(_))
        ));
        assert!(matches!(
            MigrationPlan::from_steps(vec![step(&v1, &v2), step(&v2, &v1)]),
            Err(MigrationError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_mismatched_mapping_is_rejected() {
        let (v1, v2, v3) = (version("v1", &[]), version("v2", &["a"]), version("v3", &["a", "b"]));
        let wrong = MigrationStep::new(v1.clone(), v2.clone(), Arc::new(MappingDocument::new(&v1, &v3)));
        assert!(MigrationPlan::from_steps(vec![wrong]).is_err());
    }
}
