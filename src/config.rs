use crate::core::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Migration settings for a [`crate::controller::StoreController`].
///
/// Built in code with the builder methods or read from a JSON file:
///
/// ```json
/// { "models_dir": "models", "mappings_dir": "mappings", "target_version": "v3" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory of `*.json` schema definitions.
    pub models_dir: PathBuf,
    /// Directory of `*.json` mapping files.
    pub mappings_dir: Option<PathBuf>,
    /// Version stores are brought to; the latest registered when unset.
    pub target_version: Option<String>,
    /// Infer mappings between compatible versions without a delegated one.
    pub infer_mappings: bool,
    /// Remove the source after migrating into a different location.
    pub delete_source: bool,
    /// Smallest progress change delivered to observers between step boundaries.
    pub progress_min_delta: f64,
    /// Validate every object of each intermediate store.
    pub validate_steps: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            mappings_dir: None,
            target_version: None,
            infer_mappings: true,
            delete_source: false,
            progress_min_delta: 0.0,
            validate_steps: true,
        }
    }
}

impl MigrationConfig {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            MigrationError::InvalidConfig(format!("cannot read '{}': {}", path.display(), err))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            MigrationError::InvalidConfig(format!("cannot parse '{}': {}", path.display(), err))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn mappings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mappings_dir = Some(dir.into());
        self
    }

    pub fn target_version(mut self, name: impl Into<String>) -> Self {
        self.target_version = Some(name.into());
        self
    }

    pub fn infer_mappings(mut self, infer: bool) -> Self {
        self.infer_mappings = infer;
        self
    }

    pub fn delete_source(mut self, delete: bool) -> Self {
        self.delete_source = delete;
        self
    }

    pub fn progress_min_delta(mut self, delta: f64) -> Self {
        self.progress_min_delta = delta;
        self
    }

    pub fn validate_steps(mut self, validate: bool) -> Self {
        self.validate_steps = validate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.models_dir.as_os_str().is_empty() {
            return Err(MigrationError::InvalidConfig(
                "models_dir must not be empty".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.progress_min_delta) {
            return Err(MigrationError::InvalidConfig(format!(
                "progress_min_delta must be in [0, 1), got {}",
                self.progress_min_delta
            )));
        }
        if let Some(target) = &self.target_version
            && target.trim().is_empty()
        {
            return Err(MigrationError::InvalidConfig(
                "target_version must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::default();
        assert!(config.infer_mappings);
        assert!(!config.delete_source);
        assert!(config.validate_steps);
        assert_eq!(config.progress_min_delta, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = MigrationConfig::new("schemas")
            .mappings_dir("maps")
            .target_version("v3")
            .progress_min_delta(0.05);
        assert!(config.validate().is_ok());
        assert_eq!(config.target_version.as_deref(), Some("v3"));

        assert!(MigrationConfig::new("").validate().is_err());
        assert!(MigrationConfig::new("m").progress_min_delta(1.0).validate().is_err());
        assert!(MigrationConfig::new("m").progress_min_delta(-0.1).validate().is_err());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("migration.json");
        fs::write(&path, r#"{ "models_dir": "models", "infer_mappings": false }"#).unwrap();

        let config = MigrationConfig::from_file(&path).unwrap();
        assert!(!config.infer_mappings);
        assert!(config.validate_steps);
        assert!(config.mappings_dir.is_none());

        fs::write(&path, r#"{ "progress_min_delta": 2.0 }"#).unwrap();
        assert!(matches!(
            MigrationConfig::from_file(&path),
            Err(MigrationError::InvalidConfig(_))
        ));
    }
}
