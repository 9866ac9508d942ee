use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Schema load error at '{path}': {reason}")]
    SchemaLoad { path: String, reason: String },

    #[error("Schema version '{0}' not found")]
    VersionNotFound(String),

    #[error("Store fingerprint '{0}' matches no registered schema version")]
    UnknownSourceVersion(String),

    #[error("No mapping found from '{from}' to '{to}': {reason}")]
    NoMappingFound {
        from: String,
        to: String,
        reason: String,
    },

    #[error("No migration path from '{from}' to '{to}'")]
    NoMigrationPath { from: String, to: String },

    #[error(
        "Ambiguous mapping from '{from}' to '{to}': entity '{entity}' matches {candidates:?}"
    )]
    AmbiguousMapping {
        from: String,
        to: String,
        entity: String,
        candidates: Vec<String>,
    },

    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("Invalid migration plan: {0}")]
    InvalidPlan(String),

    #[error("Migration step {step_index} ('{from}' -> '{to}') failed: {cause}")]
    StepExecution {
        step_index: usize,
        from: String,
        to: String,
        cause: Box<MigrationError>,
    },

    #[error("A migration is already in progress for store '{0}'")]
    MigrationInProgress(String),

    #[error("Migration cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MigrationError {
    /// Wraps a failure with the identities of the step that produced it.
    pub fn at_step(self, step_index: usize, from: &str, to: &str) -> Self {
        match self {
            Self::Cancelled => Self::Cancelled,
            cause => Self::StepExecution {
                step_index,
                from: from.to_string(),
                to: to.to_string(),
                cause: Box::new(cause),
            },
        }
    }

    /// The innermost error, looking through step wrappers.
    pub fn root_cause(&self) -> &MigrationError {
        match self {
            Self::StepExecution { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl<T> From<std::sync::PoisonError<T>> for MigrationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_wrapping_keeps_pair_and_cause() {
        let err = MigrationError::Validation("missing title".to_string()).at_step(1, "a", "b");
        match &err {
            MigrationError::StepExecution {
                step_index, from, to, ..
            } => {
                assert_eq!(*step_index, 1);
                assert_eq!(from, "a");
                assert_eq!(to, "b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), MigrationError::Validation(_)));
    }

    #[test]
    fn test_cancellation_is_not_wrapped() {
        let err = MigrationError::Cancelled.at_step(0, "a", "b");
        assert!(matches!(err, MigrationError::Cancelled));
    }
}
