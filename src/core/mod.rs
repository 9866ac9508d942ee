pub mod error;

pub use error::{MigrationError, Result};
