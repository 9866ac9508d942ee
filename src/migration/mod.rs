pub mod cancel;
pub mod executor;
pub mod lock;
pub mod path;
pub mod plan;
pub mod progress;

pub use cancel::{CANCEL_CHECK_INTERVAL, CancellationToken};
pub use executor::{MigrationExecutor, MigrationOptions};
pub use lock::{MigrationLockGuard, MigrationLocks};
pub use path::MigrationPathResolver;
pub use plan::{MigrationPlan, MigrationStep};
pub use progress::{ChannelObserver, ProgressObserver, ProgressReporter};
