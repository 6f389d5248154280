//! Deployment state persistence: records, storage backends, locking.

pub mod local;
pub mod lock;
pub mod store;
pub mod types;

pub use local::LocalStateStore;
pub use lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
pub use store::StateStore;
pub use types::{DeploymentRecord, DeploymentStatus};
