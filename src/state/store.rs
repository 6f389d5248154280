//! State store trait definition.

use async_trait::async_trait;

use crate::error::Result;

use super::lock::LockInfo;
use super::types::DeploymentRecord;

/// Storage backend for deployment records.
///
/// All operations are keyed by deployment id; one backend serves every
/// deployment on this machine.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads a deployment record.
    ///
    /// Returns `None` if no record exists for the id.
    async fn load(&self, deployment_id: &str) -> Result<Option<DeploymentRecord>>;

    /// Saves a deployment record.
    async fn save(&self, record: &DeploymentRecord) -> Result<()>;

    /// Deletes a deployment record and its lock.
    async fn delete(&self, deployment_id: &str) -> Result<()>;

    /// Lists all known deployment ids.
    async fn list(&self) -> Result<Vec<String>>;

    /// Acquires the per-deployment execution lock.
    ///
    /// An empty holder string gets a generated process-unique id.
    async fn acquire_lock(&self, deployment_id: &str, holder: &str) -> Result<LockInfo>;

    /// Releases the execution lock if `lock_id` matches the holder.
    async fn release_lock(&self, deployment_id: &str, lock_id: &str) -> Result<()>;

    /// Checks whether a deployment is currently locked.
    async fn is_locked(&self, deployment_id: &str) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
