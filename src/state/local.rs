//! Local file-based state storage backend.
//!
//! Records live under the user data directory by default, one JSON file
//! per deployment plus a lock file alongside it. Writes go through a
//! temp-file-then-rename so a crash never leaves a half-written record.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{FoundryError, Result, StateError};

use super::lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
use super::store::StateStore;
use super::types::DeploymentRecord;

/// Directory name under the user data dir.
const STATE_DIR: &str = "foundry";

/// Subdirectory holding per-deployment records.
const DEPLOYMENTS_DIR: &str = "deployments";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Directory holding record and lock files.
    base_dir: PathBuf,
}

impl LocalStateStore {
    /// Creates a store rooted at the default user data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| FoundryError::internal("Cannot determine user data directory"))?
            .join(STATE_DIR)
            .join(DEPLOYMENTS_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store rooted at a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn record_path(&self, deployment_id: &str) -> PathBuf {
        self.base_dir.join(format!("{deployment_id}.json"))
    }

    fn lock_path(&self, deployment_id: &str) -> PathBuf {
        self.base_dir.join(format!("{deployment_id}.lock"))
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                FoundryError::State(StateError::backend(format!(
                    "Failed to create state directory: {e}"
                )))
            })?;
        }
        Ok(())
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self, deployment_id: &str) -> Result<Option<LockInfo>> {
        let lock_path = self.lock_path(deployment_id);
        if !lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&lock_path).await.map_err(|e| {
            FoundryError::State(StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;

        let lock_info: LockInfo = serde_json::from_str(&content).map_err(|e| {
            FoundryError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })?;

        Ok(Some(lock_info))
    }

    /// Writes the lock file.
    async fn write_lock_file(&self, deployment_id: &str, lock_info: &LockInfo) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(lock_info).map_err(|e| {
            FoundryError::State(StateError::serialization(format!(
                "Failed to serialize lock: {e}"
            )))
        })?;

        let mut file = fs::File::create(self.lock_path(deployment_id))
            .await
            .map_err(|e| {
                FoundryError::State(StateError::LockFailed {
                    message: format!("Failed to create lock file: {e}"),
                })
            })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            FoundryError::State(StateError::LockFailed {
                message: format!("Failed to write lock file: {e}"),
            })
        })?;

        file.sync_all().await.map_err(|e| {
            FoundryError::State(StateError::LockFailed {
                message: format!("Failed to sync lock file: {e}"),
            })
        })?;

        Ok(())
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self, deployment_id: &str) -> Result<()> {
        let lock_path = self.lock_path(deployment_id);
        if lock_path.exists() {
            fs::remove_file(&lock_path).await.map_err(|e| {
                FoundryError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self, deployment_id: &str) -> Result<Option<DeploymentRecord>> {
        let record_path = self.record_path(deployment_id);
        if !record_path.exists() {
            debug!("Record file does not exist: {}", record_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&record_path).await.map_err(|e| {
            FoundryError::State(StateError::Corrupted {
                message: format!("Failed to read record file: {e}"),
            })
        })?;

        let record: DeploymentRecord = serde_json::from_str(&content).map_err(|e| {
            FoundryError::State(StateError::Corrupted {
                message: format!("Failed to parse record file: {e}"),
            })
        })?;

        Ok(Some(record))
    }

    async fn save(&self, record: &DeploymentRecord) -> Result<()> {
        self.ensure_dir().await?;

        let record_path = self.record_path(&record.deployment_id);
        debug!("Saving record to: {}", record_path.display());

        let content = serde_json::to_string_pretty(record).map_err(|e| {
            FoundryError::State(StateError::serialization(format!(
                "Failed to serialize record: {e}"
            )))
        })?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = record_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            FoundryError::State(StateError::backend(format!(
                "Failed to create temp record file: {e}"
            )))
        })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            FoundryError::State(StateError::backend(format!(
                "Failed to write record file: {e}"
            )))
        })?;

        file.sync_all().await.map_err(|e| {
            FoundryError::State(StateError::backend(format!(
                "Failed to sync record file: {e}"
            )))
        })?;

        fs::rename(&temp_path, &record_path).await.map_err(|e| {
            FoundryError::State(StateError::backend(format!(
                "Failed to rename record file: {e}"
            )))
        })?;

        Ok(())
    }

    async fn delete(&self, deployment_id: &str) -> Result<()> {
        let record_path = self.record_path(deployment_id);
        if record_path.exists() {
            info!("Deleting record file: {}", record_path.display());
            fs::remove_file(&record_path).await.map_err(|e| {
                FoundryError::State(StateError::backend(format!(
                    "Failed to delete record file: {e}"
                )))
            })?;
        }

        self.delete_lock_file(deployment_id).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(vec![]);
        }

        let mut ids = vec![];
        let mut entries = fs::read_dir(&self.base_dir).await.map_err(|e| {
            FoundryError::State(StateError::backend(format!(
                "Failed to read state directory: {e}"
            )))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            FoundryError::State(StateError::backend(format!(
                "Failed to read directory entry: {e}"
            )))
        })? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn acquire_lock(&self, deployment_id: &str, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file(deployment_id).await? {
            if !existing.is_expired() {
                return Err(FoundryError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        self.write_lock_file(deployment_id, &lock_info).await?;

        info!(
            "Acquired deployment lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, deployment_id: &str, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file(deployment_id).await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file(deployment_id).await?;
                info!("Released deployment lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn is_locked(&self, deployment_id: &str) -> Result<bool> {
        if let Some(lock_info) = self.read_lock_file(deployment_id).await? {
            return Ok(!lock_info.is_expired());
        }
        Ok(false)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Canvas;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path());
        (store, temp_dir)
    }

    fn record(deployment_id: &str) -> DeploymentRecord {
        DeploymentRecord::new(
            deployment_id,
            &format!("{deployment_id}-stack"),
            "us-east-1",
            Canvas::default(),
            String::from("hash"),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        store.save(&record("default")).await.expect("save");

        let loaded = store
            .load("default")
            .await
            .expect("load")
            .expect("record should exist");

        assert_eq!(loaded.deployment_id, "default");
        assert_eq!(loaded.region, "us-east-1");
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        let result = store.load("missing").await.expect("load should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_deployments() {
        let (store, _temp) = create_test_store();

        store.save(&record("alpha")).await.expect("save");
        store.save(&record("beta")).await.expect("save");

        assert_eq!(store.list().await.expect("list"), vec!["alpha", "beta"]);

        store.delete("alpha").await.expect("delete");
        assert_eq!(store.list().await.expect("list"), vec!["beta"]);
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store
            .acquire_lock("default", "test-holder")
            .await
            .expect("acquire");

        assert!(store.is_locked("default").await.expect("is_locked"));

        store
            .release_lock("default", &lock.lock_id)
            .await
            .expect("release");

        assert!(!store.is_locked("default").await.expect("is_locked"));
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();

        let _lock1 = store
            .acquire_lock("default", "holder-1")
            .await
            .expect("first lock");

        let result = store.acquire_lock("default", "holder-2").await;
        assert!(matches!(
            result,
            Err(FoundryError::State(StateError::LockedByOther { .. }))
        ));
    }

    #[tokio::test]
    async fn test_locks_are_per_deployment() {
        let (store, _temp) = create_test_store();

        let _lock = store
            .acquire_lock("default", "holder-1")
            .await
            .expect("lock");

        // A different deployment locks independently.
        assert!(store.acquire_lock("other", "holder-2").await.is_ok());
    }
}
