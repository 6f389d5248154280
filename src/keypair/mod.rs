//! KeyPairLifecycle: ephemeral per-instance credentials.
//!
//! One key pair is created per compute node at deploy time. The private
//! material is handed back exactly once, in the deploy response that
//! created it, and is never persisted; only name and fingerprint are
//! retained for teardown matching.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cloud::CloudClient;
use crate::error::Result;
use crate::graph::ResourceKind;
use crate::naming::NameForge;

/// Suffix appended to the composed instance name.
pub const KEY_NAME_SUFFIX: &str = "-key";

/// Persisted record of a created key pair. Carries no secret material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPairRecord {
    /// Key-pair name.
    pub key_name: String,
    /// Public fingerprint.
    pub fingerprint: String,
    /// The compute node this pair belongs to.
    pub target_node_id: String,
}

/// A freshly created key pair, including the one-time secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedKeyPair {
    /// The persistable record.
    pub record: KeyPairRecord,
    /// Private key material. Exists only in this response.
    pub secret_material: String,
}

/// Creates and tears down per-instance key pairs.
pub struct KeyPairLifecycle {
    client: Arc<dyn CloudClient>,
    forge: NameForge,
}

impl KeyPairLifecycle {
    /// Creates a lifecycle manager over the given control plane.
    #[must_use]
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        Self {
            client,
            forge: NameForge::new(),
        }
    }

    /// Key-pair name for a compute node: the composed instance name plus
    /// [`KEY_NAME_SUFFIX`].
    ///
    /// # Errors
    ///
    /// Returns a validation error when no name can be composed for the
    /// node.
    pub fn key_name_for(&self, deployment_id: &str, node_id: &str, label: &str) -> Result<String> {
        let named = self
            .forge
            .compose(deployment_id, node_id, label, ResourceKind::Compute)?;
        Ok(format!("{}{KEY_NAME_SUFFIX}", named.composed_name))
    }

    /// Creates the key pair for one compute node.
    ///
    /// # Errors
    ///
    /// Propagates control-plane failures.
    pub async fn create_for_instance(
        &self,
        deployment_id: &str,
        node_id: &str,
        label: &str,
    ) -> Result<CreatedKeyPair> {
        let key_name = self.key_name_for(deployment_id, node_id, label)?;
        let material = self.client.create_key_pair(&key_name).await?;
        info!(key_name = %material.key_name, "created key pair");

        Ok(CreatedKeyPair {
            record: KeyPairRecord {
                key_name: material.key_name,
                fingerprint: material.fingerprint,
                target_node_id: node_id.to_string(),
            },
            secret_material: material.secret_material,
        })
    }

    /// Deletes every key pair belonging to a deployment.
    ///
    /// Matching is by naming prefix, not by the known-record list alone,
    /// so pairs created by earlier deploys/updates of the same deployment
    /// are covered too. A pair already absent is treated as cleaned.
    ///
    /// # Errors
    ///
    /// Propagates control-plane failures other than not-found.
    pub async fn cleanup_for_deployment(
        &self,
        deployment_id: &str,
        known_key_names: &[String],
    ) -> Result<usize> {
        let prefix = format!(
            "{}-",
            self.forge.sanitize(deployment_id, ResourceKind::Compute)
        );

        let mut targets: BTreeSet<String> = self
            .client
            .list_key_pairs(&prefix)
            .await?
            .into_iter()
            .map(|kp| kp.key_name)
            .filter(|name| name.ends_with(KEY_NAME_SUFFIX))
            .collect();
        targets.extend(known_key_names.iter().cloned());

        let mut deleted = 0;
        for key_name in &targets {
            match self.client.delete_key_pair(key_name).await {
                Ok(()) => {
                    debug!(%key_name, "deleted key pair");
                    deleted += 1;
                }
                Err(e) if e.is_transient_not_found() => {
                    debug!(%key_name, "key pair already absent");
                }
                Err(e) => return Err(e),
            }
        }

        info!(deployment_id, deleted, "key pair cleanup finished");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::FakeCloud;

    #[tokio::test]
    async fn test_create_returns_secret_once() {
        let cloud = Arc::new(FakeCloud::new());
        let lifecycle = KeyPairLifecycle::new(Arc::clone(&cloud) as Arc<dyn CloudClient>);

        let created = lifecycle
            .create_for_instance("default", "ec2_node_1", "Web Server")
            .await
            .expect("create");

        assert_eq!(created.record.key_name, "default-ec2-no-Web-Server-key");
        assert_eq!(created.record.target_node_id, "ec2_node_1");
        assert!(!created.secret_material.is_empty());
        assert_eq!(cloud.key_pair_names(), vec!["default-ec2-no-Web-Server-key"]);
    }

    #[tokio::test]
    async fn test_cleanup_covers_earlier_deploys() {
        let cloud = Arc::new(FakeCloud::new());
        let lifecycle = KeyPairLifecycle::new(Arc::clone(&cloud) as Arc<dyn CloudClient>);

        // Current deploy's pair plus one left over from an earlier update.
        lifecycle
            .create_for_instance("default", "ec2_node_1", "web")
            .await
            .expect("create");
        cloud
            .create_key_pair("default-old999-stale-key")
            .await
            .expect("seed stale pair");
        // Unrelated deployment's pair must survive.
        cloud
            .create_key_pair("other-ec2-no-web-key")
            .await
            .expect("seed other pair");

        let deleted = lifecycle
            .cleanup_for_deployment("default", &[])
            .await
            .expect("cleanup");

        assert_eq!(deleted, 2);
        assert_eq!(cloud.key_pair_names(), vec!["other-ec2-no-web-key"]);
    }

    #[tokio::test]
    async fn test_absent_pair_is_already_cleaned() {
        let cloud = Arc::new(FakeCloud::new());
        let lifecycle = KeyPairLifecycle::new(Arc::clone(&cloud) as Arc<dyn CloudClient>);

        let deleted = lifecycle
            .cleanup_for_deployment("default", &[String::from("default-gone-key")])
            .await
            .expect("absent pair is not an error");

        assert_eq!(deleted, 0);
    }
}
