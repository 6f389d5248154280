//! Deployment orchestration.
//!
//! The deploy pipeline: validate the canvas, create per-instance key
//! pairs, derive names and roles, assemble the template, submit it with
//! the right capability flags, and persist the deployment record. The
//! consent check runs before any cloud resource is touched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cloud::{CloudClient, CreateStackRequest, StackDescription};
use crate::config::Settings;
use crate::error::{ChangeSetError, CloudError, FoundryError, Result};
use crate::graph::{Canvas, GraphHasher, GraphValidator};
use crate::keypair::{CreatedKeyPair, KeyPairLifecycle};
use crate::state::{DeploymentRecord, DeploymentStatus, StateStore};
use crate::template::TemplateComposer;

/// A deploy request from the surrounding system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    /// The drawn graph.
    pub canvas: Canvas,
    /// Target region; defaults to the configured region.
    pub region: Option<String>,
    /// Requested deployment id; resolved against the configured prefix
    /// policy when absent.
    pub deployment_id: Option<String>,
    /// Consent to create named identity roles. Required whenever the
    /// graph synthesizes owned roles.
    pub consent_named_identity: bool,
}

/// Response to a successful deploy submission.
///
/// This is the only place key-pair secret material ever appears.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    /// Resolved deployment id.
    pub deployment_id: String,
    /// Provider-side stack name.
    pub stack_name: String,
    /// Provider-assigned stack id.
    pub stack_id: String,
    /// Number of logical resources submitted; the progress denominator
    /// for tracking.
    pub resource_count: usize,
    /// Created key pairs, secrets included.
    pub key_pairs: Vec<CreatedKeyPair>,
    /// Node ids whose names fell back to a time-seeded token.
    pub degraded_names: Vec<String>,
}

/// Current state of a deployment, local record plus live description.
#[derive(Debug)]
pub struct DeploymentView {
    /// The persisted record.
    pub record: DeploymentRecord,
    /// Live control-plane description, when the stack is visible.
    pub stack: Option<StackDescription>,
}

/// Orchestrates deploys and teardowns.
pub struct Deployer {
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
}

impl Deployer {
    /// Creates a deployer.
    #[must_use]
    pub fn new(
        client: Arc<dyn CloudClient>,
        store: Arc<dyn StateStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    /// Stack name for a deployment id.
    #[must_use]
    pub fn stack_name_for(deployment_id: &str) -> String {
        format!("{deployment_id}-stack")
    }

    /// Submits a new deployment.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed canvas, or
    /// [`CloudError::ConsentRequired`] when the graph needs named
    /// identity roles and the request did not consent. Both abort before
    /// any cloud resource is created.
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployResponse> {
        let validator = GraphValidator::new();
        validator.validate(&request.canvas)?;

        let deployment_id = self
            .settings
            .resolve_deployment_id(request.deployment_id.as_deref());
        let stack_name = Self::stack_name_for(&deployment_id);
        let region = request
            .region
            .unwrap_or_else(|| self.settings.region.clone());

        let composer = TemplateComposer::new(&self.settings);

        // Dry pass without key names: the consent decision must come
        // before the first key pair exists.
        let precheck = composer.compose(&deployment_id, &request.canvas, &BTreeMap::new())?;
        if precheck.requires_named_identity_capability() && !request.consent_named_identity {
            return Err(FoundryError::Cloud(CloudError::ConsentRequired));
        }

        let lifecycle = KeyPairLifecycle::new(Arc::clone(&self.client));
        let mut key_pairs = vec![];
        let mut key_names: BTreeMap<String, String> = BTreeMap::new();
        for node in request.canvas.compute_nodes() {
            let created = lifecycle
                .create_for_instance(&deployment_id, &node.id, &node.label)
                .await?;
            key_names.insert(node.id.clone(), created.record.key_name.clone());
            key_pairs.push(created);
        }

        let manifest = composer.compose(&deployment_id, &request.canvas, &key_names)?;
        if !manifest.degraded_names.is_empty() {
            warn!(
                deployment_id,
                nodes = ?manifest.degraded_names,
                "degraded names: these resources will be replaced on the next deploy"
            );
        }

        // No record exists yet, so a failed submission must take the
        // just-created pairs with it or they leak until manual cleanup.
        let submission = self
            .client
            .create_stack(CreateStackRequest {
                stack_name: stack_name.clone(),
                template_body: manifest.body.clone(),
                region: region.clone(),
                capabilities: manifest.capabilities(),
            })
            .await;
        let stack_id = match submission {
            Ok(stack_id) => stack_id,
            Err(e) => {
                warn!(deployment_id, "submission failed; removing created key pairs");
                self.remove_key_pairs(&key_pairs).await;
                return Err(e);
            }
        };

        let hasher = GraphHasher::new();
        let graph_hash = hasher.hash_canvas(&request.canvas);
        let mut record = DeploymentRecord::new(
            &deployment_id,
            &stack_name,
            &region,
            request.canvas,
            graph_hash,
        );
        record.key_pairs = key_pairs.iter().map(|kp| kp.record.clone()).collect();
        self.store.save(&record).await?;

        info!(
            deployment_id,
            stack_name,
            resources = manifest.resource_count,
            "deployment submitted"
        );

        Ok(DeployResponse {
            deployment_id,
            stack_name,
            stack_id,
            resource_count: manifest.resource_count,
            key_pairs,
            degraded_names: manifest.degraded_names,
        })
    }

    /// Best-effort removal of key pairs created by a deploy that failed
    /// before any record was saved.
    async fn remove_key_pairs(&self, key_pairs: &[CreatedKeyPair]) {
        for created in key_pairs {
            let key_name = &created.record.key_name;
            if let Err(e) = self.client.delete_key_pair(key_name).await {
                if !e.is_transient_not_found() {
                    warn!(%key_name, error = %e, "failed to remove orphaned key pair");
                }
            }
        }
    }

    /// Fetches a deployment's record and, when visible, its live
    /// control-plane description.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeSetError::UnknownDeployment`] for an unknown id.
    pub async fn status(&self, deployment_id: &str) -> Result<DeploymentView> {
        let record = self
            .store
            .load(deployment_id)
            .await?
            .ok_or_else(|| unknown_deployment(deployment_id))?;

        let stack = match self.client.describe_stack(&record.name).await {
            Ok(description) => Some(description),
            Err(e) if e.is_transient_not_found() => None,
            Err(e) => return Err(e),
        };

        Ok(DeploymentView { record, stack })
    }

    /// Tears down a deployment.
    ///
    /// Deletes the stack, optionally all of the deployment's key pairs,
    /// and finally the local record.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeSetError::UnknownDeployment`] for an unknown id.
    pub async fn delete_deployment(
        &self,
        deployment_id: &str,
        cleanup_key_pairs: bool,
    ) -> Result<()> {
        let mut record = self
            .store
            .load(deployment_id)
            .await?
            .ok_or_else(|| unknown_deployment(deployment_id))?;

        record.set_status(DeploymentStatus::Deleting);
        self.store.save(&record).await?;

        self.client.delete_stack(&record.name).await?;

        if cleanup_key_pairs {
            let lifecycle = KeyPairLifecycle::new(Arc::clone(&self.client));
            let known: Vec<String> = record
                .key_pairs
                .iter()
                .map(|kp| kp.key_name.clone())
                .collect();
            lifecycle
                .cleanup_for_deployment(deployment_id, &known)
                .await?;
        }

        self.store.delete(deployment_id).await?;
        info!(deployment_id, "deployment deleted");
        Ok(())
    }

    /// Lists known deployment ids.
    ///
    /// # Errors
    ///
    /// Propagates state-backend failures.
    pub async fn list_deployments(&self) -> Result<Vec<String>> {
        self.store.list().await
    }
}

fn unknown_deployment(deployment_id: &str) -> FoundryError {
    FoundryError::ChangeSet(ChangeSetError::UnknownDeployment {
        deployment_id: deployment_id.to_string(),
    })
}
