//! Change-set lifecycle: preview, execute, cancel.
//!
//! A change set is single-use: exactly what the user previewed is what
//! executes, with no recomputation in between. Staleness is detected by
//! comparing the applied graph's canonical hash at preview time against
//! the hash at execute time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cloud::{CloudClient, CreateChangeSetRequest, RemoteChangeSetStatus};
use crate::config::Settings;
use crate::error::{ChangeSetError, FoundryError, Result};
use crate::graph::{Canvas, GraphHasher, GraphValidator};
use crate::state::{DeploymentStatus, StateStore};
use crate::template::TemplateComposer;

use super::diff::{DiffEngine, ResourceChange};

/// Maximum polls while the control plane computes a change set.
const COMPUTE_WAIT_ATTEMPTS: u32 = 60;

/// Delay between computation polls in milliseconds.
const COMPUTE_WAIT_MS: u64 = 500;

/// Lifecycle status of a computed change set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSetStatus {
    /// Still being computed.
    Creating,
    /// Computed and executable.
    Ready,
    /// Computation failed or produced no changes.
    Failed,
}

/// A computed, reviewable diff between applied and proposed graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Change-set id (the execute/cancel handle).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Lifecycle status.
    pub status: ChangeSetStatus,
    /// True when at least one resource changes.
    pub has_changes: bool,
    /// Per-resource classification.
    pub changes: Vec<ResourceChange>,
}

/// Result of executing a change set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The deployment that was updated.
    pub deployment_id: String,
    /// The consumed change set.
    pub change_set_id: String,
    /// Provider-side stack name.
    pub stack_name: String,
    /// Number of resource changes applied.
    pub applied_changes: usize,
}

/// A previewed change set awaiting execute or cancel.
struct Pending {
    deployment_id: String,
    stack_name: String,
    graph: Canvas,
    /// Hash of the applied graph at preview time; execute-time mismatch
    /// means the deployment moved underneath the preview.
    preview_hash: String,
    changes: Vec<ResourceChange>,
    consumed: bool,
}

/// Coordinates the change-set lifecycle for all deployments.
pub struct ChangeSetCoordinator {
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
    pending: Mutex<HashMap<String, Pending>>,
}

impl ChangeSetCoordinator {
    /// Creates a coordinator.
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
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Computes a change set for an edited graph.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeSetError::UnknownDeployment`] for an unknown id,
    /// or a validation error for a malformed or kind-changing edit.
    pub async fn preview(&self, deployment_id: &str, edited: &Canvas) -> Result<ChangeSet> {
        let record = self
            .store
            .load(deployment_id)
            .await?
            .ok_or_else(|| unknown_deployment(deployment_id))?;

        let validator = GraphValidator::new();
        validator.validate_update(edited, &record.last_applied_graph)?;

        let engine = DiffEngine::new();
        let changes = engine.diff(deployment_id, &record.last_applied_graph, edited)?;

        if changes.is_empty() {
            info!(deployment_id, "preview produced no changes");
            return Ok(ChangeSet {
                id: Uuid::new_v4().to_string(),
                name: format!("{deployment_id}-noop"),
                status: ChangeSetStatus::Failed,
                has_changes: false,
                changes: vec![],
            });
        }

        // Key pairs survive from the applied graph; nodes added in an
        // update run without one until the next full deploy.
        let key_names: BTreeMap<String, String> = record
            .key_pairs
            .iter()
            .map(|kp| (kp.target_node_id.clone(), kp.key_name.clone()))
            .collect();

        let composer = TemplateComposer::new(&self.settings);
        let manifest = composer.compose(deployment_id, edited, &key_names)?;

        let change_set_name = format!(
            "{deployment_id}-{}",
            &Uuid::new_v4().to_string()[..8]
        );
        let capabilities = manifest.capabilities();
        let change_set_id = self
            .client
            .create_change_set(CreateChangeSetRequest {
                stack_name: record.name.clone(),
                change_set_name: change_set_name.clone(),
                template_body: manifest.body,
                capabilities,
            })
            .await?;

        self.wait_for_computation(&record.name, &change_set_id)
            .await?;

        info!(
            deployment_id,
            change_set_id,
            changes = changes.len(),
            "change set previewed"
        );

        let replacements = changes.iter().filter(|c| c.requires_replacement).count();
        if replacements > 0 {
            warn!(
                deployment_id,
                replacements, "change set contains destructive replacements"
            );
        }

        self.pending.lock().expect("pending change sets").insert(
            change_set_id.clone(),
            Pending {
                deployment_id: deployment_id.to_string(),
                stack_name: record.name.clone(),
                graph: edited.clone(),
                preview_hash: record.graph_hash.clone(),
                changes: changes.clone(),
                consumed: false,
            },
        );

        Ok(ChangeSet {
            id: change_set_id,
            name: change_set_name,
            status: ChangeSetStatus::Ready,
            has_changes: true,
            changes,
        })
    }

    /// Polls until the control plane finishes computing a change set.
    async fn wait_for_computation(&self, stack_name: &str, change_set_id: &str) -> Result<()> {
        for _ in 0..COMPUTE_WAIT_ATTEMPTS {
            let remote = self
                .client
                .describe_change_set(stack_name, change_set_id)
                .await?;
            match remote.status {
                RemoteChangeSetStatus::Ready => return Ok(()),
                RemoteChangeSetStatus::Failed => {
                    return Err(FoundryError::ChangeSet(ChangeSetError::CreationFailed {
                        reason: remote
                            .status_reason
                            .unwrap_or_else(|| String::from("no reason reported")),
                    }));
                }
                RemoteChangeSetStatus::Creating => {
                    tokio::time::sleep(std::time::Duration::from_millis(COMPUTE_WAIT_MS)).await;
                }
            }
        }
        Err(FoundryError::ChangeSet(ChangeSetError::CreationFailed {
            reason: String::from("timed out waiting for computation"),
        }))
    }

    /// Executes a previously previewed change set, verbatim.
    ///
    /// Serialized per deployment via the state lock; a stale change set
    /// (the deployment changed since preview) fails with a Conflict.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeSetError::NotFound`], [`ChangeSetError::AlreadyConsumed`],
    /// or [`ChangeSetError::Conflict`].
    pub async fn execute(&self, deployment_id: &str, change_set_id: &str) -> Result<ExecutionResult> {
        let holder = crate::state::generate_holder_id();
        let lock = self.store.acquire_lock(deployment_id, &holder).await?;
        let result = self.execute_locked(deployment_id, change_set_id).await;
        self.store.release_lock(deployment_id, &lock.lock_id).await?;
        result
    }

    async fn execute_locked(
        &self,
        deployment_id: &str,
        change_set_id: &str,
    ) -> Result<ExecutionResult> {
        let (stack_name, graph, preview_hash, applied_changes) = {
            let pending = self.pending.lock().expect("pending change sets");
            let entry = pending.get(change_set_id).ok_or_else(|| {
                FoundryError::ChangeSet(ChangeSetError::NotFound {
                    change_set_id: change_set_id.to_string(),
                })
            })?;
            if entry.deployment_id != deployment_id {
                return Err(FoundryError::ChangeSet(ChangeSetError::NotFound {
                    change_set_id: change_set_id.to_string(),
                }));
            }
            if entry.consumed {
                return Err(FoundryError::ChangeSet(ChangeSetError::AlreadyConsumed {
                    change_set_id: change_set_id.to_string(),
                }));
            }
            (
                entry.stack_name.clone(),
                entry.graph.clone(),
                entry.preview_hash.clone(),
                entry.changes.len(),
            )
        };

        let mut record = self
            .store
            .load(deployment_id)
            .await?
            .ok_or_else(|| unknown_deployment(deployment_id))?;

        if record.graph_hash != preview_hash {
            warn!(deployment_id, change_set_id, "change set is stale");
            return Err(FoundryError::ChangeSet(ChangeSetError::Conflict {
                change_set_id: change_set_id.to_string(),
                deployment_id: deployment_id.to_string(),
            }));
        }

        self.client
            .execute_change_set(&stack_name, change_set_id)
            .await?;

        let hasher = GraphHasher::new();
        let new_hash = hasher.hash_canvas(&graph);
        record.apply_graph(graph, new_hash);
        record.set_status(DeploymentStatus::Updating);
        self.store.save(&record).await?;

        if let Some(entry) = self
            .pending
            .lock()
            .expect("pending change sets")
            .get_mut(change_set_id)
        {
            entry.consumed = true;
        }

        info!(deployment_id, change_set_id, "change set executed");

        Ok(ExecutionResult {
            deployment_id: deployment_id.to_string(),
            change_set_id: change_set_id.to_string(),
            stack_name,
            applied_changes,
        })
    }

    /// Cancels a previewed change set without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeSetError::NotFound`] or [`ChangeSetError::AlreadyConsumed`].
    pub async fn cancel(&self, deployment_id: &str, change_set_id: &str) -> Result<()> {
        let stack_name = {
            let pending = self.pending.lock().expect("pending change sets");
            let entry = pending.get(change_set_id).ok_or_else(|| {
                FoundryError::ChangeSet(ChangeSetError::NotFound {
                    change_set_id: change_set_id.to_string(),
                })
            })?;
            if entry.deployment_id != deployment_id {
                return Err(FoundryError::ChangeSet(ChangeSetError::NotFound {
                    change_set_id: change_set_id.to_string(),
                }));
            }
            if entry.consumed {
                return Err(FoundryError::ChangeSet(ChangeSetError::AlreadyConsumed {
                    change_set_id: change_set_id.to_string(),
                }));
            }
            entry.stack_name.clone()
        };

        self.client
            .delete_change_set(&stack_name, change_set_id)
            .await?;
        self.pending
            .lock()
            .expect("pending change sets")
            .remove(change_set_id);

        info!(deployment_id, change_set_id, "change set cancelled");
        Ok(())
    }
}

fn unknown_deployment(deployment_id: &str) -> FoundryError {
    FoundryError::ChangeSet(ChangeSetError::UnknownDeployment {
        deployment_id: deployment_id.to_string(),
    })
}
