//! Deployment record types.
//!
//! One record exists per deployment; it is the source of truth the
//! change-set coordinator diffs against, so it is mutated only on
//! successful deploys and executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cloud::StackOutput;
use crate::graph::Canvas;
use crate::keypair::KeyPairRecord;

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Initial submission in flight.
    Deploying,
    /// Last operation completed successfully.
    Deployed,
    /// A change-set execution is in flight.
    Updating,
    /// Last operation failed.
    Failed,
    /// Teardown in flight.
    Deleting,
}

/// Persisted state of one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment id (also the naming prefix).
    pub deployment_id: String,
    /// Provider-side stack name.
    pub name: String,
    /// Target region.
    pub region: String,
    /// The graph as last successfully applied.
    pub last_applied_graph: Canvas,
    /// Canonical hash of `last_applied_graph`, used for change-set
    /// staleness detection.
    pub graph_hash: String,
    /// Current lifecycle status.
    pub status: DeploymentStatus,
    /// Key pairs created for this deployment (no secret material).
    #[serde(default)]
    pub key_pairs: Vec<KeyPairRecord>,
    /// Stack outputs from the last completed operation.
    #[serde(default)]
    pub outputs: Vec<StackOutput>,
    /// When the deployment was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Creates a record for a freshly submitted deployment.
    #[must_use]
    pub fn new(
        deployment_id: &str,
        name: &str,
        region: &str,
        graph: Canvas,
        graph_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            deployment_id: deployment_id.to_string(),
            name: name.to_string(),
            region: region.to_string(),
            last_applied_graph: graph,
            graph_hash,
            status: DeploymentStatus::Deploying,
            key_pairs: vec![],
            outputs: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a newly applied graph after a successful execute.
    pub fn apply_graph(&mut self, graph: Canvas, graph_hash: String) {
        self.last_applied_graph = graph;
        self.graph_hash = graph_hash;
        self.status = DeploymentStatus::Deployed;
        self.touch();
    }

    /// Updates the status.
    pub fn set_status(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.touch();
    }

    /// Bumps the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
