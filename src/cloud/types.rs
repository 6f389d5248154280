//! Control-plane wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capability flag that must accompany any template creating named
/// identity roles.
pub const CAPABILITY_NAMED_IDENTITY: &str = "CAPABILITY_NAMED_IAM";

/// Request to create a new stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStackRequest {
    /// Provider-side stack name.
    pub stack_name: String,
    /// Assembled template body.
    pub template_body: serde_json::Value,
    /// Target region.
    pub region: String,
    /// Declared capabilities (see [`CAPABILITY_NAMED_IDENTITY`]).
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// A stack as described by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDescription {
    /// Provider-assigned stack id.
    pub stack_id: String,
    /// Stack name.
    pub stack_name: String,
    /// Current status token (e.g. `CREATE_IN_PROGRESS`).
    pub status: String,
    /// Reason attached to the current status, if any.
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Declared outputs, populated once the stack completes.
    #[serde(default)]
    pub outputs: Vec<StackOutput>,
}

/// One declared stack output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Output value.
    pub value: String,
    /// Optional human description.
    #[serde(default)]
    pub description: Option<String>,
}

/// One control-plane event for a stack resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackEvent {
    /// Unique event id; the dedup key.
    pub event_id: String,
    /// Logical id of the affected resource (the stack itself for
    /// stack-level events).
    pub logical_id: String,
    /// Provider resource type string.
    pub resource_type: String,
    /// Status token for this transition.
    pub status: String,
    /// Physical id, once assigned.
    #[serde(default)]
    pub physical_id: Option<String>,
    /// Reason attached to the status, if any.
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Request to create a change set against an existing stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChangeSetRequest {
    /// Target stack.
    pub stack_name: String,
    /// Name for the change set.
    pub change_set_name: String,
    /// Proposed template body.
    pub template_body: serde_json::Value,
    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Change-set status as reported by the control plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteChangeSetStatus {
    /// Still being computed.
    Creating,
    /// Computed and executable.
    Ready,
    /// Computation failed (including "no changes").
    Failed,
}

/// A change set as described by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChangeSet {
    /// Provider-assigned change-set id.
    pub change_set_id: String,
    /// Current status.
    pub status: RemoteChangeSetStatus,
    /// Reason attached to the status, if any.
    #[serde(default)]
    pub status_reason: Option<String>,
}

/// Freshly created key-pair material.
///
/// `secret_material` exists only in the response that created it; it is
/// never persisted and never logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairMaterial {
    /// Key-pair name.
    pub key_name: String,
    /// Public fingerprint.
    pub fingerprint: String,
    /// The one-time private key material.
    pub secret_material: String,
}

/// A key pair as listed by the control plane (no secret material).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairInfo {
    /// Key-pair name.
    pub key_name: String,
    /// Public fingerprint.
    pub fingerprint: String,
}
