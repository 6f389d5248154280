//! Error types for the Foundry deployment core.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the deployment lifecycle: graph validation, naming, change sets,
//! control-plane access, event tracking, and state management.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Foundry deployment core.
#[derive(Debug, Error)]
pub enum FoundryError {
    /// Graph validation errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Control-plane errors.
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Change-set lifecycle errors.
    #[error("Change set error: {0}")]
    ChangeSet(#[from] ChangeSetError),

    /// Event tracking errors.
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Graph validation errors.
///
/// These abort a deploy or update before any cloud resource is touched.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node references an unknown resource kind.
    #[error("Unknown resource kind '{kind}' on node {node_id}")]
    UnknownKind {
        /// Node carrying the unknown kind.
        node_id: String,
        /// The unrecognized kind string.
        kind: String,
    },

    /// Two nodes share the same id.
    #[error("Duplicate node id: {node_id}")]
    DuplicateNodeId {
        /// The duplicated id.
        node_id: String,
    },

    /// An edge references a node that does not exist.
    #[error("Edge references missing node: {node_id}")]
    DanglingEdge {
        /// The missing endpoint.
        node_id: String,
    },

    /// A node id was reused for a different resource kind between edits.
    #[error("Node {node_id} changed kind from {previous} to {current}; kind is immutable per id")]
    KindChanged {
        /// The reused id.
        node_id: String,
        /// Kind in the applied graph.
        previous: String,
        /// Kind in the edited graph.
        current: String,
    },

    /// The sanitizer produced an empty or illegal token.
    #[error("Sanitizer produced an empty token for '{input}' (node {node_id})")]
    EmptyToken {
        /// Node whose name could not be derived.
        node_id: String,
        /// The offending raw input.
        input: String,
    },

    /// General validation failure.
    #[error("Graph validation failed: {message}")]
    Invalid {
        /// Description of the failure.
        message: String,
    },
}

/// Control-plane errors.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Authentication against the control plane failed.
    #[error("Control plane authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed with a status code.
    #[error("Control plane request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// The deployment/stack is not yet visible to the control plane.
    ///
    /// Expected transiently right after submission; pollers treat this as
    /// "zero new events", never as a failure.
    #[error("Stack not found (transient): {stack_name}")]
    NotFoundTransient {
        /// Stack that is not visible yet.
        stack_name: String,
    },

    /// The submitted template creates named identity resources but the
    /// request did not carry the required capability consent.
    #[error(
        "Consent required: template declares named identity roles; \
         resubmit with the named-IAM capability flag enabled"
    )]
    ConsentRequired,

    /// Rate limited by the control plane.
    #[error("Control plane rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error talking to the control plane.
    #[error("Network error communicating with control plane: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the control plane.
    #[error("Invalid response from control plane: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Change-set lifecycle errors.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// No change set with the given id is pending.
    #[error("Change set not found: {change_set_id}")]
    NotFound {
        /// The unknown change set id.
        change_set_id: String,
    },

    /// The deployment changed since the change set was previewed.
    #[error(
        "Change set {change_set_id} is stale: deployment {deployment_id} \
         changed since preview; re-run preview"
    )]
    Conflict {
        /// The stale change set.
        change_set_id: String,
        /// The deployment it targets.
        deployment_id: String,
    },

    /// The change set failed to compute on the control plane.
    #[error("Change set creation failed: {reason}")]
    CreationFailed {
        /// Reason reported by the control plane.
        reason: String,
    },

    /// The change set was already executed or cancelled.
    #[error("Change set {change_set_id} was already consumed")]
    AlreadyConsumed {
        /// The consumed change set id.
        change_set_id: String,
    },

    /// No deployment record exists for the target.
    #[error("Unknown deployment: {deployment_id}")]
    UnknownDeployment {
        /// The missing deployment.
        deployment_id: String,
    },
}

/// Event tracking errors.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Polling failed with a non-transient control-plane error.
    ///
    /// The poll loop for the affected deployment stops; other deployments'
    /// loops are unaffected.
    #[error("Polling failed for {stack_name}: {message}")]
    PollFailed {
        /// Stack whose loop failed.
        stack_name: String,
        /// Underlying failure.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Record file not found.
    #[error("Deployment record not found: {path}")]
    NotFound {
        /// Path to the missing record file.
        path: PathBuf,
    },

    /// Record is corrupted.
    #[error("Deployment record is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire deployment lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Lock is held by another process.
    #[error("Deployment is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("Record serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Storage backend error.
    #[error("State backend error: {message}")]
    BackendError {
        /// Description of the backend error.
        message: String,
    },
}

/// Result type alias for Foundry operations.
pub type Result<T> = std::result::Result<T, FoundryError>;

impl FoundryError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Cloud(
                CloudError::RateLimited { .. } | CloudError::NetworkError { .. }
            ) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns true if this is the transient not-found condition the
    /// earliest poll window absorbs.
    #[must_use]
    pub const fn is_transient_not_found(&self) -> bool {
        matches!(self, Self::Cloud(CloudError::NotFoundTransient { .. }))
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Cloud(CloudError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            Self::Cloud(CloudError::NetworkError { .. }) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl GraphError {
    /// Creates a general validation error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl CloudError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
