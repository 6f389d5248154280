//! Control-plane client trait.
//!
//! The trait is the seam between orchestration logic and the provider
//! API; tests substitute an in-memory implementation.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{
    CreateChangeSetRequest, CreateStackRequest, KeyPairInfo, KeyPairMaterial, RemoteChangeSet,
    StackDescription, StackEvent,
};

/// Operations this core needs from the cloud control plane.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Creates a new stack and returns its provider-assigned id.
    async fn create_stack(&self, request: CreateStackRequest) -> Result<String>;

    /// Describes a stack by name.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::NotFoundTransient`](crate::error::CloudError)
    /// when the stack is not (yet) visible.
    async fn describe_stack(&self, stack_name: &str) -> Result<StackDescription>;

    /// Fetches the full event list for a stack, newest-first.
    async fn describe_stack_events(&self, stack_name: &str) -> Result<Vec<StackEvent>>;

    /// Deletes a stack.
    async fn delete_stack(&self, stack_name: &str) -> Result<()>;

    /// Creates a change set and returns its provider-assigned id.
    async fn create_change_set(&self, request: CreateChangeSetRequest) -> Result<String>;

    /// Describes a change set.
    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_id: &str,
    ) -> Result<RemoteChangeSet>;

    /// Executes a previously created change set.
    async fn execute_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()>;

    /// Deletes (cancels) a change set without executing it.
    async fn delete_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()>;

    /// Creates a key pair, returning the one-time secret material.
    async fn create_key_pair(&self, key_name: &str) -> Result<KeyPairMaterial>;

    /// Deletes a key pair.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::NotFoundTransient`](crate::error::CloudError)
    /// when the pair does not exist.
    async fn delete_key_pair(&self, key_name: &str) -> Result<()>;

    /// Lists key pairs whose name starts with the given prefix.
    async fn list_key_pairs(&self, prefix: &str) -> Result<Vec<KeyPairInfo>>;
}
