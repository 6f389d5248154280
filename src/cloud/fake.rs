//! In-memory control plane for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CloudError, FoundryError, Result};

use super::client::CloudClient;
use super::types::{
    CreateChangeSetRequest, CreateStackRequest, KeyPairInfo, KeyPairMaterial, RemoteChangeSet,
    RemoteChangeSetStatus, StackDescription, StackEvent,
};

#[derive(Debug, Default)]
struct FakeState {
    stacks: HashMap<String, StackDescription>,
    /// Per-stack events, newest-first (the order the API returns).
    events: HashMap<String, Vec<StackEvent>>,
    change_sets: HashMap<String, RemoteChangeSet>,
    executed_change_sets: Vec<String>,
    deleted_change_sets: Vec<String>,
    key_pairs: HashMap<String, KeyPairInfo>,
    key_pair_counter: u64,
    fail_polls: bool,
    fail_stack_creation: bool,
    next_change_set_status: Option<RemoteChangeSetStatus>,
}

/// In-memory [`CloudClient`] implementation.
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    /// Creates an empty fake control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stack with the given status.
    pub fn put_stack(&self, stack_name: &str, status: &str) {
        let mut state = self.state.lock().expect("fake state");
        state.stacks.insert(
            stack_name.to_string(),
            StackDescription {
                stack_id: format!("stack-{stack_name}"),
                stack_name: stack_name.to_string(),
                status: status.to_string(),
                status_reason: None,
                outputs: vec![],
            },
        );
    }

    /// Prepends an event to a stack's event list (newest-first order).
    pub fn push_event(&self, stack_name: &str, event: StackEvent) {
        let mut state = self.state.lock().expect("fake state");
        state
            .events
            .entry(stack_name.to_string())
            .or_default()
            .insert(0, event);
    }

    /// Makes the next created change set report the given status
    /// instead of `Ready`.
    pub fn next_change_set_status(&self, status: RemoteChangeSetStatus) {
        self.state.lock().expect("fake state").next_change_set_status = Some(status);
    }

    /// Makes stack creation fail with an API error.
    pub fn fail_stack_creation(&self) {
        self.state.lock().expect("fake state").fail_stack_creation = true;
    }

    /// Makes all subsequent event polls fail with a network error.
    pub fn fail_polls(&self) {
        self.state.lock().expect("fake state").fail_polls = true;
    }

    /// Change-set ids that have been executed.
    #[must_use]
    pub fn executed_change_sets(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("fake state")
            .executed_change_sets
            .clone()
    }

    /// Change-set ids that have been deleted without execution.
    #[must_use]
    pub fn deleted_change_sets(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("fake state")
            .deleted_change_sets
            .clone()
    }

    /// Names of currently existing key pairs.
    #[must_use]
    pub fn key_pair_names(&self) -> Vec<String> {
        let state = self.state.lock().expect("fake state");
        let mut names: Vec<String> = state.key_pairs.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn create_stack(&self, request: CreateStackRequest) -> Result<String> {
        let stack_id = format!("stack-{}", request.stack_name);
        let mut state = self.state.lock().expect("fake state");
        if state.fail_stack_creation {
            return Err(FoundryError::Cloud(CloudError::api_error(
                500,
                String::from("internal error"),
            )));
        }
        state.stacks.insert(
            request.stack_name.clone(),
            StackDescription {
                stack_id: stack_id.clone(),
                stack_name: request.stack_name,
                status: String::from("CREATE_IN_PROGRESS"),
                status_reason: None,
                outputs: vec![],
            },
        );
        Ok(stack_id)
    }

    async fn describe_stack(&self, stack_name: &str) -> Result<StackDescription> {
        let state = self.state.lock().expect("fake state");
        state
            .stacks
            .get(stack_name)
            .cloned()
            .ok_or_else(|| {
                FoundryError::Cloud(CloudError::NotFoundTransient {
                    stack_name: stack_name.to_string(),
                })
            })
    }

    async fn describe_stack_events(&self, stack_name: &str) -> Result<Vec<StackEvent>> {
        let state = self.state.lock().expect("fake state");
        if state.fail_polls {
            return Err(FoundryError::Cloud(CloudError::network("connection reset")));
        }
        if !state.stacks.contains_key(stack_name) {
            return Err(FoundryError::Cloud(CloudError::NotFoundTransient {
                stack_name: stack_name.to_string(),
            }));
        }
        Ok(state.events.get(stack_name).cloned().unwrap_or_default())
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<()> {
        let mut state = self.state.lock().expect("fake state");
        state.stacks.remove(stack_name);
        state.events.remove(stack_name);
        Ok(())
    }

    async fn create_change_set(&self, _request: CreateChangeSetRequest) -> Result<String> {
        let mut state = self.state.lock().expect("fake state");
        let id = format!("cs-{}", state.change_sets.len() + 1);
        let status = state
            .next_change_set_status
            .take()
            .unwrap_or(RemoteChangeSetStatus::Ready);
        state.change_sets.insert(
            id.clone(),
            RemoteChangeSet {
                change_set_id: id.clone(),
                status,
                status_reason: None,
            },
        );
        Ok(id)
    }

    async fn describe_change_set(
        &self,
        _stack_name: &str,
        change_set_id: &str,
    ) -> Result<RemoteChangeSet> {
        let state = self.state.lock().expect("fake state");
        state
            .change_sets
            .get(change_set_id)
            .cloned()
            .ok_or_else(|| {
                FoundryError::Cloud(CloudError::NotFoundTransient {
                    stack_name: change_set_id.to_string(),
                })
            })
    }

    async fn execute_change_set(&self, _stack_name: &str, change_set_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("fake state");
        state.executed_change_sets.push(change_set_id.to_string());
        Ok(())
    }

    async fn delete_change_set(&self, _stack_name: &str, change_set_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("fake state");
        state.change_sets.remove(change_set_id);
        state.deleted_change_sets.push(change_set_id.to_string());
        Ok(())
    }

    async fn create_key_pair(&self, key_name: &str) -> Result<KeyPairMaterial> {
        let mut state = self.state.lock().expect("fake state");
        state.key_pair_counter += 1;
        let fingerprint = format!("fp:{:02x}", state.key_pair_counter);
        state.key_pairs.insert(
            key_name.to_string(),
            KeyPairInfo {
                key_name: key_name.to_string(),
                fingerprint: fingerprint.clone(),
            },
        );
        Ok(KeyPairMaterial {
            key_name: key_name.to_string(),
            fingerprint,
            secret_material: format!("-----BEGIN KEY-----{key_name}-----END KEY-----"),
        })
    }

    async fn delete_key_pair(&self, key_name: &str) -> Result<()> {
        let mut state = self.state.lock().expect("fake state");
        if state.key_pairs.remove(key_name).is_none() {
            return Err(FoundryError::Cloud(CloudError::NotFoundTransient {
                stack_name: key_name.to_string(),
            }));
        }
        Ok(())
    }

    async fn list_key_pairs(&self, prefix: &str) -> Result<Vec<KeyPairInfo>> {
        let state = self.state.lock().expect("fake state");
        let mut pairs: Vec<KeyPairInfo> = state
            .key_pairs
            .values()
            .filter(|kp| kp.key_name.starts_with(prefix))
            .cloned()
            .collect();
        pairs.sort_by(|a, b| a.key_name.cmp(&b.key_name));
        Ok(pairs)
    }
}
