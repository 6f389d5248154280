//! Name-based graph diffing.
//!
//! Logical resources are keyed by their composed physical name, which is
//! stable for an unchanged `(deploymentId, nodeId, label)` triple. A
//! label edit therefore shows up as Remove + Add, which is exactly what
//! the provider would do: renames are destructive.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::graph::{Canvas, GraphNode, ResourceKind};
use crate::naming::NameForge;

/// How a logical resource changes between applied and edited graphs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// New name, not previously present.
    Add,
    /// Name stable, attributes differ.
    Modify,
    /// Previously present name now absent.
    Remove,
}

/// One entry in a computed change set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceChange {
    /// Classification.
    pub action: ChangeAction,
    /// Logical id of the resource.
    pub logical_id: String,
    /// Resource kind.
    pub resource_kind: ResourceKind,
    /// Composed physical name.
    pub physical_name: String,
    /// True when applying this Modify forces destructive replacement.
    /// Always false for Add; always true for Remove.
    pub requires_replacement: bool,
}

/// Attributes that force replacement when changed, per kind.
const fn immutable_attrs(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        // Bucket properties update in place.
        ResourceKind::ObjectStore => &[],
        ResourceKind::Compute => &["imageId"],
        ResourceKind::Table => &["partitionKey"],
        ResourceKind::RelationalDb => &["engine", "dbName", "masterUsername"],
    }
}

/// Computes change sets between two canvases.
#[derive(Debug, Default)]
pub struct DiffEngine {
    forge: NameForge,
}

impl DiffEngine {
    /// Creates a diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forge: NameForge::new(),
        }
    }

    /// Diffs the edited canvas against the applied one.
    ///
    /// Entries come back sorted by logical id, Adds and Modifies before
    /// Removes.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a node's name cannot be composed.
    pub fn diff(
        &self,
        deployment_id: &str,
        applied: &Canvas,
        edited: &Canvas,
    ) -> Result<Vec<ResourceChange>> {
        let applied_by_name = self.index_by_name(deployment_id, applied)?;
        let edited_by_name = self.index_by_name(deployment_id, edited)?;

        let mut changes = vec![];

        for (name, node) in &edited_by_name {
            match applied_by_name.get(name) {
                None => changes.push(ResourceChange {
                    action: ChangeAction::Add,
                    logical_id: node.logical_id(),
                    resource_kind: node.kind,
                    physical_name: name.clone(),
                    requires_replacement: false,
                }),
                Some(previous) => {
                    let changed = changed_attrs(previous, node);
                    if changed.is_empty() {
                        continue;
                    }
                    changes.push(ResourceChange {
                        action: ChangeAction::Modify,
                        logical_id: node.logical_id(),
                        resource_kind: node.kind,
                        physical_name: name.clone(),
                        requires_replacement: immutable_attrs(node.kind)
                            .iter()
                            .any(|attr| changed.contains(*attr)),
                    });
                }
            }
        }

        for (name, node) in &applied_by_name {
            if !edited_by_name.contains_key(name) {
                changes.push(ResourceChange {
                    action: ChangeAction::Remove,
                    logical_id: node.logical_id(),
                    resource_kind: node.kind,
                    physical_name: name.clone(),
                    requires_replacement: true,
                });
            }
        }

        Ok(changes)
    }

    /// Composed name → node, for every node in the canvas.
    fn index_by_name<'c>(
        &self,
        deployment_id: &str,
        canvas: &'c Canvas,
    ) -> Result<BTreeMap<String, &'c GraphNode>> {
        let mut index = BTreeMap::new();
        for node in &canvas.nodes {
            let named = self
                .forge
                .compose(deployment_id, &node.id, &node.label, node.kind)?;
            index.insert(named.composed_name, node);
        }
        Ok(index)
    }
}

/// Keys whose values differ between the two nodes' attribute maps.
fn changed_attrs<'n>(a: &'n GraphNode, b: &'n GraphNode) -> BTreeSet<&'n str> {
    let mut keys: BTreeSet<&str> = a.attributes.keys().map(String::as_str).collect();
    keys.extend(b.attributes.keys().map(String::as_str));

    keys.into_iter()
        .filter(|key| a.attributes.get(*key) != b.attributes.get(*key))
        .collect()
}
