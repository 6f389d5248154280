//! Canvas data model.
//!
//! These types map to the JSON the canvas editor produces. They are
//! immutable per deploy/update call; the caller owns the canvas.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user-drawn resource graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Canvas {
    /// Resource nodes.
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Connections between nodes.
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// A single resource node on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    /// Canvas-assigned node id (stable across edits).
    pub id: String,
    /// Resource kind.
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// User-facing label.
    #[serde(default)]
    pub label: String,
    /// Kind-specific attributes, passed through to template assembly.
    ///
    /// A `BTreeMap` keeps serialization order deterministic for hashing.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// A connection between two nodes.
///
/// Undirected at input; interpreted directionally (compute node →
/// dependency) when the dependency map is derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphEdge {
    /// One endpoint.
    pub from: String,
    /// The other endpoint.
    pub to: String,
}

/// Supported resource kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A compute instance (runs user workloads, may hold a role).
    Compute,
    /// An object store bucket.
    ObjectStore,
    /// A key-value table.
    Table,
    /// A managed relational database.
    RelationalDb,
}

impl ResourceKind {
    /// Logical-id prefix for this kind.
    #[must_use]
    pub const fn logical_prefix(&self) -> &'static str {
        match self {
            Self::Compute => "Compute",
            Self::ObjectStore => "Bucket",
            Self::Table => "Table",
            Self::RelationalDb => "Database",
        }
    }

    /// Returns true when this kind can execute code and hold a role.
    #[must_use]
    pub const fn is_executable(&self) -> bool {
        matches!(self, Self::Compute)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Compute => "compute",
            Self::ObjectStore => "object-store",
            Self::Table => "table",
            Self::RelationalDb => "relational-db",
        };
        write!(f, "{s}")
    }
}

impl Canvas {
    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns all compute nodes.
    #[must_use]
    pub fn compute_nodes(&self) -> Vec<&GraphNode> {
        self.nodes.iter().filter(|n| n.kind.is_executable()).collect()
    }

    /// Returns true when the canvas contains a relational database.
    #[must_use]
    pub fn has_relational_db(&self) -> bool {
        self.nodes.iter().any(|n| n.kind == ResourceKind::RelationalDb)
    }
}

impl GraphNode {
    /// Derives the deterministic logical id for this node.
    ///
    /// Pattern: kind prefix followed by the node id with every
    /// non-alphanumeric character stripped.
    #[must_use]
    pub fn logical_id(&self) -> String {
        let sanitized: String = self.id.chars().filter(char::is_ascii_alphanumeric).collect();
        format!("{}{sanitized}", self.kind.logical_prefix())
    }

    /// Fetches a string attribute.
    #[must_use]
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}
