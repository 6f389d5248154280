//! Canonical canvas hashing for change detection.
//!
//! Change-set staleness is detected by comparing the hash of the
//! deployment's applied graph at preview time against the hash at
//! execute time, so the hash must be deterministic for equal canvases
//! regardless of node or edge ordering.

use sha2::{Digest, Sha256};

use super::model::Canvas;

/// Hasher for computing canonical canvas hashes.
#[derive(Debug, Default)]
pub struct GraphHasher;

impl GraphHasher {
    /// Creates a new graph hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a canonical hash of the canvas.
    ///
    /// Nodes are hashed sorted by id and edges sorted by their normalized
    /// endpoint pair; attribute maps are `BTreeMap`s so their order is
    /// already deterministic.
    #[must_use]
    pub fn hash_canvas(&self, canvas: &Canvas) -> String {
        let mut hasher = Sha256::new();

        let mut nodes: Vec<_> = canvas.nodes.iter().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        for node in nodes {
            hasher.update(node.id.as_bytes());
            hasher.update(node.kind.to_string().as_bytes());
            hasher.update(node.label.as_bytes());
            for (key, value) in &node.attributes {
                hasher.update(key.as_bytes());
                hasher.update(value.to_string().as_bytes());
            }
        }

        let mut edges: Vec<(&str, &str)> = canvas
            .edges
            .iter()
            .map(|e| {
                if e.from <= e.to {
                    (e.from.as_str(), e.to.as_str())
                } else {
                    (e.to.as_str(), e.from.as_str())
                }
            })
            .collect();
        edges.sort_unstable();
        edges.dedup();

        for (from, to) in edges {
            hasher.update(from.as_bytes());
            hasher.update(to.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{GraphEdge, GraphNode, ResourceKind};
    use std::collections::BTreeMap;

    fn node(id: &str, kind: ResourceKind, label: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind,
            label: label.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_hash_independent_of_order() {
        let a = Canvas {
            nodes: vec![
                node("x", ResourceKind::Compute, "web"),
                node("y", ResourceKind::Table, "data"),
            ],
            edges: vec![GraphEdge {
                from: String::from("x"),
                to: String::from("y"),
            }],
        };
        let b = Canvas {
            nodes: vec![
                node("y", ResourceKind::Table, "data"),
                node("x", ResourceKind::Compute, "web"),
            ],
            edges: vec![GraphEdge {
                from: String::from("y"),
                to: String::from("x"),
            }],
        };

        let hasher = GraphHasher::new();
        assert_eq!(hasher.hash_canvas(&a), hasher.hash_canvas(&b));
    }

    #[test]
    fn test_attribute_change_changes_hash() {
        let hasher = GraphHasher::new();
        let mut a = Canvas {
            nodes: vec![node("x", ResourceKind::Compute, "web")],
            edges: vec![],
        };
        let h1 = hasher.hash_canvas(&a);

        a.nodes[0]
            .attributes
            .insert(String::from("instanceType"), "t3.small".into());
        let h2 = hasher.hash_canvas(&a);

        assert_ne!(h1, h2);
    }

    #[test]
    fn test_short_hash() {
        let hasher = GraphHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
    }
}
