//! Dependency map derivation.
//!
//! Edges are undirected at input; here they are interpreted as
//! compute-node → dependency. The map is recomputed on every
//! deploy/update and never persisted independently of its canvas.

use std::collections::{BTreeSet, HashMap};

use super::model::{Canvas, ResourceKind};

/// Dependencies of a single compute node, grouped by target kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeDependencies {
    /// Connected object-store nodes.
    pub object_store_targets: BTreeSet<String>,
    /// Connected table nodes.
    pub table_targets: BTreeSet<String>,
    /// Connected relational-database nodes.
    pub db_targets: BTreeSet<String>,
}

impl NodeDependencies {
    /// Returns true when no dependency of any kind exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.object_store_targets.is_empty()
            && self.table_targets.is_empty()
            && self.db_targets.is_empty()
    }
}

/// Derived compute-node → dependency map over a canvas.
///
/// Nodes are referenced by index into the canvas's flat node arena;
/// the public API speaks node ids.
#[derive(Debug, Default)]
pub struct DependencyMap {
    deps: HashMap<String, NodeDependencies>,
}

impl DependencyMap {
    /// Builds the dependency map for a canvas.
    ///
    /// Each edge touching exactly one compute node is attributed to that
    /// compute node; edges between two non-compute nodes (or two compute
    /// nodes) carry no access semantics and are ignored.
    #[must_use]
    pub fn build(canvas: &Canvas) -> Self {
        // id → arena index, computed once per build
        let index: HashMap<&str, usize> = canvas
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut deps: HashMap<String, NodeDependencies> = HashMap::new();

        for edge in &canvas.edges {
            let (Some(&a), Some(&b)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str()))
            else {
                continue;
            };

            let node_a = &canvas.nodes[a];
            let node_b = &canvas.nodes[b];

            let (compute, target) = match (node_a.kind.is_executable(), node_b.kind.is_executable())
            {
                (true, false) => (node_a, node_b),
                (false, true) => (node_b, node_a),
                _ => continue,
            };

            let entry = deps.entry(compute.id.clone()).or_default();
            match target.kind {
                ResourceKind::ObjectStore => {
                    entry.object_store_targets.insert(target.id.clone());
                }
                ResourceKind::Table => {
                    entry.table_targets.insert(target.id.clone());
                }
                ResourceKind::RelationalDb => {
                    entry.db_targets.insert(target.id.clone());
                }
                ResourceKind::Compute => {}
            }
        }

        Self { deps }
    }

    /// Dependencies of the given compute node, if any were derived.
    #[must_use]
    pub fn for_node(&self, node_id: &str) -> Option<&NodeDependencies> {
        self.deps.get(node_id)
    }

    /// Number of compute nodes with at least one dependency.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    /// Returns true when no compute node has dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{GraphEdge, GraphNode};
    use std::collections::BTreeMap;

    fn node(id: &str, kind: ResourceKind) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind,
            label: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    fn edge(from: &str, to: &str) -> GraphEdge {
        GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn test_direction_is_normalized() {
        // Same dependency expressed both ways round.
        let canvas = Canvas {
            nodes: vec![
                node("ec2", ResourceKind::Compute),
                node("s3", ResourceKind::ObjectStore),
                node("ddb", ResourceKind::Table),
            ],
            edges: vec![edge("ec2", "s3"), edge("ddb", "ec2")],
        };

        let map = DependencyMap::build(&canvas);
        let deps = map.for_node("ec2").expect("compute node has deps");
        assert!(deps.object_store_targets.contains("s3"));
        assert!(deps.table_targets.contains("ddb"));
    }

    #[test]
    fn test_non_compute_edges_ignored() {
        let canvas = Canvas {
            nodes: vec![
                node("s3", ResourceKind::ObjectStore),
                node("ddb", ResourceKind::Table),
            ],
            edges: vec![edge("s3", "ddb")],
        };

        let map = DependencyMap::build(&canvas);
        assert!(map.is_empty());
    }

    #[test]
    fn test_dangling_edges_skipped() {
        let canvas = Canvas {
            nodes: vec![node("ec2", ResourceKind::Compute)],
            edges: vec![edge("ec2", "ghost")],
        };

        let map = DependencyMap::build(&canvas);
        assert!(map.for_node("ec2").is_none());
    }

    #[test]
    fn test_duplicate_edges_deduplicated() {
        let canvas = Canvas {
            nodes: vec![
                node("ec2", ResourceKind::Compute),
                node("rds", ResourceKind::RelationalDb),
            ],
            edges: vec![edge("ec2", "rds"), edge("rds", "ec2")],
        };

        let map = DependencyMap::build(&canvas);
        let deps = map.for_node("ec2").expect("deps");
        assert_eq!(deps.db_targets.len(), 1);
    }
}
