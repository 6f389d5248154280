//! Structural canvas validation.
//!
//! Validation runs before any cloud resource is touched; a failure here
//! aborts the deploy or update outright.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{FoundryError, GraphError, Result};

use super::model::Canvas;

/// Validator for canvas graphs.
#[derive(Debug, Default)]
pub struct GraphValidator;

impl GraphValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a canvas in isolation.
    ///
    /// Checks: non-empty, unique node ids, no edge endpoint missing from
    /// the node set, no self-edges.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] describing the first structural problem.
    pub fn validate(&self, canvas: &Canvas) -> Result<()> {
        if canvas.nodes.is_empty() {
            return Err(GraphError::invalid("canvas contains no nodes").into());
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(canvas.nodes.len());
        for node in &canvas.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(FoundryError::Graph(GraphError::DuplicateNodeId {
                    node_id: node.id.clone(),
                }));
            }
        }

        for edge in &canvas.edges {
            if edge.from == edge.to {
                return Err(GraphError::invalid(format!(
                    "self-edge on node {}",
                    edge.from
                ))
                .into());
            }
            for endpoint in [&edge.from, &edge.to] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(FoundryError::Graph(GraphError::DanglingEdge {
                        node_id: endpoint.clone(),
                    }));
                }
            }
        }

        debug!(
            nodes = canvas.nodes.len(),
            edges = canvas.edges.len(),
            "canvas validated"
        );
        Ok(())
    }

    /// Validates an edited canvas against the deployment's applied graph.
    ///
    /// A node id reused with a different kind would silently rename the
    /// underlying resource, so it is rejected instead.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::KindChanged`] for the first reused id whose
    /// kind differs, or any error from [`Self::validate`].
    pub fn validate_update(&self, edited: &Canvas, applied: &Canvas) -> Result<()> {
        self.validate(edited)?;

        let applied_kinds: HashMap<&str, _> = applied
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.kind))
            .collect();

        for node in &edited.nodes {
            if let Some(&previous) = applied_kinds.get(node.id.as_str()) {
                if previous != node.kind {
                    return Err(FoundryError::Graph(GraphError::KindChanged {
                        node_id: node.id.clone(),
                        previous: previous.to_string(),
                        current: node.kind.to_string(),
                    }));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{GraphEdge, GraphNode, ResourceKind};
    use std::collections::BTreeMap;

    fn node(id: &str, kind: ResourceKind) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind,
            label: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_empty_canvas_rejected() {
        let validator = GraphValidator::new();
        assert!(validator.validate(&Canvas::default()).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let validator = GraphValidator::new();
        let canvas = Canvas {
            nodes: vec![
                node("a", ResourceKind::Compute),
                node("a", ResourceKind::Table),
            ],
            edges: vec![],
        };

        let err = validator.validate(&canvas).unwrap_err();
        assert!(matches!(
            err,
            FoundryError::Graph(GraphError::DuplicateNodeId { .. })
        ));
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let validator = GraphValidator::new();
        let canvas = Canvas {
            nodes: vec![node("a", ResourceKind::Compute)],
            edges: vec![GraphEdge {
                from: String::from("a"),
                to: String::from("nope"),
            }],
        };

        let err = validator.validate(&canvas).unwrap_err();
        assert!(matches!(
            err,
            FoundryError::Graph(GraphError::DanglingEdge { .. })
        ));
    }

    #[test]
    fn test_kind_change_rejected() {
        let validator = GraphValidator::new();
        let applied = Canvas {
            nodes: vec![node("n1", ResourceKind::ObjectStore)],
            edges: vec![],
        };
        let edited = Canvas {
            nodes: vec![node("n1", ResourceKind::Table)],
            edges: vec![],
        };

        let err = validator.validate_update(&edited, &applied).unwrap_err();
        assert!(matches!(
            err,
            FoundryError::Graph(GraphError::KindChanged { .. })
        ));
    }

    #[test]
    fn test_same_kind_update_accepted() {
        let validator = GraphValidator::new();
        let applied = Canvas {
            nodes: vec![node("n1", ResourceKind::ObjectStore)],
            edges: vec![],
        };
        let mut edited = applied.clone();
        edited.nodes.push(node("n2", ResourceKind::Compute));

        assert!(validator.validate_update(&edited, &applied).is_ok());
    }
}
