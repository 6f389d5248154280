//! Canvas graph model, dependency derivation, validation, and hashing.
//!
//! The canvas is rebuilt wholesale on every deploy/update and never
//! mutated in place, so nodes and edges live in flat indexed arenas
//! rather than pointer-linked structures.

mod dependency;
mod hash;
mod model;
mod validate;

pub use dependency::{DependencyMap, NodeDependencies};
pub use hash::GraphHasher;
pub use model::{Canvas, GraphEdge, GraphNode, ResourceKind};
pub use validate::GraphValidator;
