//! Change-set computation and lifecycle.

pub mod coordinator;
pub mod diff;

pub use coordinator::{ChangeSet, ChangeSetCoordinator, ChangeSetStatus, ExecutionResult};
pub use diff::{ChangeAction, DiffEngine, ResourceChange};
