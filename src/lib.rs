// ============================================================================
// Linting - keep dangerous or non-idiomatic practices out
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden
#![warn(missing_docs)]                // Public items should be documented
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Foundry Deploy
//!
//! A canvas-to-cloud deployment core: takes a drawn resource graph and
//! turns it into provisioned infrastructure with stable names,
//! least-privilege roles, previewable updates, and live progress.
//!
//! ## Overview
//!
//! A deployment starts from a **canvas**: nodes (compute, object store,
//! table, relational database) and the edges between them. Foundry:
//!
//! - Derives stable, provider-legal physical names for every node
//! - Synthesizes least-privilege access roles from the graph's edges
//! - Composes a declarative stack template and submits it
//! - Previews edits as change sets before applying them
//! - Tracks provisioning events and fans them out to live observers
//! - Manages ephemeral key pairs for compute access
//!
//! ## Modules
//!
//! - [`graph`]: Canvas model, validation, and content hashing
//! - [`naming`]: Deterministic physical-name derivation
//! - [`roles`]: Role synthesis from graph edges
//! - [`template`]: Stack template composition
//! - [`cloud`]: Control-plane API client
//! - [`changeset`]: Diff computation and change-set lifecycle
//! - [`tracker`]: Event polling and progress derivation
//! - [`hub`]: Fan-out of live updates to observers
//! - [`keypair`]: Ephemeral credential lifecycle
//! - [`state`]: Deployment records and locking
//! - [`deploy`]: Top-level deploy/teardown orchestration
//! - [`cli`]: Command-line interface

// ============================================================================
// Modules
// ============================================================================

pub mod changeset;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod hub;
pub mod keypair;
pub mod naming;
pub mod roles;
pub mod state;
pub mod template;
pub mod tracker;

// ============================================================================
// Re-exports
// ============================================================================

pub use changeset::{ChangeAction, ChangeSet, ChangeSetCoordinator, DiffEngine, ResourceChange};
pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{CloudClient, HttpCloudClient};
pub use config::Settings;
pub use deploy::{DeployRequest, DeployResponse, Deployer};
pub use error::{FoundryError, Result};
pub use graph::{Canvas, GraphHasher, GraphValidator, ResourceKind};
pub use hub::{BroadcastHub, Subscription, UpdateMessage};
pub use keypair::KeyPairLifecycle;
pub use naming::{NameForge, NamedResource};
pub use roles::{NodeAccess, RoleAssignment, RoleSynthesizer};
pub use state::{DeploymentRecord, LocalStateStore, StateStore};
pub use template::{TemplateComposer, TemplateManifest};
pub use tracker::{EventTracker, TrackerSnapshot};
