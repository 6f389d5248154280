//! RoleSynthesizer: least-privilege access roles derived from graph edges.
//!
//! Access is never configured by the user. A compute node's role is
//! computed from the resources it is actually connected to, scoped to
//! exactly those resources' ARNs. Relational databases never contribute
//! to a role; they are handled through injected connection parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::Settings;
use crate::graph::{GraphNode, NodeDependencies};
use crate::naming::NamedResource;

/// Actions granted on connected object-store buckets.
const OBJECT_STORE_ACTIONS: &[&str] = &[
    "s3:GetObject",
    "s3:PutObject",
    "s3:DeleteObject",
    "s3:ListBucket",
];

/// Actions granted on connected tables.
const TABLE_ACTIONS: &[&str] = &[
    "dynamodb:GetItem",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DeleteItem",
    "dynamodb:Query",
    "dynamodb:Scan",
];

/// What kind of access a synthesized role grants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoleCapability {
    /// Object-store dependencies only.
    ObjectStoreOnly,
    /// Table dependencies only.
    TableOnly,
    /// Both object-store and table dependencies.
    Multi,
    /// No role-relevant dependencies.
    None,
}

/// One policy statement, scoped to a single service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyStatement {
    /// Granted actions.
    pub actions: Vec<String>,
    /// Exact resource ARNs the actions apply to. Never a service wildcard.
    pub resources: Vec<String>,
}

/// A role to be created as part of the deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleSpec {
    /// The compute node this role attaches to.
    pub target_node_id: String,
    /// Name for the role resource.
    pub role_name: String,
    /// Name for the instance profile wrapping the role.
    pub profile_name: String,
    /// Capability class, derived from which dependency sets are non-empty.
    pub capability: RoleCapability,
    /// All ARNs the role touches, across statements.
    pub resource_arns: BTreeSet<String>,
    /// One statement per service.
    pub statements: Vec<PolicyStatement>,
}

/// A pre-provisioned role referenced by name instead of created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleReference {
    /// Existing role name.
    pub role_name: String,
    /// Existing instance profile name.
    pub profile_name: String,
}

/// Role outcome for one compute node.
///
/// Template assembly consumes this with an exhaustive match; there is no
/// runtime type inspection anywhere downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleAssignment {
    /// The node runs without elevated access.
    None,
    /// A new role is created and owned by this deployment.
    Owned(RoleSpec),
    /// An existing role is attached by name (demo fast path).
    Referenced(RoleReference),
}

impl RoleAssignment {
    /// Returns true when applying this assignment creates a named role,
    /// which requires the named-identity capability flag at submission.
    #[must_use]
    pub const fn requires_named_identity_capability(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

/// Connection parameters to inject into a compute node's configuration
/// for one relational-database dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbConnectionInjection {
    /// The relational-db node being connected to.
    pub target_node_id: String,
    /// Environment-variable prefix: `DB_` for the first target, then
    /// `DB_2_`, `DB_3_`, ... in node-id order.
    pub env_prefix: String,
}

impl DbConnectionInjection {
    /// Variable name for a given connection field (HOST, PORT, NAME,
    /// USER, PASSWORD, ENGINE).
    #[must_use]
    pub fn var(&self, field: &str) -> String {
        format!("{}{field}", self.env_prefix)
    }
}

/// Full access plan for one compute node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeAccess {
    /// The compute node.
    pub node_id: String,
    /// Role outcome.
    pub assignment: RoleAssignment,
    /// Relational-db connection injections, in deterministic order.
    pub db_connections: Vec<DbConnectionInjection>,
}

/// Synthesizes per-node access from the dependency map.
#[derive(Debug)]
pub struct RoleSynthesizer<'a> {
    settings: &'a Settings,
}

impl<'a> RoleSynthesizer<'a> {
    /// Creates a synthesizer bound to the process settings.
    #[must_use]
    pub const fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Computes the access plan for one compute node.
    ///
    /// `resolve_name` maps a dependency node id to its named resource;
    /// ids the caller cannot resolve are skipped (validation has already
    /// rejected dangling edges, so this only drops nothing in practice).
    pub fn synthesize<F>(
        &self,
        node: &GraphNode,
        deps: Option<&NodeDependencies>,
        resolve_name: F,
        instance_name: &NamedResource,
    ) -> NodeAccess
    where
        F: Fn(&str) -> Option<NamedResource>,
    {
        let empty = NodeDependencies::default();
        let deps = deps.unwrap_or(&empty);

        let db_connections = Self::db_injections(&deps.db_targets);

        // Demo fast path: reference the pre-provisioned role to skip the
        // 30-90s propagation delay of freshly created identity grants.
        if let Some(demo) = &self.settings.demo {
            debug!(node_id = %node.id, role = %demo.role_name, "demo mode: referencing existing role");
            return NodeAccess {
                node_id: node.id.clone(),
                assignment: RoleAssignment::Referenced(RoleReference {
                    role_name: demo.role_name.clone(),
                    profile_name: demo.profile_name.clone(),
                }),
                db_connections,
            };
        }

        let mut bucket_arns: BTreeSet<String> = BTreeSet::new();
        for target in &deps.object_store_targets {
            if let Some(named) = resolve_name(target) {
                bucket_arns.insert(format!("arn:aws:s3:::{}", named.composed_name));
                bucket_arns.insert(format!("arn:aws:s3:::{}/*", named.composed_name));
            }
        }

        let mut table_arns: BTreeSet<String> = BTreeSet::new();
        for target in &deps.table_targets {
            if let Some(named) = resolve_name(target) {
                table_arns.insert(format!(
                    "arn:aws:dynamodb:{}:*:table/{}",
                    self.settings.region, named.composed_name
                ));
            }
        }

        let capability = match (!bucket_arns.is_empty(), !table_arns.is_empty()) {
            (true, true) => RoleCapability::Multi,
            (true, false) => RoleCapability::ObjectStoreOnly,
            (false, true) => RoleCapability::TableOnly,
            (false, false) => RoleCapability::None,
        };

        if capability == RoleCapability::None {
            return NodeAccess {
                node_id: node.id.clone(),
                assignment: RoleAssignment::None,
                db_connections,
            };
        }

        let mut statements = Vec::with_capacity(2);
        if !bucket_arns.is_empty() {
            statements.push(PolicyStatement {
                actions: OBJECT_STORE_ACTIONS.iter().map(ToString::to_string).collect(),
                resources: bucket_arns.iter().cloned().collect(),
            });
        }
        if !table_arns.is_empty() {
            statements.push(PolicyStatement {
                actions: TABLE_ACTIONS.iter().map(ToString::to_string).collect(),
                resources: table_arns.iter().cloned().collect(),
            });
        }

        let mut resource_arns = bucket_arns;
        resource_arns.extend(table_arns);

        debug!(
            node_id = %node.id,
            ?capability,
            arns = resource_arns.len(),
            "synthesized scoped role"
        );

        NodeAccess {
            node_id: node.id.clone(),
            assignment: RoleAssignment::Owned(RoleSpec {
                target_node_id: node.id.clone(),
                role_name: format!("{}-role", instance_name.composed_name),
                profile_name: format!("{}-profile", instance_name.composed_name),
                capability,
                resource_arns,
                statements,
            }),
            db_connections,
        }
    }

    /// Numbers relational targets: first gets `DB_`, then `DB_2_`, ...
    fn db_injections(db_targets: &BTreeSet<String>) -> Vec<DbConnectionInjection> {
        db_targets
            .iter()
            .enumerate()
            .map(|(i, target)| DbConnectionInjection {
                target_node_id: target.clone(),
                env_prefix: if i == 0 {
                    String::from("DB_")
                } else {
                    format!("DB_{}_", i + 1)
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoConfig;
    use crate::graph::ResourceKind;
    use crate::naming::NameForge;
    use std::collections::BTreeMap;

    fn compute_node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind: ResourceKind::Compute,
            label: String::from("web"),
            attributes: BTreeMap::new(),
        }
    }

    fn named(deployment: &str, node_id: &str, label: &str, kind: ResourceKind) -> NamedResource {
        NameForge::new()
            .compose(deployment, node_id, label, kind)
            .expect("composable")
    }

    fn resolver(deployment: &'static str) -> impl Fn(&str) -> Option<NamedResource> {
        move |id: &str| {
            let kind = if id.starts_with("s3") {
                ResourceKind::ObjectStore
            } else if id.starts_with("ddb") {
                ResourceKind::Table
            } else {
                ResourceKind::RelationalDb
            };
            Some(named(deployment, id, "store", kind))
        }
    }

    #[test]
    fn test_combined_role_for_mixed_dependencies() {
        let settings = Settings::default();
        let synth = RoleSynthesizer::new(&settings);
        let node = compute_node("ec2_node_1");
        let deps = NodeDependencies {
            object_store_targets: BTreeSet::from([String::from("s3_bucket_1")]),
            table_targets: BTreeSet::from([String::from("ddb_table_1")]),
            db_targets: BTreeSet::new(),
        };
        let instance = named("default", "ec2_node_1", "web", ResourceKind::Compute);

        let access = synth.synthesize(&node, Some(&deps), resolver("default"), &instance);

        let RoleAssignment::Owned(spec) = access.assignment else {
            panic!("expected an owned role");
        };
        assert_eq!(spec.capability, RoleCapability::Multi);
        // One statement per service, nothing broader.
        assert_eq!(spec.statements.len(), 2);
        assert!(spec.resource_arns.iter().any(|a| a.contains(":s3:::")));
        assert!(spec.resource_arns.iter().any(|a| a.contains(":dynamodb:")));
        assert!(!spec.resource_arns.iter().any(|a| a.ends_with(":*")));
    }

    #[test]
    fn test_no_dependencies_no_role() {
        let settings = Settings::default();
        let synth = RoleSynthesizer::new(&settings);
        let node = compute_node("ec2_node_1");
        let instance = named("default", "ec2_node_1", "web", ResourceKind::Compute);

        let access = synth.synthesize(&node, None, resolver("default"), &instance);

        assert_eq!(access.assignment, RoleAssignment::None);
        assert!(access.db_connections.is_empty());
    }

    #[test]
    fn test_db_only_injects_params_without_role() {
        let settings = Settings::default();
        let synth = RoleSynthesizer::new(&settings);
        let node = compute_node("ec2_node_1");
        let deps = NodeDependencies {
            object_store_targets: BTreeSet::new(),
            table_targets: BTreeSet::new(),
            db_targets: BTreeSet::from([String::from("rds_1"), String::from("rds_2")]),
        };
        let instance = named("default", "ec2_node_1", "web", ResourceKind::Compute);

        let access = synth.synthesize(&node, Some(&deps), resolver("default"), &instance);

        assert_eq!(access.assignment, RoleAssignment::None);
        assert_eq!(access.db_connections.len(), 2);
        assert_eq!(access.db_connections[0].var("HOST"), "DB_HOST");
        assert_eq!(access.db_connections[1].var("HOST"), "DB_2_HOST");
    }

    #[test]
    fn test_demo_mode_references_existing_role() {
        let settings = Settings {
            demo: Some(DemoConfig {
                role_name: String::from("foundry-demo-ec2-role"),
                profile_name: String::from("foundry-demo-ec2-profile"),
                image_id: None,
            }),
            ..Settings::default()
        };
        let synth = RoleSynthesizer::new(&settings);
        let node = compute_node("ec2_node_1");
        let deps = NodeDependencies {
            object_store_targets: BTreeSet::from([String::from("s3_bucket_1")]),
            table_targets: BTreeSet::new(),
            db_targets: BTreeSet::new(),
        };
        let instance = named("default", "ec2_node_1", "web", ResourceKind::Compute);

        let access = synth.synthesize(&node, Some(&deps), resolver("default"), &instance);

        assert!(!access.assignment.requires_named_identity_capability());
        let RoleAssignment::Referenced(reference) = access.assignment else {
            panic!("expected a referenced role");
        };
        assert_eq!(reference.role_name, "foundry-demo-ec2-role");
        assert_eq!(reference.profile_name, "foundry-demo-ec2-profile");
    }

    #[test]
    fn test_single_kind_dependency_scopes_to_exact_arns() {
        let settings = Settings::default();
        let synth = RoleSynthesizer::new(&settings);
        let node = compute_node("ec2_node_1");
        let deps = NodeDependencies {
            object_store_targets: BTreeSet::from([String::from("s3_bucket_1")]),
            table_targets: BTreeSet::new(),
            db_targets: BTreeSet::new(),
        };
        let instance = named("default", "ec2_node_1", "web", ResourceKind::Compute);

        let access = synth.synthesize(&node, Some(&deps), resolver("default"), &instance);

        let RoleAssignment::Owned(spec) = access.assignment else {
            panic!("expected an owned role");
        };
        assert_eq!(spec.capability, RoleCapability::ObjectStoreOnly);
        let bucket = named("default", "s3_bucket_1", "store", ResourceKind::ObjectStore);
        assert!(spec
            .resource_arns
            .contains(&format!("arn:aws:s3:::{}", bucket.composed_name)));
    }
}
