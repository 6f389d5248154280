//! Template assembly.
//!
//! Turns a validated canvas into the JSON template body the control
//! plane consumes: one logical resource per node, synthesized roles and
//! instance profiles, per-instance key pairs, and injected environment
//! for every dependency a compute node has.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::Settings;
use crate::error::Result;
use crate::graph::{Canvas, DependencyMap, GraphNode, ResourceKind};
use crate::naming::{NameForge, NamedResource};
use crate::roles::{NodeAccess, RoleAssignment, RoleSpec, RoleSynthesizer};

/// Fallback machine image when a compute node declares none.
const DEFAULT_IMAGE_ID: &str = "ami-0c02fb55956c7d316";

/// Fallback instance type.
const DEFAULT_INSTANCE_TYPE: &str = "t3.micro";

/// Everything the deployer needs to submit a deployment.
#[derive(Debug)]
pub struct TemplateManifest {
    /// Assembled template body.
    pub body: Value,
    /// Number of logical resources the template declares; the progress
    /// denominator for event tracking.
    pub resource_count: usize,
    /// Node id → derived name, for every node.
    pub names: BTreeMap<String, NamedResource>,
    /// Compute node id → access plan.
    pub access: BTreeMap<String, NodeAccess>,
    /// Node ids whose name token was time-seeded (stability lost).
    pub degraded_names: Vec<String>,
}

impl TemplateManifest {
    /// Returns true when the template creates named identity roles and
    /// submission must declare the elevated capability.
    #[must_use]
    pub fn requires_named_identity_capability(&self) -> bool {
        self.access
            .values()
            .any(|a| a.assignment.requires_named_identity_capability())
    }

    /// Capability flags to declare at submission.
    #[must_use]
    pub fn capabilities(&self) -> Vec<String> {
        if self.requires_named_identity_capability() {
            vec![crate::cloud::CAPABILITY_NAMED_IDENTITY.to_string()]
        } else {
            vec![]
        }
    }

    /// Logical ids of all declared resources, sorted.
    #[must_use]
    pub fn logical_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.body["Resources"]
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Assembles templates from canvases.
#[derive(Debug)]
pub struct TemplateComposer<'a> {
    settings: &'a Settings,
    forge: NameForge,
}

impl<'a> TemplateComposer<'a> {
    /// Creates a composer bound to the process settings.
    #[must_use]
    pub const fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            forge: NameForge::new(),
        }
    }

    /// Assembles the template for a canvas.
    ///
    /// `key_names` maps each compute node id to its created key-pair
    /// name; nodes without an entry get no key attached.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a node's name cannot be composed.
    pub fn compose(
        &self,
        deployment_id: &str,
        canvas: &Canvas,
        key_names: &BTreeMap<String, String>,
    ) -> Result<TemplateManifest> {
        let mut names: BTreeMap<String, NamedResource> = BTreeMap::new();
        let mut degraded_names = vec![];
        for node in &canvas.nodes {
            let named = self
                .forge
                .compose(deployment_id, &node.id, &node.label, node.kind)?;
            if named.degraded {
                degraded_names.push(node.id.clone());
            }
            names.insert(node.id.clone(), named);
        }

        let deps = DependencyMap::build(canvas);
        let synthesizer = RoleSynthesizer::new(self.settings);

        let mut access: BTreeMap<String, NodeAccess> = BTreeMap::new();
        for node in canvas.compute_nodes() {
            let node_access = synthesizer.synthesize(
                node,
                deps.for_node(&node.id),
                |id| names.get(id).cloned(),
                &names[&node.id],
            );
            access.insert(node.id.clone(), node_access);
        }

        let mut resources = Map::new();
        let mut outputs = Map::new();

        for node in &canvas.nodes {
            let logical = node.logical_id();
            let named = &names[&node.id];

            let resource = match node.kind {
                ResourceKind::ObjectStore => Self::bucket_resource(named),
                ResourceKind::Table => Self::table_resource(node, named),
                ResourceKind::RelationalDb => Self::database_resource(node, named),
                ResourceKind::Compute => self.instance_resource(
                    node,
                    named,
                    canvas,
                    &names,
                    &access[&node.id],
                    key_names.get(&node.id),
                    &mut resources,
                ),
            };

            resources.insert(logical.clone(), resource);
            outputs.insert(
                logical.clone(),
                json!({ "Value": { "Ref": logical } }),
            );
        }

        let resource_count = resources.len();
        debug!(
            deployment_id,
            resources = resource_count,
            "assembled template"
        );

        Ok(TemplateManifest {
            body: json!({
                "Resources": Value::Object(resources),
                "Outputs": Value::Object(outputs),
            }),
            resource_count,
            names,
            access,
            degraded_names,
        })
    }

    fn bucket_resource(named: &NamedResource) -> Value {
        json!({
            "Type": "AWS::S3::Bucket",
            "Properties": {
                "BucketName": named.composed_name,
            }
        })
    }

    fn table_resource(node: &GraphNode, named: &NamedResource) -> Value {
        let partition_key = node.attr_str("partitionKey").unwrap_or("id");
        json!({
            "Type": "AWS::DynamoDB::Table",
            "Properties": {
                "TableName": named.composed_name,
                "BillingMode": "PAY_PER_REQUEST",
                "AttributeDefinitions": [
                    { "AttributeName": partition_key, "AttributeType": "S" }
                ],
                "KeySchema": [
                    { "AttributeName": partition_key, "KeyType": "HASH" }
                ],
            }
        })
    }

    fn database_resource(node: &GraphNode, named: &NamedResource) -> Value {
        json!({
            "Type": "AWS::RDS::DBInstance",
            "Properties": {
                "DBInstanceIdentifier": named.composed_name,
                "Engine": node.attr_str("engine").unwrap_or("postgres"),
                "DBInstanceClass": node.attr_str("instanceClass").unwrap_or("db.t3.micro"),
                "AllocatedStorage": "20",
                "DBName": node.attr_str("dbName").unwrap_or("app"),
                "MasterUsername": node.attr_str("masterUsername").unwrap_or("admin"),
                "MasterUserPassword": node.attr_str("masterPassword").unwrap_or("changeme-foundry"),
            }
        })
    }

    /// Builds the compute resource, appending role/profile resources to
    /// `resources` when the node owns a new role.
    #[allow(clippy::too_many_arguments)]
    fn instance_resource(
        &self,
        node: &GraphNode,
        named: &NamedResource,
        canvas: &Canvas,
        names: &BTreeMap<String, NamedResource>,
        access: &NodeAccess,
        key_name: Option<&String>,
        resources: &mut Map<String, Value>,
    ) -> Value {
        let image_id = self
            .settings
            .demo
            .as_ref()
            .and_then(|d| d.image_id.as_deref())
            .or_else(|| node.attr_str("imageId"))
            .unwrap_or(DEFAULT_IMAGE_ID);

        let mut properties = Map::new();
        properties.insert(String::from("ImageId"), json!(image_id));
        properties.insert(
            String::from("InstanceType"),
            json!(node.attr_str("instanceType").unwrap_or(DEFAULT_INSTANCE_TYPE)),
        );
        properties.insert(
            String::from("Tags"),
            json!([{ "Key": "Name", "Value": named.composed_name }]),
        );
        if let Some(key_name) = key_name {
            properties.insert(String::from("KeyName"), json!(key_name));
        }

        // The role outcome is a closed set; each variant wires the
        // profile differently.
        match &access.assignment {
            RoleAssignment::None => {}
            RoleAssignment::Owned(spec) => {
                let profile_logical = Self::role_resources(node, spec, resources);
                properties.insert(
                    String::from("IamInstanceProfile"),
                    json!({ "Ref": profile_logical }),
                );
            }
            RoleAssignment::Referenced(reference) => {
                properties.insert(
                    String::from("IamInstanceProfile"),
                    json!(reference.profile_name),
                );
            }
        }

        let environment = Self::environment(node, canvas, names, access);
        if !environment.is_empty() {
            properties.insert(String::from("Environment"), Value::Object(environment));
        }

        json!({
            "Type": "AWS::EC2::Instance",
            "Properties": Value::Object(properties),
        })
    }

    /// Emits the role and instance-profile resources for an owned role
    /// and returns the profile's logical id.
    fn role_resources(
        node: &GraphNode,
        spec: &RoleSpec,
        resources: &mut Map<String, Value>,
    ) -> String {
        let base = node.logical_id();
        let role_logical = format!("{base}Role");
        let profile_logical = format!("{base}Profile");

        let statements: Vec<Value> = spec
            .statements
            .iter()
            .map(|s| {
                json!({
                    "Effect": "Allow",
                    "Action": s.actions,
                    "Resource": s.resources,
                })
            })
            .collect();

        resources.insert(
            role_logical.clone(),
            json!({
                "Type": "AWS::IAM::Role",
                "Properties": {
                    "RoleName": spec.role_name,
                    "AssumeRolePolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Principal": { "Service": "ec2.amazonaws.com" },
                            "Action": "sts:AssumeRole",
                        }],
                    },
                    "Policies": [{
                        "PolicyName": format!("{}-policy", spec.role_name),
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": statements,
                        },
                    }],
                }
            }),
        );

        resources.insert(
            profile_logical.clone(),
            json!({
                "Type": "AWS::IAM::InstanceProfile",
                "Properties": {
                    "InstanceProfileName": spec.profile_name,
                    "Roles": [{ "Ref": role_logical }],
                }
            }),
        );

        profile_logical
    }

    /// Injected environment for a compute node: bucket and table names,
    /// plus connection parameters per relational-db dependency.
    fn environment(
        node: &GraphNode,
        canvas: &Canvas,
        names: &BTreeMap<String, NamedResource>,
        access: &NodeAccess,
    ) -> Map<String, Value> {
        let deps = DependencyMap::build(canvas);
        let mut env = Map::new();
        let Some(node_deps) = deps.for_node(&node.id) else {
            return env;
        };

        for (i, target) in node_deps.object_store_targets.iter().enumerate() {
            if let Some(named) = names.get(target) {
                env.insert(numbered("S3_BUCKET", i), json!(named.composed_name));
            }
        }
        for (i, target) in node_deps.table_targets.iter().enumerate() {
            if let Some(named) = names.get(target) {
                env.insert(numbered("DYNAMODB_TABLE", i), json!(named.composed_name));
            }
        }

        for injection in &access.db_connections {
            let Some(db_node) = canvas.node(&injection.target_node_id) else {
                continue;
            };
            let db_logical = db_node.logical_id();
            env.insert(
                injection.var("HOST"),
                json!({ "Fn::GetAtt": [db_logical, "Endpoint.Address"] }),
            );
            env.insert(
                injection.var("PORT"),
                json!({ "Fn::GetAtt": [db_logical, "Endpoint.Port"] }),
            );
            env.insert(
                injection.var("NAME"),
                json!(db_node.attr_str("dbName").unwrap_or("app")),
            );
            env.insert(
                injection.var("USER"),
                json!(db_node.attr_str("masterUsername").unwrap_or("admin")),
            );
            env.insert(
                injection.var("PASSWORD"),
                json!(db_node.attr_str("masterPassword").unwrap_or("changeme-foundry")),
            );
            env.insert(
                injection.var("ENGINE"),
                json!(db_node.attr_str("engine").unwrap_or("postgres")),
            );
        }

        env
    }
}

/// `STEM_NAME` for the first entry, `STEM_2`, `STEM_3`, ... for the rest.
fn numbered(stem: &str, index: usize) -> String {
    if index == 0 {
        format!("{stem}_NAME")
    } else {
        format!("{stem}_{}", index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoConfig;
    use crate::graph::GraphEdge;

    fn node(id: &str, kind: ResourceKind, label: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind,
            label: label.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    fn edge(from: &str, to: &str) -> GraphEdge {
        GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn mixed_canvas() -> Canvas {
        Canvas {
            nodes: vec![
                node("ec2_node_1", ResourceKind::Compute, "Web Server"),
                node("s3_bucket_1", ResourceKind::ObjectStore, "App Storage"),
                node("ddb_table_1", ResourceKind::Table, "Sessions"),
            ],
            edges: vec![edge("ec2_node_1", "s3_bucket_1"), edge("ec2_node_1", "ddb_table_1")],
        }
    }

    #[test]
    fn test_bucket_gets_composed_name() {
        let settings = Settings::default();
        let composer = TemplateComposer::new(&settings);

        let manifest = composer
            .compose("default", &mixed_canvas(), &BTreeMap::new())
            .expect("compose");

        let bucket = &manifest.body["Resources"]["Buckets3bucket1"];
        assert_eq!(bucket["Type"], "AWS::S3::Bucket");
        assert_eq!(
            bucket["Properties"]["BucketName"],
            "default-s3buc-appstorage"
        );
    }

    #[test]
    fn test_owned_role_emits_role_and_profile() {
        let settings = Settings::default();
        let composer = TemplateComposer::new(&settings);

        let manifest = composer
            .compose("default", &mixed_canvas(), &BTreeMap::new())
            .expect("compose");

        assert!(manifest.requires_named_identity_capability());
        assert_eq!(
            manifest.capabilities(),
            vec![String::from("CAPABILITY_NAMED_IAM")]
        );

        let resources = manifest.body["Resources"].as_object().expect("resources");
        assert!(resources.contains_key("Computeec2node1Role"));
        assert!(resources.contains_key("Computeec2node1Profile"));
        assert_eq!(
            resources["Computeec2node1"]["Properties"]["IamInstanceProfile"],
            json!({ "Ref": "Computeec2node1Profile" })
        );
        // 3 nodes + role + profile.
        assert_eq!(manifest.resource_count, 5);
    }

    #[test]
    fn test_demo_mode_references_profile_and_substitutes_image() {
        let settings = Settings {
            demo: Some(DemoConfig {
                role_name: String::from("foundry-demo-ec2-role"),
                profile_name: String::from("foundry-demo-ec2-profile"),
                image_id: Some(String::from("ami-demo123")),
            }),
            ..Settings::default()
        };
        let composer = TemplateComposer::new(&settings);

        let manifest = composer
            .compose("default", &mixed_canvas(), &BTreeMap::new())
            .expect("compose");

        assert!(!manifest.requires_named_identity_capability());
        let resources = manifest.body["Resources"].as_object().expect("resources");
        assert!(!resources.contains_key("Computeec2node1Role"));
        let props = &resources["Computeec2node1"]["Properties"];
        assert_eq!(props["IamInstanceProfile"], "foundry-demo-ec2-profile");
        assert_eq!(props["ImageId"], "ami-demo123");
    }

    #[test]
    fn test_environment_injection() {
        let settings = Settings::default();
        let composer = TemplateComposer::new(&settings);

        let mut canvas = mixed_canvas();
        canvas
            .nodes
            .push(node("rds_db_1", ResourceKind::RelationalDb, "Main DB"));
        canvas
            .nodes
            .push(node("rds_db_2", ResourceKind::RelationalDb, "Replica"));
        canvas.edges.push(edge("ec2_node_1", "rds_db_1"));
        canvas.edges.push(edge("ec2_node_1", "rds_db_2"));

        let manifest = composer
            .compose("default", &canvas, &BTreeMap::new())
            .expect("compose");

        let env = &manifest.body["Resources"]["Computeec2node1"]["Properties"]["Environment"];
        assert_eq!(env["S3_BUCKET_NAME"], "default-s3buc-appstorage");
        assert!(env.get("DYNAMODB_TABLE_NAME").is_some());
        // First db gets the bare prefix, the second is numbered.
        assert!(env.get("DB_HOST").is_some());
        assert_eq!(env["DB_ENGINE"], "postgres");
        assert!(env.get("DB_2_HOST").is_some());
        assert!(env.get("DB_3_HOST").is_none());
    }

    #[test]
    fn test_second_storage_target_numbers_the_stem() {
        let settings = Settings::default();
        let composer = TemplateComposer::new(&settings);

        let mut canvas = mixed_canvas();
        canvas
            .nodes
            .push(node("s3_bucket_2", ResourceKind::ObjectStore, "Backups"));
        canvas
            .nodes
            .push(node("ddb_table_2", ResourceKind::Table, "Audit"));
        canvas.edges.push(edge("ec2_node_1", "s3_bucket_2"));
        canvas.edges.push(edge("ec2_node_1", "ddb_table_2"));

        let manifest = composer
            .compose("default", &canvas, &BTreeMap::new())
            .expect("compose");

        let env = &manifest.body["Resources"]["Computeec2node1"]["Properties"]["Environment"];
        assert_eq!(env["S3_BUCKET_NAME"], "default-s3buc-appstorage");
        assert_eq!(env["S3_BUCKET_2"], "default-s3buc-backups");
        assert!(env.get("S3_BUCKET_NAME_2").is_none());
        assert!(env.get("DYNAMODB_TABLE_NAME").is_some());
        assert!(env.get("DYNAMODB_TABLE_2").is_some());
    }

    #[test]
    fn test_key_name_attached_when_provided() {
        let settings = Settings::default();
        let composer = TemplateComposer::new(&settings);
        let key_names = BTreeMap::from([(
            String::from("ec2_node_1"),
            String::from("default-ec2-no-Web-Server-key"),
        )]);

        let manifest = composer
            .compose("default", &mixed_canvas(), &key_names)
            .expect("compose");

        assert_eq!(
            manifest.body["Resources"]["Computeec2node1"]["Properties"]["KeyName"],
            "default-ec2-no-Web-Server-key"
        );
    }
}
