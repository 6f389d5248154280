//! Foundry CLI entrypoint.
//!
//! This is the main entrypoint for the foundry command-line tool.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use foundry_deploy::changeset::ChangeSetCoordinator;
use foundry_deploy::cli::{Cli, Commands, OutputFormatter};
use foundry_deploy::cloud::{CloudClient, HttpCloudClient};
use foundry_deploy::config::Settings;
use foundry_deploy::deploy::{DeployRequest, Deployer};
use foundry_deploy::error::{GraphError, Result};
use foundry_deploy::graph::Canvas;
use foundry_deploy::hub::{BroadcastHub, UpdateMessage};
use foundry_deploy::state::{DeploymentRecord, LocalStateStore, StateStore};
use foundry_deploy::template::TemplateComposer;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    let settings = Arc::new(Settings::from_env());
    let client: Arc<dyn CloudClient> = Arc::new(HttpCloudClient::new(&settings)?);
    let store: Arc<dyn StateStore> = Arc::new(LocalStateStore::new()?);

    match cli.command {
        Commands::Deploy {
            file,
            deployment_id,
            region,
            allow_named_roles,
            watch,
        } => {
            cmd_deploy(
                &file,
                deployment_id,
                region,
                allow_named_roles,
                watch,
                client,
                store,
                settings,
                &formatter,
            )
            .await
        }
        Commands::Preview {
            deployment_id,
            file,
        } => cmd_preview(&deployment_id, &file, client, store, settings, &formatter).await,
        Commands::Execute {
            deployment_id,
            change_set_id,
            watch,
        } => {
            cmd_execute(
                &deployment_id,
                &change_set_id,
                watch,
                client,
                store,
                settings,
                &formatter,
            )
            .await
        }
        Commands::Cancel {
            deployment_id,
            change_set_id,
        } => cmd_cancel(&deployment_id, &change_set_id, client, store, settings).await,
        Commands::Watch { deployment_id } => {
            cmd_watch(&deployment_id, client, store, settings, &formatter).await
        }
        Commands::Status { deployment_id } => {
            cmd_status(&deployment_id, client, store, settings, &formatter).await
        }
        Commands::List => cmd_list(client, store, settings, &formatter).await,
        Commands::Destroy {
            deployment_id,
            keep_key_pairs,
            yes,
        } => cmd_destroy(&deployment_id, keep_key_pairs, yes, client, store, settings).await,
    }
}

/// Deploy a canvas file as a new deployment.
#[allow(clippy::too_many_arguments)]
async fn cmd_deploy(
    file: &Path,
    deployment_id: Option<String>,
    region: Option<String>,
    allow_named_roles: bool,
    watch: bool,
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let canvas = load_canvas(file)?;
    let deployer = Deployer::new(Arc::clone(&client), store, Arc::clone(&settings));

    let response = deployer
        .deploy(DeployRequest {
            canvas,
            region,
            deployment_id,
            consent_named_identity: allow_named_roles,
        })
        .await?;

    eprintln!("{}", formatter.format_deploy_response(&response));

    if watch {
        let hub = BroadcastHub::new(client, poll_interval(&settings));
        follow_updates(&hub, &response.stack_name, response.resource_count, formatter).await;
    }
    Ok(())
}

/// Preview the changes an edited canvas would apply.
async fn cmd_preview(
    deployment_id: &str,
    file: &Path,
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let canvas = load_canvas(file)?;
    let coordinator = ChangeSetCoordinator::new(client, store, settings);

    let change_set = coordinator.preview(deployment_id, &canvas).await?;
    eprintln!("{}", formatter.format_change_set(&change_set));
    Ok(())
}

/// Execute a previously previewed change set.
async fn cmd_execute(
    deployment_id: &str,
    change_set_id: &str,
    watch: bool,
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let coordinator =
        ChangeSetCoordinator::new(Arc::clone(&client), Arc::clone(&store), Arc::clone(&settings));

    let result = coordinator.execute(deployment_id, change_set_id).await?;
    eprintln!(
        "Change set {} submitted against {} ({} changes).",
        result.change_set_id, result.stack_name, result.applied_changes
    );

    if watch {
        let record = store
            .load(deployment_id)
            .await?
            .ok_or_else(|| foundry_deploy::error::FoundryError::internal("Deployment record vanished"))?;
        let total = resource_total(&settings, &record)?;

        let hub = BroadcastHub::new(client, poll_interval(&settings));
        follow_updates(&hub, &result.stack_name, total, formatter).await;
    }
    Ok(())
}

/// Cancel a previewed change set.
async fn cmd_cancel(
    deployment_id: &str,
    change_set_id: &str,
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
) -> Result<()> {
    let coordinator = ChangeSetCoordinator::new(client, store, settings);
    coordinator.cancel(deployment_id, change_set_id).await?;
    eprintln!("Change set {change_set_id} discarded.");
    Ok(())
}

/// Stream live resource updates for a deployment.
async fn cmd_watch(
    deployment_id: &str,
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let deployer = Deployer::new(Arc::clone(&client), store, Arc::clone(&settings));
    let view = deployer.status(deployment_id).await?;
    let total = resource_total(&settings, &view.record)?;

    let hub = BroadcastHub::new(client, poll_interval(&settings));
    follow_updates(&hub, &view.record.name, total, formatter).await;
    Ok(())
}

/// Show a deployment's current status.
async fn cmd_status(
    deployment_id: &str,
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let deployer = Deployer::new(client, store, settings);
    let view = deployer.status(deployment_id).await?;
    eprintln!("{}", formatter.format_status(&view));
    Ok(())
}

/// List known deployments.
async fn cmd_list(
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let deployer = Deployer::new(client, store, settings);
    let ids = deployer.list_deployments().await?;
    eprintln!("{}", formatter.format_deployments(&ids));
    Ok(())
}

/// Tear down a deployment.
async fn cmd_destroy(
    deployment_id: &str,
    keep_key_pairs: bool,
    auto_approve: bool,
    client: Arc<dyn CloudClient>,
    store: Arc<dyn StateStore>,
    settings: Arc<Settings>,
) -> Result<()> {
    // Confirm
    if !auto_approve {
        eprint!("This will destroy deployment '{deployment_id}' and its resources. Type 'destroy' to confirm: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "destroy" {
            eprintln!("Destruction cancelled.");
            return Ok(());
        }
    }

    let deployer = Deployer::new(client, store, settings);
    deployer
        .delete_deployment(deployment_id, !keep_key_pairs)
        .await?;

    eprintln!("Deployment {deployment_id} destroyed.");
    Ok(())
}

/// Reads and parses a canvas file.
fn load_canvas(path: &Path) -> Result<Canvas> {
    debug!("Loading canvas from: {}", path.display());
    let raw = std::fs::read_to_string(path)?;
    let canvas: Canvas = serde_json::from_str(&raw).map_err(|e| {
        GraphError::invalid(format!("Canvas file {} is not valid JSON: {e}", path.display()))
    })?;
    Ok(canvas)
}

/// Recomputes the progress denominator for the applied graph.
///
/// The declared resource count includes the synthesized role resources,
/// so it comes from re-composing the template rather than counting
/// graph nodes.
fn resource_total(settings: &Settings, record: &DeploymentRecord) -> Result<usize> {
    let key_names: BTreeMap<String, String> = record
        .key_pairs
        .iter()
        .map(|kp| (kp.target_node_id.clone(), kp.key_name.clone()))
        .collect();

    let composer = TemplateComposer::new(settings);
    let manifest = composer.compose(
        &record.deployment_id,
        &record.last_applied_graph,
        &key_names,
    )?;
    Ok(manifest.resource_count)
}

/// Prints live updates until the deployment settles or tracking stops.
async fn follow_updates(
    hub: &BroadcastHub,
    stack_name: &str,
    total_resources: usize,
    formatter: &OutputFormatter,
) {
    let mut subscription = hub.subscribe(stack_name, total_resources);

    while let Some(message) = subscription.recv().await {
        eprintln!("{}", formatter.format_update(&message));
        if matches!(
            message,
            UpdateMessage::Completed { .. } | UpdateMessage::Error { .. }
        ) {
            break;
        }
    }
}

/// Poll cadence for live tracking.
fn poll_interval(settings: &Settings) -> Duration {
    Duration::from_secs(settings.poll_interval_secs)
}
