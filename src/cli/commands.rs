//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Foundry - canvas-to-cloud deployment manager.
#[derive(Parser, Debug)]
#[command(name = "foundry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// JSON for machine consumption.
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a canvas file as a new deployment.
    Deploy {
        /// Path to the canvas JSON file.
        file: PathBuf,

        /// Deployment id (generated when omitted).
        #[arg(long)]
        deployment_id: Option<String>,

        /// Target region (defaults to the configured region).
        #[arg(long)]
        region: Option<String>,

        /// Consent to creating named identity roles.
        #[arg(long)]
        allow_named_roles: bool,

        /// Follow live progress after submission.
        #[arg(short, long)]
        watch: bool,
    },

    /// Preview the changes an edited canvas would apply.
    Preview {
        /// Deployment to diff against.
        deployment_id: String,

        /// Path to the edited canvas JSON file.
        file: PathBuf,
    },

    /// Execute a previously previewed change set.
    Execute {
        /// Target deployment.
        deployment_id: String,

        /// Change set to execute.
        change_set_id: String,

        /// Follow live progress after submission.
        #[arg(short, long)]
        watch: bool,
    },

    /// Cancel a previewed change set without executing it.
    Cancel {
        /// Target deployment.
        deployment_id: String,

        /// Change set to cancel.
        change_set_id: String,
    },

    /// Stream live resource updates for a deployment.
    Watch {
        /// Deployment to watch.
        deployment_id: String,
    },

    /// Show a deployment's current status.
    Status {
        /// Deployment to inspect.
        deployment_id: String,
    },

    /// List known deployments.
    List,

    /// Tear down a deployment.
    Destroy {
        /// Deployment to destroy.
        deployment_id: String,

        /// Keep the deployment's key pairs.
        #[arg(long)]
        keep_key_pairs: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}
