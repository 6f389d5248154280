//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying deployment
//! information to the user in text or JSON form.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::changeset::{ChangeAction, ChangeSet};
use crate::deploy::{DeployResponse, DeploymentView};
use crate::hub::UpdateMessage;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change-set row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Logical ID")]
    logical_id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Physical Name")]
    physical_name: String,
    #[tabled(rename = "Replacement")]
    replacement: String,
}

/// Resource row for status display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Logical ID")]
    logical_id: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a previewed change set.
    #[must_use]
    pub fn format_change_set(&self, change_set: &ChangeSet) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(change_set).unwrap_or_default(),
            OutputFormat::Text => Self::format_change_set_text(change_set),
        }
    }

    fn format_change_set_text(change_set: &ChangeSet) -> String {
        if !change_set.has_changes {
            return format!(
                "{} No changes - the deployment already matches the canvas.\n",
                "✓".green()
            );
        }

        let rows: Vec<ChangeRow> = change_set
            .changes
            .iter()
            .map(|c| ChangeRow {
                action: match c.action {
                    ChangeAction::Add => "Add".green().to_string(),
                    ChangeAction::Modify => "Modify".yellow().to_string(),
                    ChangeAction::Remove => "Remove".red().to_string(),
                },
                logical_id: c.logical_id.clone(),
                kind: c.resource_kind.to_string(),
                physical_name: c.physical_name.clone(),
                replacement: if c.requires_replacement {
                    "yes".red().to_string()
                } else {
                    "no".to_string()
                },
            })
            .collect();

        let mut output = String::new();
        let _ = writeln!(output, "Change set: {} ({})", change_set.name, change_set.id);
        let _ = writeln!(output, "{}", Table::new(rows));

        let replacements = change_set
            .changes
            .iter()
            .filter(|c| c.requires_replacement)
            .count();
        if replacements > 0 {
            let _ = writeln!(
                output,
                "{} {replacements} change(s) force destructive replacement; data on those resources will be lost.",
                "!".red().bold()
            );
        }
        let _ = writeln!(
            output,
            "Run `foundry execute` to apply or `foundry cancel` to discard."
        );
        output
    }

    /// Formats a deploy response, including the one-time key material.
    #[must_use]
    pub fn format_deploy_response(&self, response: &DeployResponse) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(response).unwrap_or_default(),
            OutputFormat::Text => Self::format_deploy_response_text(response),
        }
    }

    fn format_deploy_response_text(response: &DeployResponse) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{} Deployment {} submitted ({} resources, stack {}).",
            "✓".green(),
            response.deployment_id.bold(),
            response.resource_count,
            response.stack_name
        );

        for degraded in &response.degraded_names {
            let _ = writeln!(
                output,
                "{} Node {degraded} has an unstable name and will be replaced on the next deploy.",
                "!".yellow()
            );
        }

        for key_pair in &response.key_pairs {
            let _ = writeln!(
                output,
                "\nKey pair {} (fingerprint {}):",
                key_pair.record.key_name.bold(),
                key_pair.record.fingerprint
            );
            let _ = writeln!(
                output,
                "{}",
                "Save this private key now; it will not be shown again.".yellow()
            );
            let _ = writeln!(output, "{}", key_pair.secret_material);
        }
        output
    }

    /// Formats a deployment status view.
    #[must_use]
    pub fn format_status(&self, view: &DeploymentView) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "record": view.record,
                    "stack": view.stack,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_status_text(view),
        }
    }

    fn format_status_text(view: &DeploymentView) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Deployment: {}", view.record.deployment_id.bold());
        let _ = writeln!(output, "Stack:      {}", view.record.name);
        let _ = writeln!(output, "Region:     {}", view.record.region);
        let _ = writeln!(output, "Status:     {:?}", view.record.status);
        let _ = writeln!(
            output,
            "Nodes:      {}",
            view.record.last_applied_graph.nodes.len()
        );

        match &view.stack {
            Some(stack) => {
                let _ = writeln!(output, "Live:       {}", colored_status(&stack.status));
                if !stack.outputs.is_empty() {
                    let _ = writeln!(output, "\nOutputs:");
                    for out in &stack.outputs {
                        let _ = writeln!(output, "  {} = {}", out.key, out.value);
                    }
                }
            }
            None => {
                let _ = writeln!(output, "Live:       {}", "not visible yet".dimmed());
            }
        }
        output
    }

    /// Formats the list of known deployments.
    #[must_use]
    pub fn format_deployments(&self, ids: &[String]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(ids).unwrap_or_default(),
            OutputFormat::Text => {
                if ids.is_empty() {
                    String::from("No deployments.\n")
                } else {
                    let mut output = String::new();
                    for id in ids {
                        let _ = writeln!(output, "{id}");
                    }
                    output
                }
            }
        }
    }

    /// Formats one live update message as a single line.
    #[must_use]
    pub fn format_update(&self, message: &UpdateMessage) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(message).unwrap_or_default(),
            OutputFormat::Text => Self::format_update_text(message),
        }
    }

    fn format_update_text(message: &UpdateMessage) -> String {
        match message {
            UpdateMessage::InitialState { snapshot } => {
                let rows: Vec<ResourceRow> = snapshot
                    .resource_status
                    .iter()
                    .map(|(logical_id, state)| ResourceRow {
                        logical_id: logical_id.clone(),
                        resource_type: state.resource_type.clone(),
                        status: colored_status(&state.status),
                    })
                    .collect();
                format!(
                    "Current state ({}%, {}):\n{}",
                    snapshot.progress,
                    snapshot.duration,
                    Table::new(rows)
                )
            }
            UpdateMessage::ResourceUpdate {
                logical_id,
                status,
                physical_id,
                progress,
                ..
            } => {
                let physical = physical_id
                    .as_deref()
                    .map(|p| format!(" ({p})"))
                    .unwrap_or_default();
                format!(
                    "[{progress:>3}%] {logical_id}{physical}: {}",
                    colored_status(status)
                )
            }
            UpdateMessage::Completed {
                final_status,
                outputs,
                duration,
            } => {
                let mut line = format!(
                    "{} Deployment finished: {} in {duration}",
                    "✓".green(),
                    colored_status(final_status)
                );
                for out in outputs {
                    let _ = write!(line, "\n  {} = {}", out.key, out.value);
                }
                line
            }
            UpdateMessage::Error { message } => {
                format!("{} Tracking failed: {message}", "✗".red())
            }
        }
    }
}

/// Colors a status token by its outcome class.
fn colored_status(status: &str) -> String {
    if status.ends_with("_FAILED") || status.contains("ROLLBACK") {
        status.red().to_string()
    } else if status.ends_with("_COMPLETE") {
        status.green().to_string()
    } else {
        status.yellow().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{ChangeSetStatus, ResourceChange};
    use crate::graph::ResourceKind;

    fn sample_change_set() -> ChangeSet {
        ChangeSet {
            id: String::from("cs-1"),
            name: String::from("default-abc"),
            status: ChangeSetStatus::Ready,
            has_changes: true,
            changes: vec![ResourceChange {
                action: ChangeAction::Add,
                logical_id: String::from("Buckets3bucket1"),
                resource_kind: ResourceKind::ObjectStore,
                physical_name: String::from("default-s3buc-appstorage"),
                requires_replacement: false,
            }],
        }
    }

    #[test]
    fn test_change_set_text_lists_changes() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter.format_change_set(&sample_change_set());

        assert!(output.contains("Buckets3bucket1"));
        assert!(output.contains("default-s3buc-appstorage"));
    }

    #[test]
    fn test_change_set_json_round_trips() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_change_set(&sample_change_set());

        let back: ChangeSet = serde_json::from_str(&output).expect("valid json");
        assert_eq!(back.id, "cs-1");
        assert!(back.has_changes);
    }

    #[test]
    fn test_empty_deployment_list() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        assert_eq!(formatter.format_deployments(&[]), "No deployments.\n");
    }
}
