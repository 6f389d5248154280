//! NameForge: stable, sanitized, service-compliant resource names.
//!
//! Every physical name follows `{deploymentId}-{token6}-{label}`, each
//! segment independently sanitized for the target resource kind. For a
//! fixed `(deploymentId, nodeId, label)` triple the composed name is pure
//! and stable across any number of recomputations; that stability is what
//! makes re-deploying an unchanged graph non-destructive.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FoundryError, GraphError, Result};
use crate::graph::ResourceKind;

/// Length of the token taken from the front of the node id.
pub const TOKEN_LEN: usize = 6;

/// How characters outside the allowed alphabet are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SanitizeMode {
    /// Disallowed characters are dropped (object-store style).
    Remove,
    /// Disallowed characters become hyphens, then runs are collapsed
    /// and leading/trailing hyphens trimmed (identifier style).
    Hyphenate,
}

/// Per-kind naming rules.
#[derive(Debug, Clone, Copy)]
struct NamingRules {
    mode: SanitizeMode,
    lowercase: bool,
    max_len: usize,
}

const fn rules_for(kind: ResourceKind) -> NamingRules {
    match kind {
        // Bucket names: lowercase, no underscores, 63 chars.
        ResourceKind::ObjectStore => NamingRules {
            mode: SanitizeMode::Remove,
            lowercase: true,
            max_len: 63,
        },
        // Instance/key-pair identifiers: generous length, case kept.
        ResourceKind::Compute => NamingRules {
            mode: SanitizeMode::Hyphenate,
            lowercase: false,
            max_len: 255,
        },
        ResourceKind::Table => NamingRules {
            mode: SanitizeMode::Hyphenate,
            lowercase: false,
            max_len: 255,
        },
        // DB identifiers: lowercase, 63 chars.
        ResourceKind::RelationalDb => NamingRules {
            mode: SanitizeMode::Hyphenate,
            lowercase: true,
            max_len: 63,
        },
    }
}

/// A fully derived resource name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedResource {
    /// Owning deployment.
    pub deployment_id: String,
    /// First [`TOKEN_LEN`] characters of the node id, unsanitized.
    pub raw_token: String,
    /// Sanitized token segment.
    pub sanitized_token: String,
    /// Sanitized label segment.
    pub sanitized_label: String,
    /// The composed physical name.
    pub composed_name: String,
    /// True when the node id was too short to yield a stable token and a
    /// time-derived seed was used instead. Degraded names lose the
    /// stability guarantee; callers should surface this.
    pub degraded: bool,
}

/// Derives stable resource names from deployment id, node id, and label.
#[derive(Debug, Default)]
pub struct NameForge;

impl NameForge {
    /// Creates a new name forge.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Sanitizes a single segment for the given resource kind.
    ///
    /// Pure and idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
    #[must_use]
    pub fn sanitize(&self, input: &str, kind: ResourceKind) -> String {
        let rules = rules_for(kind);

        let lowered;
        let input = if rules.lowercase {
            lowered = input.to_lowercase();
            lowered.as_str()
        } else {
            input
        };

        let mut out = String::with_capacity(input.len());
        for ch in input.chars() {
            if ch.is_ascii_alphanumeric() {
                out.push(ch);
            } else if ch == '-' || rules.mode == SanitizeMode::Hyphenate {
                // Collapse hyphen runs as we go.
                if !out.ends_with('-') && !out.is_empty() {
                    out.push('-');
                }
            }
            // Remove mode drops everything else.
        }

        out.trim_matches('-').to_string()
    }

    /// Composes the physical name for a node.
    ///
    /// `{deploymentId}-{token6}-{label}`, truncated to the kind's maximum
    /// length by shortening the label suffix first. Falls back to a
    /// time-derived degraded token when the node id is shorter than
    /// [`TOKEN_LEN`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EmptyToken`] when the deployment id or the
    /// node-id token sanitizes away entirely; such a name cannot be
    /// composed and the deploy must abort before touching any resource.
    pub fn compose(
        &self,
        deployment_id: &str,
        node_id: &str,
        label: &str,
        kind: ResourceKind,
    ) -> Result<NamedResource> {
        let (raw_token, degraded) = if node_id.chars().count() >= TOKEN_LEN {
            (node_id.chars().take(TOKEN_LEN).collect::<String>(), false)
        } else {
            let seed = degraded_token();
            warn!(
                node_id,
                seed, "node id too short for a stable token; name is degraded"
            );
            (seed, true)
        };

        let sanitized_deployment = self.sanitize(deployment_id, kind);
        if sanitized_deployment.is_empty() {
            return Err(FoundryError::Graph(GraphError::EmptyToken {
                node_id: node_id.to_string(),
                input: deployment_id.to_string(),
            }));
        }
        let sanitized_token = self.sanitize(&raw_token, kind);
        if sanitized_token.is_empty() {
            return Err(FoundryError::Graph(GraphError::EmptyToken {
                node_id: node_id.to_string(),
                input: raw_token,
            }));
        }
        // A label that sanitizes away entirely falls back the same as a
        // missing one; the composed name must never end in a hyphen.
        let mut sanitized_label = self.sanitize(label, kind);
        if sanitized_label.is_empty() {
            sanitized_label = kind.logical_prefix().to_lowercase();
        }

        let rules = rules_for(kind);
        let mut composed = format!("{sanitized_deployment}-{sanitized_token}-{sanitized_label}");

        if composed.chars().count() > rules.max_len {
            // Keep deployment id and token intact; the label absorbs the cut.
            let prefix = format!("{sanitized_deployment}-{sanitized_token}-");
            let budget = rules.max_len.saturating_sub(prefix.chars().count());
            let truncated_label: String = sanitized_label.chars().take(budget).collect();
            composed = format!("{prefix}{truncated_label}");
            if composed.chars().count() > rules.max_len {
                composed = composed.chars().take(rules.max_len).collect();
            }
            composed = composed.trim_end_matches('-').to_string();
        }

        Ok(NamedResource {
            deployment_id: deployment_id.to_string(),
            raw_token,
            sanitized_token,
            sanitized_label,
            composed_name: composed,
            degraded,
        })
    }
}

/// Low-entropy fallback seed: current time truncated to six digits.
fn degraded_token() -> String {
    let micros = chrono::Utc::now().timestamp_micros().unsigned_abs();
    format!("{:06}", micros % 1_000_000)
}
