//! EventTracker: per-deployment control-plane polling with dedup.
//!
//! One tracker exists per deployment and is mutated only by its own poll
//! loop. Everything handed outward is an immutable [`TrackerSnapshot`],
//! so fan-out needs no locking against the writer.

pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cloud::{CloudClient, StackEvent};
use crate::error::{FoundryError, Result, TrackerError};

/// Provider type string for the deployment-level pseudo-resource.
const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// Last observed state of one logical resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceState {
    /// Provider resource type string.
    pub resource_type: String,
    /// Latest status token.
    pub status: String,
    /// Physical id, once the provider assigned one.
    pub physical_id: Option<String>,
}

/// Aggregate resource counts for a snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceCounts {
    /// Resources the template declares.
    pub total: usize,
    /// Resources settled successfully for the in-flight operation.
    pub completed: usize,
    /// Resources settled in failure.
    pub failed: usize,
    /// Resources observed but not yet settled.
    pub in_progress: usize,
}

/// Immutable view of a tracker's derived state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Stack being tracked.
    pub stack_name: String,
    /// Deployment-level status, once observed.
    pub deployment_status: Option<String>,
    /// Per-logical-id resource state.
    pub resource_status: BTreeMap<String, ResourceState>,
    /// Settled resources as a percentage of the declared total.
    pub progress: u8,
    /// Aggregate counts behind `progress`.
    pub counts: ResourceCounts,
    /// Elapsed tracking time, formatted (`"4m 15s"`).
    pub duration: String,
}

/// Polls the control plane for one deployment's events.
pub struct EventTracker {
    client: Arc<dyn CloudClient>,
    stack_name: String,
    total_resources: usize,
    seen_event_ids: HashSet<String>,
    resource_status: BTreeMap<String, ResourceState>,
    deployment_status: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl EventTracker {
    /// Creates a tracker for the given stack.
    ///
    /// `total_resources` is the number of logical resources the submitted
    /// template declares; it is the progress denominator.
    #[must_use]
    pub fn new(client: Arc<dyn CloudClient>, stack_name: String, total_resources: usize) -> Self {
        Self {
            client,
            stack_name,
            total_resources,
            seen_event_ids: HashSet::new(),
            resource_status: BTreeMap::new(),
            deployment_status: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Fetches the current event list and returns only events not seen
    /// before, reordered oldest-first.
    ///
    /// A transient "stack not found" (expected right after submission) is
    /// absorbed as zero new events.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::PollFailed`] for any other control-plane
    /// failure.
    pub async fn poll(&mut self) -> Result<Vec<StackEvent>> {
        let all_events = match self.client.describe_stack_events(&self.stack_name).await {
            Ok(events) => events,
            Err(e) if e.is_transient_not_found() => {
                trace!(stack = %self.stack_name, "stack not visible yet; zero new events");
                return Ok(vec![]);
            }
            Err(e) => {
                return Err(FoundryError::Tracker(TrackerError::PollFailed {
                    stack_name: self.stack_name.clone(),
                    message: e.to_string(),
                }));
            }
        };

        // The API returns newest-first; unseen events are collected in
        // that order then reversed so observers see causal order.
        let mut fresh: Vec<StackEvent> = all_events
            .into_iter()
            .filter(|e| !self.seen_event_ids.contains(&e.event_id))
            .collect();
        fresh.reverse();

        for event in &fresh {
            self.seen_event_ids.insert(event.event_id.clone());
            self.apply(event);
        }

        if !fresh.is_empty() {
            debug!(
                stack = %self.stack_name,
                new_events = fresh.len(),
                status = self.deployment_status.as_deref().unwrap_or("-"),
                "poll applied new events"
            );
        }

        Ok(fresh)
    }

    /// Applies one event to the derived state.
    fn apply(&mut self, event: &StackEvent) {
        let is_stack_level =
            event.resource_type == STACK_RESOURCE_TYPE || event.logical_id == self.stack_name;

        if is_stack_level {
            self.deployment_status = Some(event.status.clone());
            if events::is_terminal_deployment_status(&event.status) && self.ended_at.is_none() {
                self.ended_at = Some(event.timestamp);
            }
        } else {
            self.resource_status.insert(
                event.logical_id.clone(),
                ResourceState {
                    resource_type: event.resource_type.clone(),
                    status: event.status.clone(),
                    physical_id: event.physical_id.clone(),
                },
            );
        }
    }

    /// Returns true once the deployment reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.deployment_status
            .as_deref()
            .is_some_and(events::is_terminal_deployment_status)
    }

    /// The stack this tracker watches.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    /// Produces an immutable snapshot of the derived state.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        let mut counts = ResourceCounts {
            total: self.total_resources.max(self.resource_status.len()),
            ..ResourceCounts::default()
        };
        for state in self.resource_status.values() {
            if !events::is_resource_settled(&state.status) {
                counts.in_progress += 1;
            } else if state.status.ends_with("_FAILED") {
                counts.failed += 1;
            } else {
                counts.completed += 1;
            }
        }

        let progress = if counts.total == 0 {
            0
        } else {
            let settled = counts.completed + counts.failed;
            // Never report over 100 even if the plane emits resources the
            // template did not declare.
            (settled * 100 / counts.total).min(100) as u8
        };

        let elapsed = self.ended_at.unwrap_or_else(Utc::now) - self.started_at;
        TrackerSnapshot {
            stack_name: self.stack_name.clone(),
            deployment_status: self.deployment_status.clone(),
            resource_status: self.resource_status.clone(),
            progress,
            counts,
            duration: events::format_duration(elapsed.num_seconds()),
        }
    }
}
