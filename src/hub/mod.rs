//! BroadcastHub: fan-out of tracker updates to live observers.
//!
//! The hub owns at most one poll loop per deployment, regardless of how
//! many observers are attached. The first subscriber starts the loop;
//! the loop exits when the last subscriber detaches or the deployment
//! reaches a terminal state. Delivery uses one unbounded channel per
//! subscriber, so a slow observer never blocks the others.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::cloud::{CloudClient, StackEvent, StackOutput};
use crate::tracker::{EventTracker, TrackerSnapshot};

/// Messages pushed to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMessage {
    /// Replay of the current derived state, sent once on subscribe when
    /// the poll loop was already running.
    InitialState {
        /// Snapshot at subscribe time.
        snapshot: TrackerSnapshot,
    },
    /// One resource transitioned.
    ResourceUpdate {
        /// Logical id of the resource.
        logical_id: String,
        /// Provider resource type string.
        resource_type: String,
        /// New status token.
        status: String,
        /// Physical id, if assigned.
        physical_id: Option<String>,
        /// Deployment-wide progress percentage after this event.
        progress: u8,
        /// Deployment-level status, if known.
        deployment_status: Option<String>,
    },
    /// The deployment reached a terminal state; final message.
    Completed {
        /// Terminal deployment status.
        final_status: String,
        /// Declared stack outputs.
        outputs: Vec<StackOutput>,
        /// Total tracked duration, formatted.
        duration: String,
    },
    /// Polling failed with a non-transient error; the loop has stopped.
    Error {
        /// Description of the failure.
        message: String,
    },
}

/// Per-deployment fan-out state.
struct Channel {
    next_subscriber_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<UpdateMessage>>,
    last_snapshot: Option<TrackerSnapshot>,
}

type Registry = Arc<Mutex<HashMap<String, Channel>>>;

/// A live subscription to one deployment's updates.
///
/// Dropping the subscription detaches the observer; the shared poll loop
/// keeps running until no observers remain.
pub struct Subscription {
    stack_name: String,
    subscriber_id: u64,
    receiver: mpsc::UnboundedReceiver<UpdateMessage>,
    registry: Registry,
}

impl Subscription {
    /// Receives the next update, or `None` once the stream is finished.
    pub async fn recv(&mut self) -> Option<UpdateMessage> {
        self.receiver.recv().await
    }

    /// The deployment this subscription watches.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut registry = match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(channel) = registry.get_mut(&self.stack_name) {
            channel.subscribers.remove(&self.subscriber_id);
            // The poll loop notices the empty subscriber set on its next
            // tick and exits; no entry is removed here to avoid racing a
            // loop that is mid-broadcast.
        }
    }
}

/// Multiplexes tracker output to any number of observers.
pub struct BroadcastHub {
    client: Arc<dyn CloudClient>,
    registry: Registry,
    poll_interval: Duration,
}

impl BroadcastHub {
    /// Creates a hub polling at the given interval.
    #[must_use]
    pub fn new(client: Arc<dyn CloudClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            registry: Arc::new(Mutex::new(HashMap::new())),
            poll_interval,
        }
    }

    /// Attaches an observer to a deployment.
    ///
    /// Starts the poll loop if this is the first observer; otherwise the
    /// new observer immediately receives an `InitialState` replay of
    /// everything tracked so far.
    ///
    /// `total_resources` seeds the progress denominator when a new loop
    /// is started; it is ignored for an already-running deployment.
    #[must_use]
    pub fn subscribe(&self, stack_name: &str, total_resources: usize) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let (subscriber_id, start_loop) = {
            let mut registry = self.registry.lock().expect("hub registry");
            let existing = registry.contains_key(stack_name);
            let channel = registry.entry(stack_name.to_string()).or_insert_with(|| Channel {
                next_subscriber_id: 0,
                subscribers: HashMap::new(),
                last_snapshot: None,
            });

            let id = channel.next_subscriber_id;
            channel.next_subscriber_id += 1;

            if existing {
                if let Some(snapshot) = &channel.last_snapshot {
                    let _ = tx.send(UpdateMessage::InitialState {
                        snapshot: snapshot.clone(),
                    });
                }
            }
            channel.subscribers.insert(id, tx);
            (id, !existing)
        };

        if start_loop {
            info!(stack = stack_name, "starting poll loop");
            let tracker = EventTracker::new(
                Arc::clone(&self.client),
                stack_name.to_string(),
                total_resources,
            );
            tokio::spawn(poll_loop(
                tracker,
                Arc::clone(&self.client),
                Arc::clone(&self.registry),
                self.poll_interval,
            ));
        } else {
            debug!(stack = stack_name, "joined existing poll loop");
        }

        Subscription {
            stack_name: stack_name.to_string(),
            subscriber_id,
            receiver: rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of currently running poll loops.
    #[must_use]
    pub fn active_poll_loops(&self) -> usize {
        self.registry.lock().expect("hub registry").len()
    }
}

/// Sends a message to every current subscriber of a deployment.
///
/// A closed receiver (observer went away without dropping yet) is
/// skipped; it cannot affect delivery to the others.
fn broadcast(registry: &Registry, stack_name: &str, message: &UpdateMessage) {
    let senders: Vec<mpsc::UnboundedSender<UpdateMessage>> = {
        let registry = registry.lock().expect("hub registry");
        registry
            .get(stack_name)
            .map(|c| c.subscribers.values().cloned().collect())
            .unwrap_or_default()
    };
    for sender in senders {
        let _ = sender.send(message.clone());
    }
}

/// Converts a tracker event into an observer-facing update.
fn resource_update(event: &StackEvent, snapshot: &TrackerSnapshot) -> UpdateMessage {
    UpdateMessage::ResourceUpdate {
        logical_id: event.logical_id.clone(),
        resource_type: event.resource_type.clone(),
        status: event.status.clone(),
        physical_id: event.physical_id.clone(),
        progress: snapshot.progress,
        deployment_status: snapshot.deployment_status.clone(),
    }
}

/// The shared per-deployment poll loop.
async fn poll_loop(
    mut tracker: EventTracker,
    client: Arc<dyn CloudClient>,
    registry: Registry,
    poll_interval: Duration,
) {
    let stack_name = tracker.stack_name().to_string();

    loop {
        // Refcount check: exit once the last observer detached. Check and
        // removal happen under one lock so a subscriber arriving in
        // between cannot be orphaned.
        {
            let mut guard = registry.lock().expect("hub registry");
            let has_subscribers = guard
                .get(&stack_name)
                .is_some_and(|c| !c.subscribers.is_empty());
            if !has_subscribers {
                guard.remove(&stack_name);
                drop(guard);
                info!(stack = %stack_name, "last observer detached; stopping poll loop");
                return;
            }
        }

        match tracker.poll().await {
            Ok(fresh) => {
                let snapshot = tracker.snapshot();
                {
                    let mut guard = registry.lock().expect("hub registry");
                    if let Some(channel) = guard.get_mut(&stack_name) {
                        channel.last_snapshot = Some(snapshot.clone());
                    }
                }
                for event in &fresh {
                    if event.logical_id != stack_name {
                        broadcast(&registry, &stack_name, &resource_update(event, &snapshot));
                    }
                }

                if tracker.is_terminal() {
                    let outputs = client
                        .describe_stack(&stack_name)
                        .await
                        .map(|s| s.outputs)
                        .unwrap_or_default();
                    let message = UpdateMessage::Completed {
                        final_status: snapshot
                            .deployment_status
                            .clone()
                            .unwrap_or_else(|| String::from("UNKNOWN")),
                        outputs,
                        duration: snapshot.duration.clone(),
                    };
                    info!(stack = %stack_name, "deployment terminal; stopping poll loop");
                    broadcast(&registry, &stack_name, &message);
                    remove_channel(&registry, &stack_name);
                    return;
                }
            }
            Err(e) => {
                // Transport failure: tell current observers, stop this
                // loop only. Other deployments' loops are unaffected.
                error!(stack = %stack_name, error = %e, "poll loop failed");
                broadcast(
                    &registry,
                    &stack_name,
                    &UpdateMessage::Error {
                        message: e.to_string(),
                    },
                );
                remove_channel(&registry, &stack_name);
                return;
            }
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Drops a deployment's channel, closing every subscriber's stream.
fn remove_channel(registry: &Registry, stack_name: &str) {
    registry
        .lock()
        .expect("hub registry")
        .remove(stack_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::FakeCloud;
    use chrono::Utc;

    const TICK: Duration = Duration::from_millis(10);

    fn event(id: &str, logical_id: &str, resource_type: &str, status: &str) -> StackEvent {
        StackEvent {
            event_id: id.to_string(),
            logical_id: logical_id.to_string(),
            resource_type: resource_type.to_string(),
            status: status.to_string(),
            physical_id: Some(format!("phys-{id}")),
            status_reason: None,
            timestamp: Utc::now(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_single_poll_loop_for_many_subscribers() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.put_stack("default-abc", "CREATE_IN_PROGRESS");
        let hub = BroadcastHub::new(cloud, TICK);

        let a = hub.subscribe("default-abc", 2);
        let b = hub.subscribe("default-abc", 2);
        let c = hub.subscribe("default-abc", 2);
        settle().await;
        assert_eq!(hub.active_poll_loops(), 1);

        // All but one detach: loop keeps running.
        drop(a);
        drop(b);
        settle().await;
        assert_eq!(hub.active_poll_loops(), 1);

        // Last one detaches: loop stops.
        drop(c);
        settle().await;
        assert_eq!(hub.active_poll_loops(), 0);
    }

    #[tokio::test]
    async fn test_updates_fan_out_to_all_subscribers() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.put_stack("default-abc", "CREATE_IN_PROGRESS");
        let hub = BroadcastHub::new(Arc::clone(&cloud) as Arc<dyn CloudClient>, TICK);

        let mut a = hub.subscribe("default-abc", 1);
        let mut b = hub.subscribe("default-abc", 1);
        settle().await;

        cloud.push_event(
            "default-abc",
            event("e1", "Buckets3", "AWS::S3::Bucket", "CREATE_COMPLETE"),
        );

        for sub in [&mut a, &mut b] {
            let msg = sub.recv().await.expect("update");
            let UpdateMessage::ResourceUpdate {
                logical_id,
                status,
                progress,
                ..
            } = msg
            else {
                panic!("expected a resource update");
            };
            assert_eq!(logical_id, "Buckets3");
            assert_eq!(status, "CREATE_COMPLETE");
            assert_eq!(progress, 100);
        }
    }

    #[tokio::test]
    async fn test_terminal_state_emits_completed_and_stops() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.put_stack("default-abc", "CREATE_COMPLETE");
        cloud.push_event(
            "default-abc",
            event("e1", "Buckets3", "AWS::S3::Bucket", "CREATE_COMPLETE"),
        );
        cloud.push_event(
            "default-abc",
            event(
                "e2",
                "default-abc",
                "AWS::CloudFormation::Stack",
                "CREATE_COMPLETE",
            ),
        );
        let hub = BroadcastHub::new(Arc::clone(&cloud) as Arc<dyn CloudClient>, TICK);

        let mut sub = hub.subscribe("default-abc", 1);

        let first = sub.recv().await.expect("resource update");
        assert!(matches!(first, UpdateMessage::ResourceUpdate { .. }));

        let last = sub.recv().await.expect("completed");
        let UpdateMessage::Completed { final_status, .. } = last else {
            panic!("expected completed message");
        };
        assert_eq!(final_status, "CREATE_COMPLETE");

        // Stream closes after the terminal message.
        assert!(sub.recv().await.is_none());
        settle().await;
        assert_eq!(hub.active_poll_loops(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_initial_state() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.put_stack("default-abc", "CREATE_IN_PROGRESS");
        cloud.push_event(
            "default-abc",
            event("e1", "Buckets3", "AWS::S3::Bucket", "CREATE_IN_PROGRESS"),
        );
        let hub = BroadcastHub::new(Arc::clone(&cloud) as Arc<dyn CloudClient>, TICK);

        let _first = hub.subscribe("default-abc", 2);
        settle().await;

        let mut late = hub.subscribe("default-abc", 2);
        let msg = late.recv().await.expect("initial state");
        let UpdateMessage::InitialState { snapshot } = msg else {
            panic!("expected initial state replay");
        };
        assert!(snapshot.resource_status.contains_key("Buckets3"));
    }

    #[tokio::test]
    async fn test_transport_failure_broadcasts_error_and_stops_loop() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.put_stack("default-abc", "CREATE_IN_PROGRESS");
        cloud.fail_polls();
        let hub = BroadcastHub::new(Arc::clone(&cloud) as Arc<dyn CloudClient>, TICK);

        let mut sub = hub.subscribe("default-abc", 1);
        let msg = sub.recv().await.expect("error message");
        assert!(matches!(msg, UpdateMessage::Error { .. }));

        settle().await;
        assert_eq!(hub.active_poll_loops(), 0);
    }
}
