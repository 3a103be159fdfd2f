//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`StudioEvent`]s. It is
//! shared via `Arc<EventBus>` between the job coordinator and whatever
//! displays credits, history, or notifications.

use chrono::{DateTime, Utc};
use lumo_core::types::JobId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// StudioEvent
// ---------------------------------------------------------------------------

/// A notification that something other components may care about happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    /// The user's credit balance may have changed; displays should refetch it.
    ///
    /// Emitted exactly once per successful job completion.
    CreditsChanged { at: DateTime<Utc> },

    /// A job reached `done`.
    JobCompleted { job_id: JobId, url: Option<String> },

    /// A job reached `failed`.
    JobFailed { job_id: JobId, error: Option<String> },

    /// The job list was rebuilt from backend history.
    HistoryReloaded { count: usize },
}

impl StudioEvent {
    pub fn credits_changed() -> Self {
        Self::CreditsChanged { at: Utc::now() }
    }

    /// Dot-separated name used in log lines, e.g. `"job.completed"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreditsChanged { .. } => "credits.changed",
            Self::JobCompleted { .. } => "job.completed",
            Self::JobFailed { .. } => "job.failed",
            Self::HistoryReloaded { .. } => "history.reloaded",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`StudioEvent`].
///
/// # Usage
///
/// ```rust
/// use lumo_events::bus::{EventBus, StudioEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(StudioEvent::credits_changed());
/// ```
pub struct EventBus {
    sender: broadcast::Sender<StudioEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: StudioEvent) {
        tracing::debug!(event = event.name(), "Publishing studio event");
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(StudioEvent::JobCompleted {
            job_id: "job-7".into(),
            url: Some("https://cdn.x/7.png".into()),
        });

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(
            received,
            StudioEvent::JobCompleted {
                job_id: "job-7".into(),
                url: Some("https://cdn.x/7.png".into()),
            }
        );
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(StudioEvent::credits_changed());

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.name(), "credits.changed");
        assert_eq!(e1, e2);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(StudioEvent::HistoryReloaded { count: 0 });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(StudioEvent::JobFailed {
            job_id: "j".into(),
            error: None,
        })
        .unwrap();
        assert_eq!(json["type"], "job_failed");
        assert_eq!(json["job_id"], "j");
    }
}
