//! Notification Channel
//!
//! Out-of-band events for UI clients, carried by a `tokio::sync::broadcast`
//! channel. Publishing never blocks; lagging subscribers lose the oldest
//! events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RadioEvent {
    TrackChanged {
        title: String,
        duration: f64,
        requested_by: String,
    },
    Progress {
        title: String,
        elapsed: f64,
    },
    Seeked {
        title: String,
        position: f64,
    },
    Heartbeat {
        timestamp: i64,
    },
    Idle,
    QueueUpdated {
        length: usize,
    },
}

impl RadioEvent {
    /// Name used as the SSE `event:` field
    pub fn kind(&self) -> &'static str {
        match self {
            RadioEvent::TrackChanged { .. } => "trackChanged",
            RadioEvent::Progress { .. } => "progress",
            RadioEvent::Seeked { .. } => "seeked",
            RadioEvent::Heartbeat { .. } => "heartbeat",
            RadioEvent::Idle => "idle",
            RadioEvent::QueueUpdated { .. } => "queueUpdated",
        }
    }
}

/// Event plus the wall-clock time it was published
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub event: RadioEvent,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event; returns the number of subscribers reached
    pub fn publish(&self, event: RadioEvent) -> usize {
        tracing::trace!(kind = event.kind(), "Publishing event");
        let envelope = EventEnvelope {
            event,
            timestamp: Utc::now(),
        };
        // Dropped when nobody listens
        self.tx.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishes a heartbeat every `interval` until `cancel` fires
    pub fn spawn_heartbeat(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        bus.publish(RadioEvent::Heartbeat {
                            timestamp: Utc::now().timestamp_millis(),
                        });
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = RadioEvent::TrackChanged {
            title: "A".into(),
            duration: 180.0,
            requested_by: "bob".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "trackChanged");
        assert_eq!(json["requestedBy"], "bob");
        assert_eq!(event.kind(), "trackChanged");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(RadioEvent::Idle), 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(RadioEvent::QueueUpdated { length: 2 }), 1);
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event, RadioEvent::QueueUpdated { length: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_until_cancelled() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let cancel = CancellationToken::new();
        let task = bus.spawn_heartbeat(Duration::from_secs(15), cancel.clone());

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, RadioEvent::Heartbeat { .. }));

        cancel.cancel();
        task.await.unwrap();
    }
}
