//! Broadcast sink for real-time delivery to connected operators.
//!
//! Publishing is fire-and-forget: a failed publish is reported to the caller
//! but never retried.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::NotificationDeliveryError;

/// Broadcast topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// A freshly raised alert.
    NewAlert,
    /// Periodic dashboard metrics.
    DashboardUpdate,
    /// A task changed stage.
    TaskUpdate,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAlert => "new_alert",
            Self::DashboardUpdate => "dashboard_update",
            Self::TaskUpdate => "task_update",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// Destination for broadcast messages.
pub trait BroadcastSink: Send + Sync {
    /// Name used in logs and delivery errors.
    fn name(&self) -> &str;

    /// Publish `payload` on `topic`.
    fn publish(
        &self,
        topic: Topic,
        payload: serde_json::Value,
    ) -> Result<(), NotificationDeliveryError>;
}

/// Sink backed by a `tokio::sync::broadcast` channel.
///
/// Subscribers that fall behind lose the oldest messages.
#[derive(Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<Envelope>,
}

impl ChannelSink {
    /// Create a sink whose channel buffers up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl BroadcastSink for ChannelSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn publish(
        &self,
        topic: Topic,
        payload: serde_json::Value,
    ) -> Result<(), NotificationDeliveryError> {
        let envelope = Envelope {
            topic,
            payload,
            published_at: Utc::now(),
        };

        self.tx
            .send(envelope)
            .map(|_| ())
            .map_err(|_| NotificationDeliveryError {
                sink: self.name().to_string(),
                reason: format!("no subscribers for topic '{topic}'"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let sink = ChannelSink::new(8);
        let mut rx = sink.subscribe();

        sink.publish(Topic::NewAlert, serde_json::json!({ "id": "a-1" }))
            .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.topic, Topic::NewAlert);
        assert_eq!(envelope.payload["id"], "a-1");
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let sink = ChannelSink::new(8);
        let err = sink
            .publish(Topic::TaskUpdate, serde_json::Value::Null)
            .unwrap_err();
        assert_eq!(err.sink, "broadcast");
    }
}
