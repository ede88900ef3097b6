//! Outbound progress and status events
//!
//! The core publishes indexing progress, per-group completion, and the
//! global indexing-status edge over a broadcast channel. Subscribers that
//! fall behind lose old events rather than applying backpressure to workers.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::debug;

/// Events published by the indexing core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexEvent {
    Progress {
        group: PathBuf,
        percent: f32,
        elapsed_ms: u64,
        remaining_ms: Option<u64>,
    },
    Completed {
        group: PathBuf,
        success: bool,
        duration_ms: u64,
        lines: u64,
        bytes: u64,
        error: Option<String>,
    },
    StatusChanged {
        indexing: bool,
    },
}

/// Broadcast fan-out for index events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IndexEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Send errors mean nobody is listening, which is fine.
    pub fn publish(&self, event: IndexEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!("No subscribers for index event: {:?}", event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(IndexEvent::StatusChanged { indexing: true });

        match rx.recv().await.unwrap() {
            IndexEvent::StatusChanged { indexing } => assert!(indexing),
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::new(16);
        bus.publish(IndexEvent::StatusChanged { indexing: false });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
