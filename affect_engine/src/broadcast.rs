/* affect:meta
id: AFF-20261006-broadcast-hub
intent: code
summary: |-
  Observer registry with bounded per-observer channels. Fan-out walks a copy
  of the registry and uses try_send; closed or stalled observers are removed
  afterwards without disturbing delivery to the others.
*/
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::state::Metadata;

/// Message pushed to observers on connect and after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub progress: i32,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    pub const PROGRESS_UPDATE: &'static str = "progress_update";

    pub fn progress_update(progress: i32, metadata: Metadata, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: Self::PROGRESS_UPDATE,
            progress,
            metadata,
            timestamp,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub type ObserverId = u64;

/// Why an observer was dropped from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    Closed,
    Stalled,
}

impl DeliveryFailure {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Stalled => "stalled",
        }
    }
}

/// Receiving end held by one observer connection.
pub struct Observer {
    id: ObserverId,
    rx: mpsc::Receiver<Arc<BroadcastMessage>>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// `None` once the hub has dropped this observer.
    pub async fn recv(&mut self) -> Option<Arc<BroadcastMessage>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<BroadcastMessage>> {
        self.rx.try_recv().ok()
    }
}

pub struct BroadcastHub {
    observers: RwLock<HashMap<ObserverId, mpsc::Sender<Arc<BroadcastMessage>>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Registers an observer; `initial` is the first message it receives.
    pub fn subscribe(&self, initial: BroadcastMessage) -> Observer {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // a fresh channel always has room for one message
        let _ = tx.try_send(Arc::new(initial));
        let count = {
            let mut observers = self.observers.write();
            observers.insert(id, tx);
            observers.len()
        };
        metrics::gauge!("affect_observers").set(count as f64);
        debug!(observer = id, observers = count, "observer subscribed");
        Observer { id, rx }
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let (removed, count) = {
            let mut observers = self.observers.write();
            let removed = observers.remove(&id).is_some();
            (removed, observers.len())
        };
        if removed {
            metrics::gauge!("affect_observers").set(count as f64);
            debug!(observer = id, observers = count, "observer unsubscribed");
        }
        removed
    }

    /// Drops every observer; their receivers drain and then yield `None`.
    pub fn close_all(&self) -> usize {
        let closed = std::mem::take(&mut *self.observers.write()).len();
        if closed > 0 {
            metrics::gauge!("affect_observers").set(0.0);
            debug!(observers = closed, "all observers closed");
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `message` to every live observer. Returns how many got it.
    pub fn publish(&self, message: BroadcastMessage) -> usize {
        let message = Arc::new(message);
        let targets: Vec<(ObserverId, mpsc::Sender<Arc<BroadcastMessage>>)> = self
            .observers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => failed.push((id, DeliveryFailure::Stalled)),
                Err(TrySendError::Closed(_)) => failed.push((id, DeliveryFailure::Closed)),
            }
        }

        if !failed.is_empty() {
            let count = {
                let mut observers = self.observers.write();
                for (id, _) in &failed {
                    observers.remove(id);
                }
                observers.len()
            };
            for (id, reason) in failed {
                metrics::counter!("affect_broadcast_dropped_total", "reason" => reason.as_str())
                    .increment(1);
                warn!(observer = id, reason = reason.as_str(), "observer dropped");
            }
            metrics::gauge!("affect_observers").set(count as f64);
        }
        debug!(progress = message.progress, delivered, "broadcast published");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(progress: i32) -> BroadcastMessage {
        BroadcastMessage::progress_update(progress, Metadata::new(), Utc::now())
    }

    #[tokio::test]
    async fn snapshot_arrives_before_deltas() {
        let hub = BroadcastHub::new(4);
        let mut observer = hub.subscribe(message(10));
        hub.publish(message(11));
        assert_eq!(observer.recv().await.unwrap().progress, 10);
        assert_eq!(observer.recv().await.unwrap().progress, 11);
    }

    #[tokio::test]
    async fn stalled_observer_is_dropped() {
        let hub = BroadcastHub::new(1);
        let mut slow = hub.subscribe(message(0));
        let mut fast = hub.subscribe(message(0));
        assert_eq!(fast.recv().await.unwrap().progress, 0);

        assert_eq!(hub.publish(message(1)), 1);
        assert_eq!(hub.len(), 1);
        assert_eq!(fast.recv().await.unwrap().progress, 1);

        // the slow observer still drains what it had, then sees the end
        assert_eq!(slow.recv().await.unwrap().progress, 0);
        assert!(slow.recv().await.is_none());
    }

    #[test]
    fn message_serializes_with_type_tag() {
        let json = message(42).to_json();
        assert_eq!(json["type"], "progress_update");
        assert_eq!(json["progress"], 42);
        assert!(json["timestamp"].is_string());
    }
}
