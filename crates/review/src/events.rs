//! Live run events pushed to connected viewers

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Kind of a viewer event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Begin,
    SuiteBegin,
    SuiteEnd,
    TestBegin,
    TestEnd,
    NoReference,
    Skip,
    Warning,
    Error,
    End,
}

/// One event as sent to a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerEvent {
    pub event: EventKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ViewerEvent {
    pub fn new(event: EventKind, data: serde_json::Value) -> Self {
        Self { event, data }
    }

    /// Build an event whose payload is any serializable value
    pub fn with<T: Serialize>(event: EventKind, data: &T) -> Self {
        let data = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
        Self { event, data }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A connected viewer's receiving end
pub struct Subscription {
    pub id: u64,
    pub events: mpsc::Receiver<ViewerEvent>,
}

struct Sink {
    id: u64,
    tx: mpsc::Sender<ViewerEvent>,
}

/// Broadcasts events to every subscribed viewer
///
/// Each viewer has a bounded queue. Emitting never waits: a viewer whose queue
/// is full or whose connection is gone is dropped from the registry together
/// with its queued events.
pub struct EventChannel {
    sinks: Mutex<Vec<Sink>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sinks.lock().push(Sink { id, tx });
        debug!("Viewer {} subscribed", id);
        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.sinks.lock().retain(|sink| sink.id != id);
    }

    pub fn emit(&self, event: ViewerEvent) {
        let mut sinks = self.sinks.lock();
        sinks.retain(|sink| match sink.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Viewer {} is not keeping up, dropping it", sink.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Viewer {} disconnected", sink.id);
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().len()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(256)
    }
}
