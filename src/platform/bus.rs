// FlashBatch - platform/bus.rs
//
// In-process publish/subscribe bus standing in for the cross-window event
// transport. Each window holds a `Subscription` and drains it on its own
// tick, the same way the UI loop drains background worker channels.
//
// Delivery rules:
// - A message reaches every live subscriber except its publisher.
// - Per-subscriber order is publish order; there is no global ordering
//   across publishers.
// - Dropped subscriptions are pruned on the next publish.

use crate::core::progress::PortProgressEvent;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "kebab-case")]
pub enum BusMessage {
    /// A progress event tagged with its port.
    FlashProgress(PortProgressEvent),
    /// A line appended to the log buffer.
    LogMessage { message: String, important: bool },
    /// The log buffer was cleared.
    LogClear,
    /// The flashing flag changed.
    #[serde(rename_all = "camelCase")]
    LogFlashing { is_flashing: bool },
    /// A newly opened window asks for the current buffer.
    LogSyncRequest,
    /// Reply to `LogSyncRequest` carrying a full buffer.
    #[serde(rename_all = "camelCase")]
    LogSyncData {
        messages: Vec<String>,
        is_flashing: bool,
    },
}

impl BusMessage {
    /// Topic name as used on the window transport.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::FlashProgress(_) => "flash-progress",
            Self::LogMessage { .. } => "log-message",
            Self::LogClear => "log-clear",
            Self::LogFlashing { .. } => "log-flashing",
            Self::LogSyncRequest => "log-sync-request",
            Self::LogSyncData { .. } => "log-sync-data",
        }
    }
}

#[derive(Debug, Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(u64, Sender<BusMessage>)>,
}

/// Cloneable handle to one bus. All clones share subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means a publisher panicked mid-send; the
    // subscriber list itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push((id, tx));
        tracing::debug!(subscriber = id, "Bus subscriber added");
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// Publish from outside any window (e.g. the engine bridge).
    /// Every subscriber receives it.
    pub fn publish(&self, message: BusMessage) {
        self.publish_from(None, message);
    }

    fn publish_from(&self, origin: Option<u64>, message: BusMessage) {
        let mut inner = self.lock();
        inner.subscribers.retain(|(id, tx)| {
            if Some(*id) == origin {
                return true;
            }
            tx.send(message.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// One window's end of the bus.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: Receiver<BusMessage>,
    bus: EventBus,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Publish to every other subscriber.
    pub fn publish(&self, message: BusMessage) {
        tracing::trace!(subscriber = self.id, topic = message.topic(), "Bus publish");
        self.bus.publish_from(Some(self.id), message);
    }

    /// Take the next pending message without blocking.
    pub fn try_recv(&self) -> Option<BusMessage> {
        self.rx.try_recv().ok()
    }

    /// Take every pending message without blocking.
    pub fn drain(&self) -> Vec<BusMessage> {
        self.rx.try_iter().collect()
    }
}
