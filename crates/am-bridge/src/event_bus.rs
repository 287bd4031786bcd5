use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::protocol::BridgeMessage;

type Channels = HashMap<String, Vec<flume::Sender<BridgeMessage>>>;

/// A named-channel pub/sub bus built on top of flume channels.
///
/// Each call to [`subscribe`](EventBus::subscribe) creates a new receiver
/// that will receive every message published to that channel after the
/// subscription was created. The bus is thread-safe and can be cloned
/// cheaply (it wraps its internals in an `Arc`).
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Channels>>,
}

impl EventBus {
    /// Create a new, empty event bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("event bus lock was poisoned, recovering");
            e.into_inner()
        })
    }

    /// Register a new subscriber on `channel` and return its receiving end.
    pub fn subscribe(&self, channel: &str) -> flume::Receiver<BridgeMessage> {
        let (tx, rx) = flume::unbounded();
        self.channels()
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Publish a message to all current subscribers of `channel` and return
    /// how many received it.
    ///
    /// Disconnected subscribers (whose receivers have been dropped) are
    /// automatically pruned.
    pub fn publish(&self, channel: &str, msg: BridgeMessage) -> usize {
        let mut channels = self.channels();
        let Some(senders) = channels.get_mut(channel) else {
            return 0;
        };
        senders.retain(|tx| tx.send(msg.clone()).is_ok());
        let delivered = senders.len();
        if delivered == 0 {
            channels.remove(channel);
        }
        delivered
    }

    /// Return the number of currently registered subscribers on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels().get(channel).map_or(0, Vec::len)
    }
}
