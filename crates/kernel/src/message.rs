use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shardspace_common::{ClientId, EntityId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entity-to-entity payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Sender id as of the generation the message was sent in (post-motion).
    pub sender: EntityId,
    pub channel: u32,
    pub payload: Vec<u8>,
}

/// A message tagged with its sender-assigned order index.
///
/// `(sender guid, order_index)` is unique per generation; receivers key
/// their pending queue on it so redelivery is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderedMessage {
    pub order_index: u32,
    pub message: Message,
}

impl OrderedMessage {
    pub fn new(order_index: u32, message: Message) -> Self {
        Self {
            order_index,
            message,
        }
    }

    pub fn sender(&self) -> &EntityId {
        &self.message.sender
    }
}

/// Payload addressed to an external client rather than an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientMessage {
    pub sender: EntityId,
    pub order_index: u32,
    pub receiver: ClientId,
    pub channel: u32,
    pub payload: Vec<u8>,
}

/// Outlet for client-addressed messages. Fire-and-forget.
pub trait ClientSink: Send + Sync {
    fn relay(&self, message: ClientMessage);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ClientSink for NullSink {
    fn relay(&self, _message: ClientMessage) {}
}

/// Records every client message per receiver and optionally forwards it.
///
/// The recorded log becomes the outbound client-message section of a
/// generation snapshot.
#[derive(Default)]
pub struct ClientMessageLog {
    queues: Mutex<BTreeMap<ClientId, Vec<ClientMessage>>>,
    forward: Option<Arc<dyn ClientSink>>,
}

impl ClientMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding_to(forward: Arc<dyn ClientSink>) -> Self {
        Self {
            queues: Mutex::new(BTreeMap::new()),
            forward: Some(forward),
        }
    }

    pub fn len(&self) -> usize {
        self.queues.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the recorded queues, each sorted by (sender, order index).
    pub fn take(&self) -> BTreeMap<ClientId, Vec<ClientMessage>> {
        let mut queues = std::mem::take(&mut *self.queues.lock());
        for queue in queues.values_mut() {
            queue.sort();
        }
        queues
    }
}

impl ClientSink for ClientMessageLog {
    fn relay(&self, message: ClientMessage) {
        if let Some(forward) = &self.forward {
            forward.relay(message.clone());
        }
        self.queues
            .lock()
            .entry(message.receiver)
            .or_default()
            .push(message);
    }
}

impl std::fmt::Debug for ClientMessageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMessageLog")
            .field("messages", &self.len())
            .field("forwarding", &self.forward.is_some())
            .finish()
    }
}
