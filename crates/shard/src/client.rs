use parking_lot::Mutex;
use shardspace_common::ClientId;
use shardspace_kernel::{ClientMessage, ClientSink};
use shardspace_persist::Sds;
use std::sync::Arc;

/// Client/observer side of a shard: unicast payloads to external receivers
/// and a feed of completed snapshots.
pub trait ClientChannel: Send + Sync {
    fn send(&self, receiver: ClientId, channel: u32, payload: &[u8]);

    fn broadcast(&self, snapshot: &Sds);
}

/// Channel that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClients;

impl ClientChannel for NullClients {
    fn send(&self, _receiver: ClientId, _channel: u32, _payload: &[u8]) {}

    fn broadcast(&self, _snapshot: &Sds) {}
}

/// Observer that keeps the digest of every snapshot it was shown, and every
/// unicast payload, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingClients {
    sent: Mutex<Vec<(ClientId, u32, Vec<u8>)>>,
    snapshots: Mutex<Vec<(u64, String)>>,
}

impl RecordingClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(ClientId, u32, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// (generation, digest) of every broadcast snapshot.
    pub fn snapshots(&self) -> Vec<(u64, String)> {
        self.snapshots.lock().clone()
    }
}

impl ClientChannel for RecordingClients {
    fn send(&self, receiver: ClientId, channel: u32, payload: &[u8]) {
        self.sent.lock().push((receiver, channel, payload.to_vec()));
    }

    fn broadcast(&self, snapshot: &Sds) {
        self.snapshots
            .lock()
            .push((snapshot.generation, snapshot.digest.clone()));
    }
}

/// Adapts a [`ClientChannel`] into the kernel's client sink.
pub(crate) struct ClientRelay(pub(crate) Arc<dyn ClientChannel>);

impl ClientSink for ClientRelay {
    fn relay(&self, message: ClientMessage) {
        self.0.send(message.receiver, message.channel, &message.payload);
    }
}
