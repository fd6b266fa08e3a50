//! Client Broadcast Fan-out
//!
//! Every listener owns a bounded channel. [`Broadcaster::broadcast`] never
//! awaits: it `try_send`s a clone of the packet to each sink and drops the
//! sinks whose channel is closed (listener gone) or full (listener too slow),
//! so one bad listener cannot delay or starve the others.

use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Default number of packets a sink can hold before being dropped
pub const DEFAULT_SINK_CAPACITY: usize = 256;

pub type SinkId = Uuid;

/// What a listener sink receives
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Audio(Bytes),
    /// Announces the track now on air; `index` increases with each announcement
    Metadata { title: String, index: u64 },
}

#[derive(Debug, Default)]
struct Registry {
    sinks: HashMap<SinkId, mpsc::Sender<Packet>>,
    now_playing: Option<(String, u64)>,
    announcements: u64,
}

#[derive(Debug)]
struct BroadcastInner {
    registry: Mutex<Registry>,
    capacity: usize,
}

impl BroadcastInner {
    fn remove(&self, id: &SinkId) -> bool {
        self.registry.lock().unwrap().sinks.remove(id).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcastInner>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SINK_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BroadcastInner {
                registry: Mutex::new(Registry::default()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Registers a new sink
    ///
    /// If a track is on air, the sink first receives its metadata packet.
    pub fn add_sink(&self) -> ListenerSink {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        let mut registry = self.inner.registry.lock().unwrap();
        if let Some((title, index)) = &registry.now_playing {
            let _ = tx.try_send(Packet::Metadata {
                title: title.clone(),
                index: *index,
            });
        }
        registry.sinks.insert(id, tx);
        let count = registry.sinks.len();
        drop(registry);

        tracing::debug!(sink = %id, listeners = count, "Sink registered");

        ListenerSink {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a sink; `false` if it was already gone
    pub fn remove_sink(&self, id: &SinkId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            tracing::debug!(sink = %id, "Sink removed");
        }
        removed
    }

    pub fn sink_count(&self) -> usize {
        self.inner.registry.lock().unwrap().sinks.len()
    }

    /// Copies `packet` to every live sink; returns the number of deliveries
    pub fn broadcast(&self, packet: Packet) -> usize {
        let mut registry = self.inner.registry.lock().unwrap();
        let mut delivered = 0;

        registry.sinks.retain(|id, tx| match tx.try_send(packet.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(sink = %id, "Listener too slow, dropping sink");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(sink = %id, "Listener gone, dropping sink");
                false
            }
        });

        delivered
    }

    pub fn broadcast_audio(&self, chunk: Bytes) -> usize {
        self.broadcast(Packet::Audio(chunk))
    }

    /// Records `title` as on air and sends its metadata packet to every sink
    pub fn announce(&self, title: &str) -> u64 {
        let index = {
            let mut registry = self.inner.registry.lock().unwrap();
            registry.announcements += 1;
            let index = registry.announcements;
            registry.now_playing = Some((title.to_string(), index));
            index
        };
        self.broadcast(Packet::Metadata {
            title: title.to_string(),
            index,
        });
        index
    }

    /// Nothing on air anymore (paused or idle)
    pub fn clear_now_playing(&self) {
        self.inner.registry.lock().unwrap().now_playing = None;
    }
}

/// Receiving end of one listener
///
/// Dropping it deregisters the sink.
#[derive(Debug)]
pub struct ListenerSink {
    id: SinkId,
    rx: mpsc::Receiver<Packet>,
    registry: Weak<BroadcastInner>,
}

impl ListenerSink {
    pub fn id(&self) -> SinkId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ListenerSink {
    type Item = Packet;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Packet>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ListenerSink {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            if inner.remove(&self.id) {
                tracing::debug!(sink = %self.id, "Listener disconnected");
            }
        }
    }
}
