//! Datagram transport abstraction
//!
//! The supervisor talks to every peer over a serial-capable datagram
//! transport: open one or more listen channels, send to a destination
//! channel, receive `(src, dst, payload, distance)` events. The in-memory
//! implementation backs tests and the bench simulator; a hardware modem
//! implementation lives with the platform glue, behind the same trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{ComLinkError, Result};

/// One received datagram event.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Channel the sender transmits replies on
    pub src: u16,
    /// Channel this datagram was addressed to
    pub dst: u16,
    pub payload: Bytes,
    /// Physical distance to the sender; 0.0 when unknown
    pub distance: f64,
}

/// Serial-capable datagram transport.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Start listening on a channel. Opening an already-open channel is a no-op.
    async fn open(&self, channel: u16) -> Result<()>;

    /// Transmit one datagram to `dst`, advertising `src` as the reply channel.
    async fn send(&self, dst: u16, src: u16, payload: Bytes) -> Result<()>;

    /// Wait for the next datagram addressed to any open channel.
    async fn recv(&self) -> Result<Datagram>;
}

type EndpointTx = mpsc::UnboundedSender<Datagram>;

struct HubInner {
    // channel -> listening endpoints
    listeners: HashMap<u16, Vec<(usize, EndpointTx)>>,
    next_endpoint: usize,
}

/// In-process datagram hub: every [`MemoryTransport`] endpoint attached to
/// the same hub can reach every other. Per-sender order is preserved by the
/// underlying mpsc queues.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                listeners: HashMap::new(),
                next_endpoint: 0,
            })),
        }
    }

    /// Attach a new endpoint at distance 0.
    pub fn endpoint(&self) -> MemoryTransport {
        self.endpoint_at(0.0)
    }

    /// Attach a new endpoint at a simulated distance (used by trusted-range
    /// tests).
    pub fn endpoint_at(&self, distance: f64) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().expect("hub lock");
            inner.next_endpoint += 1;
            inner.next_endpoint
        };
        MemoryTransport {
            hub: self.clone(),
            id,
            tx,
            rx: tokio::sync::Mutex::new(rx),
            distance,
        }
    }

    fn subscribe(&self, channel: u16, id: usize, tx: EndpointTx) {
        let mut inner = self.inner.lock().expect("hub lock");
        let subs = inner.listeners.entry(channel).or_default();
        if !subs.iter().any(|(sid, _)| *sid == id) {
            subs.push((id, tx));
        }
    }

    fn deliver(&self, from_id: usize, datagram: Datagram) {
        let mut inner = self.inner.lock().expect("hub lock");
        if let Some(subs) = inner.listeners.get_mut(&datagram.dst) {
            // Drop endpoints whose receiver is gone, do not loop back to sender
            subs.retain(|(sid, tx)| *sid == from_id || tx.send(datagram.clone()).is_ok());
        }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint on a [`MemoryHub`].
pub struct MemoryTransport {
    hub: MemoryHub,
    id: usize,
    tx: EndpointTx,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    distance: f64,
}

#[async_trait]
impl DatagramTransport for MemoryTransport {
    async fn open(&self, channel: u16) -> Result<()> {
        self.hub.subscribe(channel, self.id, self.tx.clone());
        trace!("memory transport endpoint {} opened channel {}", self.id, channel);
        Ok(())
    }

    async fn send(&self, dst: u16, src: u16, payload: Bytes) -> Result<()> {
        trace!(
            "memory transport endpoint {} send {} bytes {} -> {}",
            self.id,
            payload.len(),
            src,
            dst
        );
        self.hub.deliver(
            self.id,
            Datagram {
                src,
                dst,
                payload,
                distance: self.distance,
            },
        );
        Ok(())
    }

    async fn recv(&self) -> Result<Datagram> {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| ComLinkError::transport("memory hub closed"))
    }
}
