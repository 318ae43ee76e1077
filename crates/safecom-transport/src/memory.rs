//! In-process datagram link.
//!
//! Two endpoints joined back to back. Each datagram carries the channel id it
//! was sent on, the way a routed lower layer would. Loss can be injected on the
//! sending side to exercise the retransmission and timeout paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::SpduSink;

/// One datagram in flight on a [`MemoryLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Channel id the sender attached.
    pub channel: u32,
    /// Encoded SPDU.
    pub bytes: Bytes,
}

/// Factory for a connected pair of in-memory endpoints.
pub struct MemoryLink;

impl MemoryLink {
    /// Create two endpoints; whatever one sends, the other receives.
    pub fn pair() -> (MemoryEndpoint, MemoryEndpoint) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();

        let a = MemoryEndpoint {
            sender: MemorySender::new(a_tx),
            inbound: a_rx,
        };
        let b = MemoryEndpoint {
            sender: MemorySender::new(b_tx),
            inbound: b_rx,
        };
        (a, b)
    }
}

/// Receiving end plus a cloneable sending handle.
pub struct MemoryEndpoint {
    sender: MemorySender,
    inbound: Receiver<Datagram>,
}

impl MemoryEndpoint {
    /// A sending handle usable as an [`SpduSink`].
    pub fn sender(&self) -> MemorySender {
        self.sender.clone()
    }

    /// Silently discard the next `count` datagrams sent from this endpoint.
    pub fn drop_next(&self, count: usize) {
        self.sender.drop_next.store(count, Ordering::SeqCst);
    }

    /// Take the next datagram if one is waiting.
    pub fn try_recv(&self) -> Result<Option<Datagram>> {
        match self.inbound.try_recv() {
            Ok(datagram) => Ok(Some(datagram)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Shutdown),
        }
    }

    /// Wait up to `timeout` for the next datagram.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Datagram>> {
        match self.inbound.recv_timeout(timeout) {
            Ok(datagram) => Ok(Some(datagram)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Shutdown),
        }
    }

    /// Take every datagram currently waiting, oldest first.
    pub fn drain(&self) -> Vec<Datagram> {
        self.inbound.try_iter().collect()
    }
}

/// Sending handle of a [`MemoryEndpoint`].
#[derive(Clone)]
pub struct MemorySender {
    tx: Sender<Datagram>,
    drop_next: Arc<AtomicUsize>,
}

impl MemorySender {
    fn new(tx: Sender<Datagram>) -> Self {
        Self {
            tx,
            drop_next: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn take_drop(&self) -> bool {
        self.drop_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl SpduSink for MemorySender {
    fn send_spdu(&mut self, channel: u32, spdu: &[u8]) -> Result<()> {
        if self.take_drop() {
            trace!(channel, len = spdu.len(), "memory link dropped datagram");
            return Ok(());
        }
        self.tx
            .send(Datagram {
                channel,
                bytes: Bytes::copy_from_slice(spdu),
            })
            .map_err(|_| TransportError::Shutdown)
    }
}
