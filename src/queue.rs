//! Inbound frame queue between the transport callback and the pull path
//!
//! Transport callbacks push from arbitrary threads, possibly concurrently;
//! the pipeline's pull thread pops. Push never blocks. Pop blocks until an
//! item arrives or the queue is closed, so closing is how `stop` unblocks a
//! pending pull.

use std::sync::RwLock;
use tracing::trace;

use crate::types::FrameItem;
use crate::{EdgeError, Result};

/// Unbounded multi-producer FIFO with a close signal.
pub struct InboundQueue {
    /// `None` once closed; dropping the only sender wakes blocked receivers.
    sender: RwLock<Option<flume::Sender<FrameItem>>>,
    receiver: flume::Receiver<FrameItem>,
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { sender: RwLock::new(Some(tx)), receiver: rx }
    }

    /// Enqueue one item.
    ///
    /// Returns `false` when the queue is closed; the item is dropped.
    pub fn push(&self, item: FrameItem) -> bool {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Block until an item is available.
    ///
    /// Items queued before `close` are still returned; once the queue is
    /// closed and empty this fails with a flushing `ProduceFailed`.
    pub fn pop(&self) -> Result<FrameItem> {
        self.receiver.recv().map_err(|_| EdgeError::flushing())
    }

    /// Async counterpart of [`pop`](Self::pop).
    pub async fn pop_async(&self) -> Result<FrameItem> {
        self.receiver.recv_async().await.map_err(|_| EdgeError::flushing())
    }

    /// Take an item if one is ready.
    pub fn try_pop(&self) -> Option<FrameItem> {
        self.receiver.try_recv().ok()
    }

    /// Stop accepting items and wake every blocked `pop`.
    pub fn close(&self) {
        let mut guard = self.sender.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            trace!("Inbound queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Drop every queued item, returning how many were discarded.
    pub fn drain(&self) -> usize {
        self.receiver.drain().count()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
