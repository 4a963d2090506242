//! Ordered sinks for render output

use crate::error::TrellisResult;
use crate::render::chunk::RenderChunk;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ordered, append-only sink for render output
pub trait RenderDestination: Send {
    fn write(&mut self, chunk: RenderChunk);
}

impl RenderDestination for Vec<RenderChunk> {
    fn write(&mut self, chunk: RenderChunk) {
        self.push(chunk);
    }
}

/// Forwards chunks to a receiving stream.
///
/// The first write commits the response and raises `committed`. Writes
/// after the receiver is gone are dropped; the client disconnected.
pub struct ChannelDestination {
    tx: mpsc::UnboundedSender<TrellisResult<RenderChunk>>,
    committed: Arc<AtomicBool>,
}

impl ChannelDestination {
    pub fn new(
        tx: mpsc::UnboundedSender<TrellisResult<RenderChunk>>,
        committed: Arc<AtomicBool>,
    ) -> Self {
        Self { tx, committed }
    }

    /// Report a render failure to the receiver
    pub fn fail(&mut self, error: crate::error::TrellisError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RenderDestination for ChannelDestination {
    fn write(&mut self, chunk: RenderChunk) {
        self.committed.store(true, Ordering::Release);
        let _ = self.tx.send(Ok(chunk));
    }
}
