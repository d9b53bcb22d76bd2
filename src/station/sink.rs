//! The broadcast sink: the one audio feed shared by every run while the
//! station is live.
//!
//! [`BroadcastSink::open`] returns three handles. Runs receive a
//! [`BroadcastSink`], which can only write. The persistent publisher receives
//! the [`SinkFeed`]. Only the station keeps the [`SinkControl`], and only
//! that handle can destroy the sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The sink was destroyed before the write could be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("broadcast sink is closed")]
pub struct SinkClosed;

/// Counters exposed over the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub open: bool,
    pub bytes_written: u64,
    pub chunks_written: u64,
}

struct Shared {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: CancellationToken,
    bytes_written: AtomicU64,
    chunks_written: AtomicU64,
}

/// Write handle given to pipeline runs. Cloning or dropping it never closes
/// the sink.
#[derive(Clone)]
pub struct BroadcastSink {
    shared: Arc<Shared>,
}

/// Owner handle; the only way to close the sink.
pub struct SinkControl {
    shared: Arc<Shared>,
}

/// Read side consumed by the persistent publisher.
pub struct SinkFeed {
    rx: mpsc::Receiver<Bytes>,
    closed: CancellationToken,
}

impl BroadcastSink {
    /// Open a sink buffering up to `capacity` chunks.
    pub fn open(capacity: usize) -> (SinkControl, BroadcastSink, SinkFeed) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        let shared = Arc::new(Shared {
            tx: Mutex::new(Some(tx)),
            closed: closed.clone(),
            bytes_written: AtomicU64::new(0),
            chunks_written: AtomicU64::new(0),
        });

        (
            SinkControl {
                shared: shared.clone(),
            },
            BroadcastSink { shared },
            SinkFeed { rx, closed },
        )
    }

    /// Deliver one chunk, waiting while the feed is full.
    pub async fn write(&self, chunk: Bytes) -> Result<(), SinkClosed> {
        let tx = self.shared.tx.lock().clone().ok_or(SinkClosed)?;
        let len = chunk.len() as u64;

        tokio::select! {
            biased;
            _ = self.shared.closed.cancelled() => return Err(SinkClosed),
            sent = tx.send(chunk) => sent.map_err(|_| SinkClosed)?,
        }

        self.shared.bytes_written.fetch_add(len, Ordering::Relaxed);
        self.shared.chunks_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.shared.closed.is_cancelled()
    }

    pub fn stats(&self) -> SinkStats {
        stats(&self.shared)
    }
}

impl SinkControl {
    /// Close the sink. Pending and future writes fail with [`SinkClosed`]
    /// and the feed ends.
    pub fn destroy(&self) {
        self.shared.tx.lock().take();
        self.shared.closed.cancel();
    }

    pub fn is_open(&self) -> bool {
        !self.shared.closed.is_cancelled()
    }

    pub fn stats(&self) -> SinkStats {
        stats(&self.shared)
    }
}

impl SinkFeed {
    /// Next chunk, or `None` once the sink is destroyed.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            chunk = self.rx.recv() => chunk,
        }
    }
}

fn stats(shared: &Shared) -> SinkStats {
    SinkStats {
        open: !shared.closed.is_cancelled(),
        bytes_written: shared.bytes_written.load(Ordering::Relaxed),
        chunks_written: shared.chunks_written.load(Ordering::Relaxed),
    }
}
