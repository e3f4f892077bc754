//! Bounded work channel: FIFO of job ids between submitters and workers.
//!
//! Carries ids only; the records live in the Job Table.

use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::error;

use crate::domain::JobId;
use crate::error::QueueError;

/// Fixed-capacity multi-producer, multi-consumer FIFO.
///
/// # Implementation
/// - `tokio::sync::mpsc` bounded channel provides capacity and FIFO order.
/// - The single receiver is shared by all workers behind an async mutex.
/// - `None` items are wake-up sentinels pushed by `stop`; the ones no worker
///   consumed are purged afterwards so they never hold capacity.
/// - `gate` is shared by every `enqueue` and taken exclusively by
///   `purge_sentinels`, which re-pushes ids into the slots it frees.
pub struct BoundedChannel {
    tx: mpsc::Sender<Option<JobId>>,
    rx: Mutex<mpsc::Receiver<Option<JobId>>>,
    gate: RwLock<()>,
}

impl BoundedChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            gate: RwLock::new(()),
        }
    }

    /// Push an id, waiting at most `timeout` for free capacity.
    pub async fn enqueue(&self, id: JobId, timeout: Duration) -> Result<(), QueueError> {
        let _gate = self.gate.read().await;
        self.tx
            .send_timeout(Some(id), timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => QueueError::QueueFull {
                    capacity: self.capacity(),
                },
                mpsc::error::SendTimeoutError::Closed(_) => QueueError::ChannelClosed,
            })
    }

    /// Wait for the next item.
    ///
    /// Returns `None` for a sentinel. Cancel-safe: dropping the future
    /// before it resolves loses no item.
    pub async fn dequeue(&self) -> Option<JobId> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.flatten()
    }

    /// Push a sentinel without waiting. Dropped when the channel is full,
    /// in which case the workers have real items to wake on.
    pub fn wake(&self) -> bool {
        self.tx.try_send(None).is_ok()
    }

    /// Remove leftover sentinels, keeping buffered ids in FIFO order.
    ///
    /// Only for a stopped queue: no worker may be dequeuing. Returns how many
    /// sentinels were removed.
    pub async fn purge_sentinels(&self) -> usize {
        let _gate = self.gate.write().await;
        let mut rx = self.rx.lock().await;

        let mut ids = Vec::new();
        let mut purged = 0;
        while let Ok(item) = rx.try_recv() {
            match item {
                Some(id) => ids.push(id),
                None => purged += 1,
            }
        }
        // every id had a slot a moment ago and nobody else can send
        for id in ids {
            if self.tx.try_send(Some(id)).is_err() {
                error!(job = %id, "lost job id while purging sentinels");
            }
        }
        purged
    }

    /// Drop every buffered item. Returns how many were removed.
    pub async fn drain(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    /// Number of buffered items.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
