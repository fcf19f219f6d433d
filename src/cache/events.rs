//! Asset change events.
//!
//! Watchers publish events into an in-memory queue; the invalidation consumer
//! drains them in batches.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::keys::AssetFile;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_QUEUE_LEN: &str = "trellis_change_queue_len";

/// Monotonic counter used to order events and changes.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct AssetEvent {
    /// Unique identifier for log correlation.
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl AssetEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// An asset file was modified, replaced or removed.
    Changed(AssetFile),
    /// Everything cached should be dropped.
    FlushAll,
}

/// FIFO queue of pending change events.
#[derive(Default)]
pub struct ChangeQueue {
    queue: Mutex<VecDeque<AssetEvent>>,
    epoch_counter: AtomicU64,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: EventKind) {
        let event = AssetEvent::new(kind, self.next_epoch());

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Asset event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Remove up to `limit` events, oldest first.
    pub fn drain(&self, limit: usize) -> Vec<AssetEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
