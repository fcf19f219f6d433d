//! Invalidation consumer.
//!
//! Drains change events from the queue and applies them to the asset content
//! cache.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument};
use uuid::Uuid;

use super::asset::AssetContentCache;
use super::events::ChangeQueue;
use super::planner::InvalidationPlan;

const METRIC_INVALIDATION_MS: &str = "trellis_cache_invalidation_ms";

pub struct InvalidationConsumer {
    assets: Arc<AssetContentCache>,
    queue: Arc<ChangeQueue>,
    batch_limit: usize,
}

impl InvalidationConsumer {
    pub fn new(assets: Arc<AssetContentCache>, queue: Arc<ChangeQueue>, batch_limit: usize) -> Self {
        Self {
            assets,
            queue,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Apply one batch of pending events.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let events = self.queue.drain(self.batch_limit);
        if events.is_empty() {
            return false;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(event_count, event_ids = ?event_ids, plan = %plan, "Invalidation starting");

        let mut ejected = 0;
        if plan.flush_all {
            self.assets.flush_all();
        } else {
            for file in &plan.changed_files {
                ejected += self.assets.changed(file);
            }
        }

        info!(event_count, ejected, "Invalidation complete");
        histogram!(METRIC_INVALIDATION_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        true
    }

    /// Consume until the queue is empty.
    pub fn consume_all(&self) -> usize {
        let mut batches = 0;
        while self.consume() {
            batches += 1;
        }
        batches
    }
}
