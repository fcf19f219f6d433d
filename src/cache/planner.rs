//! Invalidation plan generation.
//!
//! Merges a drained batch of change events into one plan.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::events::{AssetEvent, EventKind};
use super::keys::AssetFile;

/// Work to perform for one batch of events.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// A flush supersedes every per-file change in the batch.
    pub flush_all: bool,
    pub changed_files: BTreeSet<AssetFile>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ flush_all: {}, changed_files: {} }}",
            self.flush_all,
            self.changed_files.len()
        )
    }
}

impl InvalidationPlan {
    /// Deduplicate events by id and by file.
    pub fn from_events(events: Vec<AssetEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            match event.kind {
                EventKind::Changed(file) => {
                    plan.changed_files.insert(file);
                }
                EventKind::FlushAll => plan.flush_all = true,
            }
        }

        if plan.flush_all {
            plan.changed_files.clear();
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.flush_all && self.changed_files.is_empty()
    }
}
