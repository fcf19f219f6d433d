//! Response header cache, keyed by resource hash.

use dashmap::DashMap;
use tracing::debug;

use super::keys::ResourceHash;
use super::output::ETAG;

pub type HeaderSet = Vec<(String, String)>;

/// Capability the asset content cache needs from a header store.
pub trait HeadersCache: Send + Sync {
    /// Drop the headers recorded for `key`. Absent keys are ignored.
    fn eject(&self, key: &ResourceHash);
}

/// Concurrent in-process header store.
#[derive(Default)]
pub struct InMemoryHeadersCache {
    entries: DashMap<ResourceHash, HeaderSet>,
}

impl InMemoryHeadersCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, key: ResourceHash, headers: HeaderSet) {
        self.entries.insert(key, headers);
    }

    pub fn headers(&self, key: &ResourceHash) -> Option<HeaderSet> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn etag(&self, key: &ResourceHash) -> Option<String> {
        self.entries.get(key).and_then(|entry| {
            entry
                .value()
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(ETAG))
                .map(|(_, value)| value.clone())
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl HeadersCache for InMemoryHeadersCache {
    fn eject(&self, key: &ResourceHash) {
        if self.entries.remove(key).is_some() {
            debug!(resource = %key, "ejected headers");
        }
    }
}
