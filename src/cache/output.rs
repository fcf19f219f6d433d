//! Output cache for rendered resources.
//!
//! Entries are created lazily by a supplier and live until they are ejected.
//! Each key owns a slot with its own lock, so concurrent first requests for
//! the same resource run the supplier once while other keys proceed freely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use metrics::counter;
use tracing::debug;

use super::keys::ResourceHash;
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::output";

pub const ETAG: &str = "etag";
pub const CONTENT_TYPE: &str = "content-type";

/// Captured response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutput {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Cleared for outputs that must be served once and never stored.
    pub cacheable: bool,
}

impl RecordedOutput {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            cacheable: true,
        }
    }

    /// A 200 response with the given content type and body.
    pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut output = Self::new(200);
        output.append_header(CONTENT_TYPE, content_type);
        output.body = body.into();
        output
    }

    pub fn append_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
    }

    /// First value recorded for `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn etag(&self) -> Option<&str> {
        self.header(ETAG)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }
}

type Slot = Arc<Mutex<Option<Arc<RecordedOutput>>>>;

/// Keyed store of recorded outputs with compute-once population.
#[derive(Default)]
pub struct OutputCache {
    slots: RwLock<HashMap<ResourceHash, Slot>>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached output for `key`, computing it with `supplier` on a miss.
    ///
    /// The supplier runs at most once per key between ejections. A supplier
    /// error or an output that is not cacheable is returned to the caller and
    /// nothing is stored, so the next call tries again.
    pub fn retrieve<F, E>(&self, key: &ResourceHash, supplier: F) -> Result<Arc<RecordedOutput>, E>
    where
        F: FnOnce() -> Result<RecordedOutput, E>,
    {
        if let Some(output) = self.get(key) {
            counter!("trellis_output_cache_hit_total").increment(1);
            return Ok(output);
        }

        let slot = self.slot_for(key);
        let mut guard = mutex_lock(&slot, SOURCE, "retrieve.slot");

        // Another caller may have filled the slot while we waited.
        if let Some(output) = guard.as_ref() {
            counter!("trellis_output_cache_hit_total").increment(1);
            return Ok(Arc::clone(output));
        }

        counter!("trellis_output_cache_miss_total").increment(1);
        debug!(resource = %key, outcome = "miss", "computing output");

        let output = match supplier() {
            Ok(output) if output.cacheable => Arc::new(output),
            Ok(output) => {
                drop(guard);
                self.release(key, &slot);
                debug!(resource = %key, "output not cacheable");
                return Ok(Arc::new(output));
            }
            Err(err) => {
                drop(guard);
                self.release(key, &slot);
                return Err(err);
            }
        };
        *guard = Some(Arc::clone(&output));
        Ok(output)
    }

    /// Peek at a cached output without computing it.
    pub fn get(&self, key: &ResourceHash) -> Option<Arc<RecordedOutput>> {
        let slot = rw_read(&self.slots, SOURCE, "get").get(key).cloned()?;
        // A slot being filled by another thread reads as absent.
        let guard = slot.try_lock().ok()?;
        guard.as_ref().map(Arc::clone)
    }

    /// Remove the entry for `key`. Absent keys are ignored.
    ///
    /// A supplier still running for the key finishes into a detached slot, so
    /// its result is never visible to later callers.
    pub fn eject(&self, key: &ResourceHash) {
        if rw_write(&self.slots, SOURCE, "eject").remove(key).is_some() {
            counter!("trellis_output_cache_eject_total").increment(1);
            debug!(resource = %key, "ejected output");
        }
    }

    pub fn flush_all(&self) {
        let mut slots = rw_write(&self.slots, SOURCE, "flush_all");
        let flushed = slots.len();
        slots.clear();
        debug!(flushed, "flushed output cache");
    }

    /// Number of keys with a slot, including slots still being computed.
    pub fn len(&self) -> usize {
        rw_read(&self.slots, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unmap `slot` if it is still the empty slot of `key`.
    ///
    /// A slot locked by another caller is left alone; that caller fills it.
    fn release(&self, key: &ResourceHash, slot: &Slot) {
        let mut slots = rw_write(&self.slots, SOURCE, "release");
        let unused = slots.get(key).is_some_and(|mapped| {
            Arc::ptr_eq(mapped, slot) && mapped.try_lock().is_ok_and(|guard| guard.is_none())
        });
        if unused {
            slots.remove(key);
        }
    }

    fn slot_for(&self, key: &ResourceHash) -> Slot {
        if let Some(slot) = rw_read(&self.slots, SOURCE, "slot_for.read").get(key) {
            return Arc::clone(slot);
        }
        let mut slots = rw_write(&self.slots, SOURCE, "slot_for.write");
        Arc::clone(slots.entry(key.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn output_with_etag(etag: &str) -> RecordedOutput {
        let mut output = RecordedOutput::new(200);
        output.append_header(ETAG, etag);
        output
    }

    fn never_called() -> Result<RecordedOutput, Infallible> {
        panic!("supplier must not run while a valid entry exists");
    }

    #[test]
    fn retrieve_computes_once_then_serves_the_stored_output() {
        let cache = OutputCache::new();
        let key = ResourceHash::from("abc");

        let first = cache
            .retrieve(&key, || Ok::<_, Infallible>(output_with_etag("\"1\"")))
            .unwrap();
        let second = cache.retrieve(&key, never_called).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.etag(), Some("\"1\""));
    }

    #[test]
    fn failing_supplier_stores_nothing() {
        let cache = OutputCache::new();
        let key = ResourceHash::from("broken");

        let result = cache.retrieve(&key, || Err::<RecordedOutput, _>("render failed"));
        assert_eq!(result.unwrap_err(), "render failed");
        assert!(cache.get(&key).is_none());

        let recovered = cache
            .retrieve(&key, || Ok::<_, &str>(output_with_etag("\"2\"")))
            .unwrap();
        assert_eq!(recovered.etag(), Some("\"2\""));
    }

    #[test]
    fn failed_retrievals_leave_no_slots_behind() {
        let cache = OutputCache::new();
        for n in 0..100 {
            let key = ResourceHash::new(format!("missing-{n}"));
            let result = cache.retrieve(&key, || Err::<RecordedOutput, _>("not found"));
            assert!(result.is_err());
        }
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn uncacheable_output_is_served_once_and_not_stored() {
        let cache = OutputCache::new();
        let key = ResourceHash::from("flaky");

        let mut failure = output_with_etag("\"failed\"");
        failure.cacheable = false;
        let served = cache
            .retrieve(&key, || Ok::<_, Infallible>(failure))
            .unwrap();
        assert_eq!(served.etag(), Some("\"failed\""));
        assert!(cache.is_empty());

        let recovered = cache
            .retrieve(&key, || Ok::<_, Infallible>(output_with_etag("\"ok\"")))
            .unwrap();
        assert_eq!(recovered.etag(), Some("\"ok\""));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eject_forces_recomputation() {
        let cache = OutputCache::new();
        let key = ResourceHash::from("k");

        cache
            .retrieve(&key, || Ok::<_, Infallible>(output_with_etag("\"a\"")))
            .unwrap();
        cache.eject(&key);
        cache.eject(&key);

        let fresh = cache
            .retrieve(&key, || Ok::<_, Infallible>(output_with_etag("\"b\"")))
            .unwrap();
        assert_eq!(fresh.etag(), Some("\"b\""));
    }

    #[test]
    fn flush_all_clears_every_entry() {
        let cache = OutputCache::new();
        for key in ["a", "b", "c"] {
            cache
                .retrieve(&ResourceHash::from(key), || {
                    Ok::<_, Infallible>(RecordedOutput::new(200))
                })
                .unwrap();
        }
        assert_eq!(cache.len(), 3);

        cache.flush_all();
        cache.flush_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_misses_collapse_to_one_supplier_call() {
        let cache = Arc::new(OutputCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let key = ResourceHash::from("shared");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .retrieve(&key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok::<_, Infallible>(output_with_etag("\"once\""))
                        })
                        .unwrap()
                })
            })
            .collect();

        let outputs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outputs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn ejecting_during_computation_does_not_resurrect_the_entry() {
        let cache = OutputCache::new();
        let key = ResourceHash::from("racy");

        let stale = cache
            .retrieve(&key, || {
                cache.eject(&key);
                Ok::<_, Infallible>(output_with_etag("\"stale\""))
            })
            .unwrap();
        assert_eq!(stale.etag(), Some("\"stale\""));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let output = RecordedOutput::ok("text/plain", "hi");
        assert_eq!(output.header("Content-Type"), Some("text/plain"));
        assert_eq!(output.body, Bytes::from("hi"));
    }
}
