//! Asset content cache.
//!
//! Tracks which asset files every rendered resource was built from, and ejects
//! exactly the affected resources from the header and output caches when a
//! file changes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use metrics::counter;
use tracing::{debug, info};

use super::events::Epoch;
use super::headers::HeadersCache;
use super::keys::{AssetFile, ResourceHash};
use super::lock::{rw_read, rw_write};
use super::output::OutputCache;

const SOURCE: &str = "cache::asset";

/// Outcome of linking a freshly rendered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// None of the files changed while the resource rendered.
    Current,
    /// A file changed mid-render; the resource was ejected again.
    Stale,
}

#[derive(Default)]
struct LinkTable {
    file_to_hashes: HashMap<AssetFile, HashSet<ResourceHash>>,
    hash_to_files: HashMap<ResourceHash, HashSet<AssetFile>>,
    changed_at: HashMap<AssetFile, Epoch>,
    flushed_at: Epoch,
    epoch: Epoch,
}

impl LinkTable {
    fn link(&mut self, hash: &ResourceHash, files: &[AssetFile]) {
        let linked = self.hash_to_files.entry(hash.clone()).or_default();
        for file in files {
            linked.insert(file.clone());
            self.file_to_hashes
                .entry(file.clone())
                .or_default()
                .insert(hash.clone());
        }
    }

    /// Remove every link of `file`, returning the hashes it backed.
    ///
    /// A hash left without files is forgotten; its entries are ejected by the
    /// caller.
    fn unlink_file(&mut self, file: &AssetFile) -> HashSet<ResourceHash> {
        let affected = self.file_to_hashes.remove(file).unwrap_or_default();
        for hash in &affected {
            if let Some(files) = self.hash_to_files.get_mut(hash) {
                files.remove(file);
                if files.is_empty() {
                    self.hash_to_files.remove(hash);
                }
            }
        }
        affected
    }

    /// A flush counts as a change of every file.
    fn changed_since(&self, files: &[AssetFile], since: Epoch) -> bool {
        self.flushed_at > since
            || files
                .iter()
                .any(|file| self.changed_at.get(file).is_some_and(|at| *at > since))
    }
}

/// Many-to-many link table between asset files and cached resources.
pub struct AssetContentCache {
    headers: Arc<dyn HeadersCache>,
    output: Arc<OutputCache>,
    links: RwLock<LinkTable>,
}

impl AssetContentCache {
    pub fn new(headers: Arc<dyn HeadersCache>, output: Arc<OutputCache>) -> Self {
        Self {
            headers,
            output,
            links: RwLock::new(LinkTable::default()),
        }
    }

    /// Record that `hash` was rendered from each of `files`.
    ///
    /// Links accumulate across calls; earlier links of other hashes to the
    /// same files are kept.
    pub fn link_files_to_resource(&self, hash: &ResourceHash, files: &[AssetFile]) {
        rw_write(&self.links, SOURCE, "link_files_to_resource").link(hash, files);
    }

    /// Change counter to capture before rendering a resource.
    pub fn epoch(&self) -> Epoch {
        rw_read(&self.links, SOURCE, "epoch").epoch
    }

    /// Link a resource rendered after `since`, ejecting it if any of its files
    /// changed in the meantime.
    ///
    /// The resource is linked either way, so later changes still reach it.
    pub fn link_files_since(
        &self,
        hash: &ResourceHash,
        files: &[AssetFile],
        since: Epoch,
    ) -> Freshness {
        let mut links = rw_write(&self.links, SOURCE, "link_files_since");
        links.link(hash, files);
        if links.changed_since(files, since) {
            debug!(resource = %hash, since, "file changed during render");
            self.eject(hash);
            return Freshness::Stale;
        }
        Freshness::Current
    }

    /// Invalidate every resource linked to `file` and forget its links.
    ///
    /// Returns the number of resources ejected. Unknown files are a no-op.
    pub fn changed(&self, file: &AssetFile) -> usize {
        let mut links = rw_write(&self.links, SOURCE, "changed");
        links.epoch += 1;
        let epoch = links.epoch;
        links.changed_at.insert(file.clone(), epoch);

        let affected = links.unlink_file(file);
        for hash in &affected {
            self.eject(hash);
        }

        if !affected.is_empty() {
            counter!("trellis_asset_invalidations_total").increment(affected.len() as u64);
            info!(
                file = %file,
                ejected = affected.len(),
                epoch,
                "Asset change invalidated cached resources"
            );
        }
        affected.len()
    }

    /// Eject every linked resource's headers and clear the output cache.
    ///
    /// Links are kept: the files behind them did not change. Resources still
    /// rendering when the flush happens come back stale from
    /// [`link_files_since`](Self::link_files_since).
    pub fn flush_all(&self) {
        let mut links = rw_write(&self.links, SOURCE, "flush_all");
        links.epoch += 1;
        links.flushed_at = links.epoch;
        for hash in links.hash_to_files.keys() {
            self.headers.eject(hash);
        }
        self.output.flush_all();
        info!(
            resources = links.hash_to_files.len(),
            "Flushed asset content cache"
        );
    }

    /// Files that currently back at least one resource.
    pub fn linked_files(&self) -> Vec<AssetFile> {
        let mut files: Vec<_> = rw_read(&self.links, SOURCE, "linked_files")
            .file_to_hashes
            .keys()
            .cloned()
            .collect();
        files.sort();
        files
    }

    pub fn files_for(&self, hash: &ResourceHash) -> HashSet<AssetFile> {
        rw_read(&self.links, SOURCE, "files_for")
            .hash_to_files
            .get(hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of resources with at least one recorded link.
    pub fn resource_count(&self) -> usize {
        rw_read(&self.links, SOURCE, "resource_count")
            .hash_to_files
            .len()
    }

    pub fn resources_for(&self, file: &AssetFile) -> HashSet<ResourceHash> {
        rw_read(&self.links, SOURCE, "resources_for")
            .file_to_hashes
            .get(file)
            .cloned()
            .unwrap_or_default()
    }

    fn eject(&self, hash: &ResourceHash) {
        self.headers.eject(hash);
        self.output.eject(hash);
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Mutex;

    use super::*;
    use crate::cache::output::{ETAG, RecordedOutput};

    #[derive(Default)]
    struct RecordingHeaders {
        ejected: Mutex<Vec<ResourceHash>>,
    }

    impl RecordingHeaders {
        fn count(&self, hash: &str) -> usize {
            self.ejected
                .lock()
                .unwrap()
                .iter()
                .filter(|h| h.as_str() == hash)
                .count()
        }
    }

    impl HeadersCache for RecordingHeaders {
        fn eject(&self, key: &ResourceHash) {
            self.ejected.lock().unwrap().push(key.clone());
        }
    }

    fn files(names: &[&str]) -> Vec<AssetFile> {
        names.iter().copied().map(AssetFile::from).collect()
    }

    fn setup() -> (Arc<RecordingHeaders>, Arc<OutputCache>, AssetContentCache) {
        let headers = Arc::new(RecordingHeaders::default());
        let output = Arc::new(OutputCache::new());
        let cache = AssetContentCache::new(headers.clone(), Arc::clone(&output));
        (headers, output, cache)
    }

    fn store(output: &OutputCache, hash: &str, etag: &str) -> Arc<RecordedOutput> {
        let mut recorded = RecordedOutput::new(200);
        recorded.append_header(ETAG, etag);
        output
            .retrieve(&ResourceHash::from(hash), || Ok::<_, Infallible>(recorded))
            .unwrap()
    }

    #[test]
    fn changed_ejects_only_resources_linked_to_the_file() {
        let (headers, output, cache) = setup();
        cache.link_files_to_resource(&"12345".into(), &files(&["1", "2", "3"]));
        cache.link_files_to_resource(&"23456".into(), &files(&["2", "3", "4"]));
        store(&output, "12345", "\"a1\"");
        store(&output, "23456", "\"a2\"");

        assert_eq!(cache.changed(&"1".into()), 1);

        assert_eq!(headers.count("12345"), 1);
        assert_eq!(headers.count("23456"), 0);
        assert!(output.get(&"12345".into()).is_none());
        assert!(output.get(&"23456".into()).is_some());
    }

    #[test]
    fn changed_removes_the_links_of_the_file() {
        let (headers, _output, cache) = setup();
        cache.link_files_to_resource(&"h1".into(), &files(&["a", "b"]));

        cache.changed(&"a".into());
        assert!(cache.resources_for(&"a".into()).is_empty());
        assert_eq!(
            cache.files_for(&"h1".into()),
            files(&["b"]).into_iter().collect::<HashSet<_>>()
        );

        assert_eq!(cache.changed(&"a".into()), 0);
        assert_eq!(headers.count("h1"), 1);
    }

    #[test]
    fn resources_left_without_files_are_forgotten() {
        let (_headers, _output, cache) = setup();
        for n in 0..50 {
            let hash = ResourceHash::new(format!("page-{n}"));
            cache.link_files_to_resource(&hash, &files(&["site.css"]));
        }
        cache.link_files_to_resource(&"both".into(), &files(&["site.css", "app.js"]));
        assert_eq!(cache.resource_count(), 51);

        assert_eq!(cache.changed(&"site.css".into()), 51);

        assert_eq!(cache.resource_count(), 1);
        assert!(cache.files_for(&"page-0".into()).is_empty());
        assert_eq!(cache.linked_files(), files(&["app.js"]));
    }

    #[test]
    fn changed_on_unknown_file_is_a_no_op() {
        let (headers, _output, cache) = setup();
        assert_eq!(cache.changed(&"missing".into()), 0);
        assert!(headers.ejected.lock().unwrap().is_empty());
    }

    #[test]
    fn links_accumulate_across_calls() {
        let (_headers, _output, cache) = setup();
        cache.link_files_to_resource(&"h1".into(), &files(&["a"]));
        cache.link_files_to_resource(&"h1".into(), &files(&["b"]));
        cache.link_files_to_resource(&"h2".into(), &files(&["a"]));

        assert_eq!(cache.files_for(&"h1".into()).len(), 2);
        assert_eq!(cache.resources_for(&"a".into()).len(), 2);
        assert_eq!(cache.linked_files(), files(&["a", "b"]));
    }

    #[test]
    fn flush_all_keeps_links_and_is_idempotent() {
        let (headers, output, cache) = setup();
        cache.link_files_to_resource(&"h1".into(), &files(&["a"]));
        store(&output, "h1", "\"x\"");

        cache.flush_all();
        cache.flush_all();

        assert_eq!(headers.count("h1"), 2);
        assert!(output.is_empty());
        assert_eq!(cache.resources_for(&"a".into()).len(), 1);
    }

    #[test]
    fn link_since_detects_a_change_during_render() {
        let (headers, output, cache) = setup();
        let hash = ResourceHash::from("page");
        let started = cache.epoch();

        let rendered = output
            .retrieve(&hash, || {
                cache.changed(&"site.css".into());
                let freshness = cache.link_files_since(&hash, &files(&["site.css"]), started);
                assert_eq!(freshness, Freshness::Stale);
                Ok::<_, Infallible>(RecordedOutput::new(200))
            })
            .unwrap();

        assert_eq!(rendered.status, 200);
        assert!(output.get(&hash).is_none());
        assert_eq!(headers.count("page"), 1);
        assert_eq!(cache.resources_for(&"site.css".into()).len(), 1);
    }

    #[test]
    fn link_since_treats_a_flush_as_a_change() {
        let (headers, output, cache) = setup();
        let hash = ResourceHash::from("page");
        let started = cache.epoch();

        output
            .retrieve(&hash, || {
                cache.flush_all();
                let freshness = cache.link_files_since(&hash, &files(&["site.css"]), started);
                assert_eq!(freshness, Freshness::Stale);
                Ok::<_, Infallible>(RecordedOutput::new(200))
            })
            .unwrap();

        assert!(output.get(&hash).is_none());
        assert_eq!(headers.count("page"), 1);

        let later = cache.epoch();
        let freshness = cache.link_files_since(&hash, &files(&["site.css"]), later);
        assert_eq!(freshness, Freshness::Current);
    }

    #[test]
    fn link_since_is_current_without_changes() {
        let (_headers, _output, cache) = setup();
        cache.changed(&"old.css".into());
        let started = cache.epoch();

        let freshness = cache.link_files_since(&"page".into(), &files(&["old.css"]), started);
        assert_eq!(freshness, Freshness::Current);
    }
}
