//! Shared cache state for the HTTP layer.

use std::sync::Arc;

use tracing::debug;

use super::asset::{AssetContentCache, Freshness};
use super::config::CacheConfig;
use super::consumer::InvalidationConsumer;
use super::events::ChangeQueue;
use super::headers::InMemoryHeadersCache;
use super::keys::ResourceHash;
use super::output::{OutputCache, RecordedOutput};
use super::{deps, etag};

/// The three caches wired together, plus their configuration.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub output: Arc<OutputCache>,
    pub headers: Arc<InMemoryHeadersCache>,
    pub assets: Arc<AssetContentCache>,
}

impl CacheState {
    pub fn new(config: CacheConfig) -> Self {
        let output = Arc::new(OutputCache::new());
        let headers = Arc::new(InMemoryHeadersCache::new());
        let assets = Arc::new(AssetContentCache::new(
            Arc::clone(&headers) as _,
            Arc::clone(&output),
        ));
        Self {
            config,
            output,
            headers,
            assets,
        }
    }

    /// Consumer applying `queue` to this state's asset content cache.
    pub fn consumer(&self, queue: Arc<ChangeQueue>) -> InvalidationConsumer {
        InvalidationConsumer::new(
            Arc::clone(&self.assets),
            queue,
            self.config.consume_batch_limit,
        )
    }

    /// Serve `hash` from the output cache, rendering it on a miss.
    ///
    /// Files recorded through [`deps::record`] while rendering are linked to
    /// the hash and the output's headers are stored for conditional requests.
    /// A file that changes mid-render ejects the fresh entry right away.
    /// Outputs that are not cacheable are returned without touching any cache.
    pub fn render<F, E>(&self, hash: &ResourceHash, render: F) -> Result<Arc<RecordedOutput>, E>
    where
        F: FnOnce() -> Result<RecordedOutput, E>,
    {
        self.output.retrieve(hash, || {
            let since = self.assets.epoch();
            let (result, files) = deps::collect(render);
            let output = result?;
            if !output.cacheable {
                return Ok(output);
            }

            self.headers.store(hash.clone(), output.headers.clone());
            if self.assets.link_files_since(hash, &files, since) == Freshness::Stale {
                debug!(resource = %hash, "rendered output went stale before it was cached");
            }
            Ok(output)
        })
    }

    /// The current ETag of `hash` when it satisfies `If-None-Match`.
    pub fn not_modified(&self, hash: &ResourceHash, if_none_match: Option<&str>) -> Option<String> {
        if !self.config.etags_active() {
            return None;
        }
        let if_none_match = if_none_match?;
        let current = self.headers.etag(hash)?;
        etag::matches(if_none_match, &current).then_some(current)
    }
}
