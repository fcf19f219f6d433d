//! Cache configuration.
//!
//! Controls the output cache, ETag handling and asset change polling via
//! `trellis.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve repeated GETs from the output cache.
    pub enable_output_cache: bool,
    /// Answer matching `If-None-Match` requests with 304.
    pub enable_etags: bool,
    /// Poll interval (ms) for asset modification times.
    pub watch_interval_ms: u64,
    /// Maximum change events applied per batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_output_cache: true,
            enable_etags: true,
            watch_interval_ms: DEFAULT_WATCH_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_output_cache: settings.enable_output_cache,
            enable_etags: settings.enable_etags,
            watch_interval_ms: settings.watch_interval.as_millis() as u64,
            consume_batch_limit: settings.consume_batch_limit.get(),
        }
    }
}

impl CacheConfig {
    /// ETags are only served alongside cached output.
    pub fn etags_active(&self) -> bool {
        self.enable_output_cache && self.enable_etags
    }

    /// Poll interval, clamped to at least one millisecond.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(1))
    }
}
