//! Trellis cache system
//!
//! Caches rendered output per resource hash and invalidates it precisely when
//! the asset files it was built from change:
//!
//! - **Output cache**: recorded responses, computed once per key
//! - **Headers cache**: response headers (ETags) per key
//! - **Asset content cache**: file <-> resource links driving ejection
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_output_cache = true
//! enable_etags = true
//! watch_interval_ms = 1000
//! consume_batch_limit = 100
//! ```

mod asset;
mod config;
mod consumer;
pub mod deps;
pub mod etag;
mod events;
mod headers;
mod keys;
mod lock;
mod output;
mod planner;
mod state;

pub use asset::{AssetContentCache, Freshness};
pub use config::CacheConfig;
pub use consumer::InvalidationConsumer;
pub use events::{AssetEvent, ChangeQueue, Epoch, EventKind};
pub use headers::{HeaderSet, HeadersCache, InMemoryHeadersCache};
pub use keys::{AssetFile, ResourceHash};
pub use output::{CONTENT_TYPE, ETAG, OutputCache, RecordedOutput};
pub use planner::InvalidationPlan;
pub use state::CacheState;
