//! Asset file watcher.
//!
//! Polls modification times under the asset root and publishes a change event
//! for every file that was modified, added or removed since the previous scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::{AssetFile, ChangeQueue, EventKind, InvalidationConsumer};

use super::error::InfraError;

pub struct AssetWatcher {
    root: PathBuf,
    seen: Option<HashMap<AssetFile, SystemTime>>,
}

impl AssetWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seen: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files changed since the previous scan, sorted by path.
    ///
    /// The first scan only records the current state. A missing root reads
    /// as an empty directory.
    pub fn scan(&mut self) -> Result<Vec<AssetFile>, InfraError> {
        let current = self.snapshot()?;
        let changed = match &self.seen {
            Some(previous) => diff(previous, &current),
            None => Vec::new(),
        };
        self.seen = Some(current);
        Ok(changed)
    }

    fn snapshot(&self) -> Result<HashMap<AssetFile, SystemTime>, InfraError> {
        let mut files = HashMap::new();
        if !self.root.exists() {
            debug!(root = %self.root.display(), "asset root does not exist");
            return Ok(files);
        }

        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|err| InfraError::asset_scan(&self.root, err))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file) = asset_file(&self.root, entry.path()) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .map_err(|err| InfraError::asset_scan(&self.root, err))?;
            files.insert(file, metadata.modified()?);
        }
        Ok(files)
    }
}

fn diff(
    previous: &HashMap<AssetFile, SystemTime>,
    current: &HashMap<AssetFile, SystemTime>,
) -> Vec<AssetFile> {
    let mut changed: Vec<AssetFile> = current
        .iter()
        .filter(|(file, modified)| previous.get(*file) != Some(*modified))
        .map(|(file, _)| file.clone())
        .collect();
    changed.extend(
        previous
            .keys()
            .filter(|file| !current.contains_key(*file))
            .cloned(),
    );
    changed.sort();
    changed
}

/// Identity of `path` as seen by the asset routes: relative to `root`,
/// `/`-separated.
pub fn asset_file(root: &Path, path: &Path) -> Option<AssetFile> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<_>>()?;
    (!parts.is_empty()).then(|| AssetFile::new(parts.join("/")))
}

/// Poll `watcher` every `interval`, publishing changes into `queue` and
/// applying them with `consumer`.
pub fn spawn(
    watcher: AssetWatcher,
    queue: Arc<ChangeQueue>,
    consumer: InvalidationConsumer,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        root = %watcher.root().display(),
        interval_ms = interval.as_millis() as u64,
        "Asset watcher started"
    );
    tokio::spawn(async move {
        let mut watcher = watcher;
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            let scanned = task::spawn_blocking(move || {
                let result = watcher.scan();
                (watcher, result)
            })
            .await;
            let result = match scanned {
                Ok((returned, result)) => {
                    watcher = returned;
                    result
                }
                Err(err) => {
                    let err = InfraError::from(err);
                    warn!(error = %err, "asset watcher stopped");
                    break;
                }
            };

            apply_scan(result, &queue, &consumer);
        }
    })
}

/// Publish the outcome of one scan and apply it.
///
/// A failed scan leaves the state of every file unknown, so the whole cache
/// is flushed.
fn apply_scan(
    result: Result<Vec<AssetFile>, InfraError>,
    queue: &ChangeQueue,
    consumer: &InvalidationConsumer,
) {
    match result {
        Ok(changed) => {
            for file in changed {
                queue.publish(EventKind::Changed(file));
            }
        }
        Err(err) => {
            warn!(error = %err, "asset scan failed, flushing caches");
            queue.publish(EventKind::FlushAll);
        }
    }
    consumer.consume_all();
}
