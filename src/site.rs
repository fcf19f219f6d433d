//! The routes served by the `trellis` binary.
//!
//! A home page rendered from `index.html` under the asset root, raw asset
//! files, a status endpoint answering with an AJAX continuation, and an
//! authenticated view of the asset link table.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tracing::info;

use crate::ajax::AjaxContinuation;
use crate::cache::{AssetContentCache, AssetFile, CacheConfig, CacheState, ChangeQueue, deps};
use crate::chain::{
    ActionCall, ActionError, ActionResult, BehaviorGraph, HandlerRegistry, ReturnKind, RouteTable,
};
use crate::config::Settings;
use crate::error::AppError;
use crate::infra::http::HttpState;
use crate::infra::watch::AssetWatcher;

const INDEX_TEMPLATE: &str = "index.html";
const DEFAULT_INDEX: &str = "<!doctype html><title>trellis</title><p>No index.html in the asset root.</p>";

pub fn actions() -> Vec<ActionCall> {
    vec![
        ActionCall::new("Site::get_index_html", ReturnKind::Text).at("/"),
        ActionCall::new("Assets::get_file", ReturnKind::Asset).at("/assets/*path"),
        ActionCall::new("Status::get_status", ReturnKind::AjaxContinuation).at("/_status"),
        ActionCall::new("Cache::get_links", ReturnKind::Json)
            .at("/_cache/links")
            .authenticated(),
    ]
}

pub fn graph() -> BehaviorGraph {
    BehaviorGraph::build(actions())
}

pub fn handlers(root: PathBuf, links: Arc<AssetContentCache>) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();

    let index_root = root.clone();
    handlers.register("Site::get_index_html", move |_| {
        match read_asset(&index_root, INDEX_TEMPLATE) {
            Ok(bytes) => Ok(ActionResult::Text(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            Err(ActionError::NotFound(_)) => {
                // Creating the template later must still invalidate the page.
                deps::record(AssetFile::new(INDEX_TEMPLATE));
                Ok(ActionResult::Text(DEFAULT_INDEX.to_string()))
            }
            Err(err) => Err(err),
        }
    });

    handlers.register("Assets::get_file", move |request| {
        let path = request.param("path").unwrap_or_default();
        let body = read_asset(&root, path)?;
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        Ok(ActionResult::Asset { content_type, body })
    });

    handlers.register("Status::get_status", |_| {
        Ok(ActionResult::Continuation(
            AjaxContinuation::successful().with_message("ok"),
        ))
    });

    handlers.register("Cache::get_links", move |_| {
        let files: Vec<_> = links
            .linked_files()
            .into_iter()
            .map(|file| {
                let resources: Vec<String> = links
                    .resources_for(&file)
                    .into_iter()
                    .map(|hash| hash.to_string())
                    .collect();
                json!({ "file": file.path(), "resources": resources })
            })
            .collect();
        Ok(ActionResult::Json(json!({ "files": files })))
    });

    handlers
}

/// Read `relative` under `root` and record it as a dependency of the
/// current render. Paths escaping the root read as missing.
pub fn read_asset(root: &Path, relative: &str) -> Result<Bytes, ActionError> {
    let relative = relative.trim_start_matches('/');
    let safe = !relative.is_empty()
        && !relative.ends_with('/')
        && Path::new(relative)
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !safe {
        return Err(ActionError::NotFound(relative.to_string()));
    }

    let bytes = std::fs::read(root.join(relative)).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ActionError::NotFound(relative.to_string()),
        _ => ActionError::Io(err),
    })?;
    deps::record(AssetFile::new(relative));
    Ok(Bytes::from(bytes))
}

/// Everything the server needs, assembled from settings.
pub struct Application {
    pub routes: Arc<RouteTable>,
    pub handlers: Arc<HandlerRegistry>,
    pub cache: CacheState,
    pub queue: Arc<ChangeQueue>,
    pub assets_root: PathBuf,
}

impl Application {
    pub fn build(settings: &Settings) -> Result<Self, AppError> {
        let routes = graph().finalize()?;
        let cache = CacheState::new(CacheConfig::from(&settings.cache));
        let handlers = handlers(settings.assets.root.clone(), Arc::clone(&cache.assets));

        info!(
            routes = routes.len(),
            assets_root = %settings.assets.root.display(),
            output_cache = cache.config.enable_output_cache,
            "Application assembled"
        );

        Ok(Self {
            routes: Arc::new(routes),
            handlers: Arc::new(handlers),
            cache,
            queue: Arc::new(ChangeQueue::new()),
            assets_root: settings.assets.root.clone(),
        })
    }

    pub fn http_state(&self) -> HttpState {
        HttpState {
            routes: Arc::clone(&self.routes),
            handlers: Arc::clone(&self.handlers),
            cache: self.cache.clone(),
        }
    }

    pub fn watcher(&self) -> AssetWatcher {
        AssetWatcher::new(self.assets_root.clone())
    }
}
