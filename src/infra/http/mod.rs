mod dispatch;
mod middleware;
mod response;

use std::sync::Arc;

use axum::Router;

use crate::cache::CacheState;
use crate::chain::{HandlerRegistry, RouteTable};

pub use middleware::{REQUEST_ID_HEADER, RequestId};

#[derive(Clone)]
pub struct HttpState {
    pub routes: Arc<RouteTable>,
    pub handlers: Arc<HandlerRegistry>,
    pub cache: CacheState,
}

/// Every request is resolved against the route table by a single fallback.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .fallback(dispatch::dispatch)
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::log_responses))
        .layer(axum::middleware::from_fn(middleware::set_request_id))
}
