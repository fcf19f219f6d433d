//! Fallback handler routing every request through the behavior graph.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
        header::{ACCEPT, ALLOW, AUTHORIZATION, IF_NONE_MATCH},
    },
    response::{IntoResponse, Response},
};
use metrics::counter;
use tokio::task;
use tracing::{debug, instrument};

use crate::{
    cache::{ResourceHash, etag},
    chain::{ChainError, RequestContext, ReturnKind, invoke_with},
    error::HttpError,
};

use super::{
    HttpState,
    response::{build_response, not_modified},
};

const SOURCE: &str = "infra::http::dispatch";

#[instrument(skip_all, fields(method = %method, path = %uri.path()))]
pub(super) async fn dispatch(
    State(state): State<HttpState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match serve(&state, &method, &uri, &headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve(
    state: &HttpState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, HttpError> {
    if method != Method::GET && method != Method::HEAD {
        let mut response = HttpError::new(
            SOURCE,
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("`{method}` is not served by behavior chains"),
        )
        .into_response();
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
        return Ok(response);
    }

    let path = uri.path();
    let matched = state.routes.resolve(path).ok_or_else(|| {
        HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Resource not found",
            format!("no route for `{path}`"),
        )
    })?;

    let accept = header_str(headers, ACCEPT);
    let writer = matched
        .chain
        .output()
        .and_then(|output| output.negotiate(accept))
        .ok_or(ChainError::NotAcceptable)?;

    let request = RequestContext {
        path: path.to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        accept: accept.map(str::to_owned),
        authenticated: headers.contains_key(AUTHORIZATION),
        params: matched.params,
    };
    let head = method == Method::HEAD;
    let chain = matched.chain;
    let handlers = Arc::clone(&state.handlers);

    if !state.cache.config.enable_output_cache || chain.requires_authentication() {
        debug!(route = chain.route(), "bypassing output cache");
        let output = task::spawn_blocking(move || invoke_with(&chain, &handlers, &request, writer))
            .await
            .map_err(join_error)??;
        return Ok(build_response(&output, head));
    }

    // Asset content does not vary with the query string.
    let query = if chain.action().is_some_and(|action| action.returns() == ReturnKind::Asset) {
        ""
    } else {
        request.query.as_str()
    };
    let hash = ResourceHash::for_request(chain.route(), &request.path, query, writer);
    let if_none_match = header_str(headers, IF_NONE_MATCH);
    if let Some(tag) = state.cache.not_modified(&hash, if_none_match) {
        counter!("trellis_http_not_modified_total").increment(1);
        return Ok(not_modified(&tag));
    }

    let cache = state.cache.clone();
    let key = hash.clone();
    let output = task::spawn_blocking(move || {
        cache.render(&key, || invoke_with(&chain, &handlers, &request, writer))
    })
    .await
    .map_err(join_error)??;

    // The render may have produced the tag the client already holds.
    if state.cache.config.etags_active()
        && output.cacheable
        && let (Some(current), Some(if_none_match)) = (output.etag(), if_none_match)
        && etag::matches(if_none_match, current)
    {
        counter!("trellis_http_not_modified_total").increment(1);
        return Ok(not_modified(current));
    }

    debug!(resource = %hash, "serving output");
    Ok(build_response(&output, head))
}

fn header_str(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn join_error(err: task::JoinError) -> HttpError {
    HttpError::from_error(
        SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        &err,
    )
}
