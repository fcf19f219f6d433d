use axum::{
    body::Body,
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_LENGTH, ETAG},
    },
    response::{IntoResponse, Response},
};

use crate::cache::RecordedOutput;

/// Replay a recorded output. `HEAD` responses keep the headers and drop the body.
pub(super) fn build_response(output: &RecordedOutput, head: bool) -> Response {
    let mut builder = Response::builder().status(output.status);

    for (name, value) in &output.headers {
        if let Ok(header_value) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), header_value);
        }
    }
    builder = builder.header(CONTENT_LENGTH, output.body.len());

    let body = if head {
        Body::empty()
    } else {
        Body::from(output.body.clone())
    };

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub(super) fn not_modified(etag: &str) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    if let Ok(value) = HeaderValue::from_str(etag) {
        response.headers_mut().insert(ETAG, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CONTENT_TYPE;

    #[test]
    fn replays_status_headers_and_body() {
        let mut output = RecordedOutput::ok("text/plain", "hello");
        output.append_header("etag", "\"abc\"");

        let response = build_response(&output, false);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[ETAG], "\"abc\"");
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
    }

    #[test]
    fn not_modified_carries_the_etag() {
        let response = not_modified("\"abc\"");
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[ETAG], "\"abc\"");
    }
}
