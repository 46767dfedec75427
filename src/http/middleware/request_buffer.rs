//! Request body buffering middleware.
//!
//! Reads the whole request body into a [`SpillBuffer`] before the proxy
//! handler runs, so the upstream never sees a slow or oversized upload.
//! A body over `max_total_bytes` is answered with 413; any other buffering
//! failure with 500.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::buffer::{BufferError, BufferLimits};
use crate::http::body::{buffer_body, declared_length, replay_body, set_buffered_length};
use crate::http::request::RequestIdExt;
use crate::observability::metrics;

pub async fn request_buffer_middleware(
    State(limits): State<Arc<BufferLimits>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let request_id = parts.headers.request_id().to_string();
    let path = parts.uri.path().to_string();
    let declared_framing = declared_length(&parts.headers).is_some()
        || parts.headers.contains_key(header::TRANSFER_ENCODING);

    // Reject a declared oversize body without reading it.
    if let Some(declared) = declared_length(&parts.headers) {
        if limits.max_total_bytes > 0 && declared > limits.max_total_bytes {
            return too_large(&request_id, &path, declared);
        }
    }

    match buffer_body(body, (*limits).clone()).await {
        Ok(buffer) => {
            tracing::debug!(
                request_id = %request_id,
                bytes = buffer.len(),
                spilled = buffer.is_spilled(),
                "Request body buffered"
            );
            if declared_framing || !buffer.is_empty() {
                set_buffered_length(&mut parts.headers, buffer.len());
            }

            // A bodiless request keeps its original (absent) framing.
            let body = if buffer.is_empty() {
                buffer.close();
                Body::empty()
            } else {
                replay_body(buffer)
            };
            next.run(Request::from_parts(parts, body)).await
        }
        Err(BufferError::MaximumSizeExceeded) => too_large(&request_id, &path, limits.max_total_bytes),
        Err(e) => {
            tracing::error!(request_id = %request_id, path = %path, error = %e, "Error buffering request");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn too_large(request_id: &str, path: &str, bytes: u64) -> Response {
    tracing::warn!(request_id = %request_id, path = %path, bytes, "Request too large");
    metrics::record_oversized("request");
    (StatusCode::PAYLOAD_TOO_LARGE, "Request too large").into_response()
}
