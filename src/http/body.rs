//! Bridges between axum bodies and [`SpillBuffer`].
//!
//! # Responsibilities
//! - Drain a streaming body into a buffer, releasing it on any failure
//! - Replay a filled buffer as a streaming body
//!
//! # Design Decisions
//! - Buffer I/O is blocking and runs inline on the request task; a spill to a
//!   slow disk throttles only the request that caused it
//! - The replay body owns the buffer: end of stream closes it, and dropping an
//!   unconsumed body closes it through `SpillBuffer`'s drop

use std::io;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue};
use futures_util::{stream, StreamExt};

use crate::buffer::{BufferError, BufferLimits, SpillBuffer};

/// Size of the chunks a buffer is replayed in.
const REPLAY_CHUNK_SIZE: usize = 64 * 1024;

/// Drain `body` into a new buffer bounded by `limits`.
pub async fn buffer_body(body: Body, limits: BufferLimits) -> Result<SpillBuffer, BufferError> {
    let mut buffer = SpillBuffer::new(limits);
    let mut frames = body.into_data_stream();

    while let Some(frame) = frames.next().await {
        let result = match frame {
            Ok(chunk) => buffer.write_chunk(&chunk).map(|_| ()),
            Err(e) => Err(BufferError::Source(io::Error::other(e))),
        };

        if let Err(e) = result {
            buffer.close();
            return Err(e);
        }
    }

    Ok(buffer)
}

/// Stream the contents of `buffer` as a body.
pub fn replay_body(buffer: SpillBuffer) -> Body {
    let chunks = stream::unfold(Some(buffer), |state| async move {
        let mut buffer = state?;
        let mut chunk = vec![0u8; REPLAY_CHUNK_SIZE];

        match buffer.read_chunk(&mut chunk) {
            Ok(0) => {
                buffer.close();
                None
            }
            Ok(n) => {
                chunk.truncate(n);
                Some((Ok(Bytes::from(chunk)), Some(buffer)))
            }
            Err(e) => {
                tracing::error!(error = %e, "Buffer: replay failed");
                buffer.close();
                Some((Err(io::Error::from(e)), None))
            }
        }
    });

    Body::from_stream(chunks)
}

/// Replace framing headers so they describe a buffered body of `len` bytes.
pub fn set_buffered_length(headers: &mut HeaderMap, len: u64) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}

/// The `Content-Length` a message declares, if any.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
