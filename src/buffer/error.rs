//! Buffer error taxonomy.

use std::io;
use thiserror::Error;

/// Errors produced while filling or draining a [`SpillBuffer`](super::SpillBuffer).
#[derive(Debug, Error)]
pub enum BufferError {
    /// The write would push the buffer past `max_total_bytes`.
    ///
    /// Sticky: once returned, every later write on the same buffer fails the same way.
    #[error("maximum size exceeded")]
    MaximumSizeExceeded,

    /// A write arrived after the read phase began.
    #[error("write after read")]
    WriteAfterRead,

    /// The buffer was already released.
    #[error("buffer closed")]
    Closed,

    /// An earlier spill file error left the contents incomplete.
    #[error("buffer failed after a spill file error")]
    Failed,

    /// Creating, writing, rewinding or reading the spill file failed.
    #[error("spill file error: {0}")]
    SecondaryStore(#[source] io::Error),

    /// The source being drained into the buffer failed.
    #[error("source read error: {0}")]
    Source(#[source] io::Error),

    /// The destination of `send_all` refused the bytes.
    #[error("sink write error: {0}")]
    Sink(#[source] io::Error),
}

impl BufferError {
    /// Returns true for the size-ceiling condition.
    pub fn is_too_large(&self) -> bool {
        matches!(self, BufferError::MaximumSizeExceeded)
    }

    /// Recover a `BufferError` that travelled through `std::io::{Read, Write}`.
    ///
    /// Foreign I/O errors are classified as [`BufferError::Source`].
    pub fn from_io(err: io::Error) -> Self {
        let wrapped = err.get_ref().is_some_and(|inner| inner.is::<BufferError>());
        if !wrapped {
            return BufferError::Source(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<BufferError>()) {
            Some(Ok(inner)) => *inner,
            _ => BufferError::Source(io::Error::other("unrecognized buffer error")),
        }
    }
}

impl From<BufferError> for io::Error {
    fn from(err: BufferError) -> Self {
        let kind = match &err {
            BufferError::SecondaryStore(inner)
            | BufferError::Source(inner)
            | BufferError::Sink(inner) => inner.kind(),
            BufferError::Closed => io::ErrorKind::BrokenPipe,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
