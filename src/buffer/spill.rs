//! Two-tier write-once/read-once byte buffer.
//!
//! # State Machine
//! ```text
//! Writing ──first read / send_all──▶ Reading
//!    │  │                               │
//!    │  └── spill file error ──▶ Failed │
//!    │                            │     │
//!    └────────────── close ───────┴─────┴──▶ Closed
//! ```
//!
//! Writes fill the memory tier up to `max_memory_bytes`; the first byte past
//! that threshold creates a spill file and every later byte goes to disk.
//! Reading replays the memory tier followed by the rewound spill file.
//!
//! Overflowing `max_total_bytes` sets a sticky flag that survives every later
//! transition. The ceiling check is all-or-nothing per write call. A spill
//! file error during a write is sticky too: the buffer moves to `Failed`,
//! drops its spill file and refuses further writes and reads.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::buffer::error::BufferError;
use crate::buffer::store::SpillFile;

/// Chunk size used when draining a source or replaying the disk tier.
const COPY_CHUNK_SIZE: usize = 32 * 1024;

/// Size limits for one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLimits {
    /// Hard ceiling on bytes ever written. `0` means unlimited.
    pub max_total_bytes: u64,
    /// Bytes kept in memory before spilling to disk.
    pub max_memory_bytes: u64,
    /// Directory for spill files. `None` uses the OS temp directory.
    pub spill_dir: Option<PathBuf>,
}

impl BufferLimits {
    pub fn new(max_total_bytes: u64, max_memory_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            max_memory_bytes,
            spill_dir: None,
        }
    }

    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    fn exceeds_ceiling(&self, total: u64) -> bool {
        self.max_total_bytes > 0 && total > self.max_total_bytes
    }
}

/// Lifecycle phase of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Writing,
    Reading,
    /// A spill file error left the contents incomplete.
    Failed,
    Closed,
}

/// Phase and disk tier, guarded together so release can run through a
/// shared reference.
#[derive(Debug)]
struct State {
    phase: Phase,
    spill: Option<SpillFile>,
}

impl State {
    fn spill_len(&self) -> u64 {
        self.spill.as_ref().map_or(0, SpillFile::len)
    }

    /// Append to the spill file, creating it on first use.
    fn append(&mut self, bytes: &[u8], dir: Option<&Path>) -> io::Result<()> {
        if self.spill.is_none() {
            self.spill = Some(SpillFile::create(dir)?);
        }
        match &mut self.spill {
            Some(file) => file.append(bytes),
            None => Ok(()),
        }
    }

    /// Enter `phase` and remove the spill file, if any.
    fn release(&mut self, phase: Phase) {
        self.phase = phase;
        if let Some(file) = self.spill.take() {
            file.remove();
        }
    }
}

/// A body buffer that holds up to `max_memory_bytes` in memory and spills the
/// rest to a temporary file.
///
/// Implements [`Read`] and [`Write`]. Errors crossing those traits carry the
/// original [`BufferError`], recoverable with [`BufferError::from_io`].
///
/// The spill file is removed by [`SpillBuffer::close`], which is idempotent,
/// and again on drop, so an owner that forgets to close still cleans up.
#[derive(Debug)]
pub struct SpillBuffer {
    limits: BufferLimits,
    memory: Vec<u8>,
    state: Mutex<State>,
    /// Replay position inside `memory` once reading.
    memory_pos: usize,
    overflowed: bool,
}

impl SpillBuffer {
    /// Create an empty buffer in the writing phase.
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            limits,
            memory: Vec::new(),
            state: Mutex::new(State {
                phase: Phase::Writing,
                spill: None,
            }),
            memory_pos: 0,
            overflowed: false,
        }
    }

    /// Drain `source` into a new buffer and hand it back ready for reading.
    ///
    /// On failure the buffer is released here; the caller never receives a
    /// half-filled buffer to clean up.
    pub fn from_reader<R: Read>(mut source: R, limits: BufferLimits) -> Result<Self, BufferError> {
        let mut buffer = Self::new(limits);
        let mut chunk = vec![0u8; COPY_CHUNK_SIZE];

        loop {
            let n = match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    buffer.close();
                    return Err(BufferError::Source(e));
                }
            };

            if let Err(e) = buffer.write_chunk(&chunk[..n]) {
                buffer.close();
                return Err(e);
            }
        }

        Ok(buffer)
    }

    /// Append `bytes`, spilling to disk once the memory tier is full.
    ///
    /// Returns the number of bytes accepted, which is always `bytes.len()` on
    /// success. A failed write commits nothing.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<usize, BufferError> {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        match state.phase {
            Phase::Writing => {}
            Phase::Reading => return Err(BufferError::WriteAfterRead),
            Phase::Failed => return Err(BufferError::Failed),
            Phase::Closed => return Err(BufferError::Closed),
        }
        if self.overflowed {
            return Err(BufferError::MaximumSizeExceeded);
        }

        let length = bytes.len() as u64;
        let total = self.memory.len() as u64 + state.spill_len();
        if self.limits.exceeds_ceiling(total + length) {
            self.overflowed = true;
            tracing::debug!(
                written = total,
                attempted = length,
                max_total_bytes = self.limits.max_total_bytes,
                "Buffer: maximum size exceeded"
            );
            return Err(BufferError::MaximumSizeExceeded);
        }

        let room = self.limits.max_memory_bytes.saturating_sub(self.memory.len() as u64);
        let in_memory = room.min(length) as usize;
        let (memory_part, disk_part) = bytes.split_at(in_memory);

        // Disk first: the memory tier only grows once the whole write is stored.
        if !disk_part.is_empty() {
            if let Err(e) = state.append(disk_part, self.limits.spill_dir.as_deref()) {
                tracing::warn!(error = %e, "Buffer: spill write failed, buffer unusable");
                state.release(Phase::Failed);
                return Err(BufferError::SecondaryStore(e));
            }
        }

        self.memory.extend_from_slice(memory_part);
        Ok(bytes.len())
    }

    /// Read the next bytes of the composed memory-then-disk stream.
    ///
    /// The first call ends the writing phase and rewinds the spill file.
    /// Returns `Ok(0)` at end of stream.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, BufferError> {
        self.begin_reading()?;

        let remaining = &self.memory[self.memory_pos..];
        if !remaining.is_empty() {
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.memory_pos += n;
            return Ok(n);
        }

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        match &mut state.spill {
            Some(file) => file.read(buf).map_err(BufferError::SecondaryStore),
            None => Ok(0),
        }
    }

    /// Copy everything not yet read into `sink`, returning the byte count.
    pub fn send_all<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64, BufferError> {
        self.begin_reading()?;

        let remaining = &self.memory[self.memory_pos..];
        sink.write_all(remaining).map_err(BufferError::Sink)?;
        let mut sent = remaining.len() as u64;
        self.memory_pos = self.memory.len();

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = &mut state.spill {
            let mut chunk = vec![0u8; COPY_CHUNK_SIZE];
            loop {
                let n = match file.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(BufferError::SecondaryStore(e)),
                };
                sink.write_all(&chunk[..n]).map_err(BufferError::Sink)?;
                sent += n as u64;
            }
        }

        sink.flush().map_err(BufferError::Sink)?;
        Ok(sent)
    }

    /// Whether a write has ever hit the size ceiling.
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Release the spill file. Safe to call any number of times, from any thread
    /// holding a shared reference; only the first call removes the file.
    pub fn close(&self) {
        let mut state = self.lock_state();
        if state.phase != Phase::Closed {
            state.release(Phase::Closed);
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock_state().phase
    }

    /// Total bytes accepted across both tiers.
    pub fn len(&self) -> u64 {
        self.memory.len() as u64 + self.disk_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_len(&self) -> u64 {
        self.memory.len() as u64
    }

    pub fn disk_len(&self) -> u64 {
        self.lock_state().spill_len()
    }

    /// Whether any byte went to disk.
    pub fn is_spilled(&self) -> bool {
        self.lock_state().spill.is_some()
    }

    /// Location of the spill file while it exists.
    pub fn spill_path(&self) -> Option<PathBuf> {
        self.lock_state()
            .spill
            .as_ref()
            .map(|file| file.path().to_path_buf())
    }

    pub fn limits(&self) -> &BufferLimits {
        &self.limits
    }

    /// Directory spill files are created in, if overridden.
    pub fn spill_dir(&self) -> Option<&Path> {
        self.limits.spill_dir.as_deref()
    }

    fn begin_reading(&mut self) -> Result<(), BufferError> {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        match state.phase {
            Phase::Reading => Ok(()),
            Phase::Failed => Err(BufferError::Failed),
            Phase::Closed => Err(BufferError::Closed),
            Phase::Writing => {
                if let Some(file) = &mut state.spill {
                    file.rewind().map_err(BufferError::SecondaryStore)?;
                }
                state.phase = Phase::Reading;
                Ok(())
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SpillBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(io::Error::from)
    }
}

impl Drop for SpillBuffer {
    fn drop(&mut self) {
        self.close();
    }
}
