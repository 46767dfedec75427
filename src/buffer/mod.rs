//! Body buffering subsystem.
//!
//! # Data Flow
//! ```text
//! request/response body chunks
//!     → spill.rs (SpillBuffer::write_chunk)
//!         → memory tier until max_memory_bytes
//!         → store.rs (SpillFile) for the remainder
//!     → ceiling check against max_total_bytes (sticky overflow)
//!
//! Replay:
//!     memory tier ++ rewound spill file
//!     → read_chunk / send_all (single pass)
//!     → close() removes the spill file exactly once
//! ```
//!
//! # Design Decisions
//! - Blocking std::io; a slow disk throttles only the request that spilled
//! - One buffer per body, never shared between requests
//! - Release is idempotent and also runs on drop

pub mod error;
pub mod spill;
pub mod store;

pub use error::BufferError;
pub use spill::{BufferLimits, Phase, SpillBuffer};
pub use store::SpillFile;
