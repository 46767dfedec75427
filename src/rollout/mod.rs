//! Staged rollout subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     RolloutConfig { percentage, allowlist }
//!     → splitter.rs (precompute split threshold)
//!     → Arc<RolloutSplitter> shared by all handlers
//!
//! Per request:
//!     Cookie header
//!     → cookie.rs (extract `canary-rollout` value)
//!     → splitter.rs (allow-list, then hash.rs FNV-1a cut)
//!     → RolloutGroup::{Active, Canary}
//! ```
//!
//! # Design Decisions
//! - No server-side session table; stickiness comes from hashing the identifier
//! - Allow-list checked before the hash
//! - Immutable after construction, read without locks

pub mod cookie;
pub mod hash;
pub mod splitter;

pub use cookie::{rollout_identifier, ROLLOUT_COOKIE_NAME};
pub use splitter::{RolloutGroup, RolloutSplitter};
