//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build server → Bind listener
//!
//! Shutdown:
//!     signals.rs (SIGINT/SIGTERM) → shutdown.rs broadcast → server drains → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
