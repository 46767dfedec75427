//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout; `/up` answered here)
//!     → middleware/request_buffer.rs (body → SpillBuffer, 413 on overflow)
//!     → server.rs proxy handler (rollout split, forward upstream)
//!     → body.rs (optional response buffering, replay)
//!     → Send to client
//! ```

pub mod body;
pub mod middleware;
pub mod request;
pub mod server;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
