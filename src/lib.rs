//! Traffic-admission core of an HTTP reverse proxy.
//!
//! - [`buffer`]: bounded memory/disk body buffering with single-pass replay
//! - [`rollout`]: deterministic, stateless canary split
//! - [`http`]: the axum pipeline driving both

pub mod buffer;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rollout;

pub use buffer::{BufferError, BufferLimits, SpillBuffer};
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rollout::RolloutSplitter;
