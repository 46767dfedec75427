//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! buffer, rollout and http subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a request
//! - Metrics are cheap (atomic increments), safe to record without an exporter

pub mod logging;
pub mod metrics;
