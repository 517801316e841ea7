//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher, admission, credential cache, transport
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Request ID (uuid v4) travels in every per-call log event
//! - Metrics are cheap atomic updates behind the `metrics` facade

pub mod logging;
pub mod metrics;
