//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP dispatch, TCP relay, fleet reconfiguration:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms; Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Structured logging, JSON optional for machine parsing
//! - Request ID flows through HTTP spans and response headers
//! - Metrics are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
