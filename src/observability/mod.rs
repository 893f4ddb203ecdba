//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, per-connection spans)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (connection id, peer, method, uri) on every event
//! - Metrics go through the `metrics` facade; without an installed
//!   recorder every update is a no-op
//! - Neither layer holds global config; both are initialized once from
//!   `ObservabilityConfig`

pub mod logging;
pub mod metrics;
