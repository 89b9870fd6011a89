//! Prometheus metrics and structured logging for walletdash.
//!
//! - Prometheus metrics for wallet connectivity, dashboard fetches and cache use
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
