//! Telemetry for the marketpulse feed client.
//!
//! Structured logging via `tracing` and Prometheus metrics for connection
//! state, frame counts, and protocol errors.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
