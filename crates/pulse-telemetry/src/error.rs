//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),

    #[error("Metrics encoding failed: {0}")]
    Encoding(#[from] prometheus::Error),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
