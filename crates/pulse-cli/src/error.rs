//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] Box<pulse_ws::WsError>),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pulse_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event stream closed")]
    EventStreamClosed,
}

pub type AppResult<T> = Result<T, AppError>;
