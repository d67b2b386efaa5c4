//! WebSocket client error types.

use crate::state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connect timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Connect already in progress")]
    ConnectInProgress,

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
