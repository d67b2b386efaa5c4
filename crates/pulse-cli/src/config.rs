//! Application configuration.
//!
//! Loaded from a TOML file with `PULSE_`-prefixed environment overrides
//! (nested keys separated by `__`, e.g. `PULSE_WEBSOCKET__MAX_FRAME_BYTES`).

use crate::error::{AppError, AppResult};
use pulse_ws::FeedConfig;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket endpoint URL.
    pub ws_url: String,
    /// Symbols subscribed at startup.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Also subscribe each symbol to the candles channel.
    #[serde(default = "default_subscribe_candles")]
    pub subscribe_candles: bool,
    /// Quote age threshold for the periodic staleness report (ms).
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    /// Status report interval (seconds).
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// WebSocket client tuning.
    #[serde(default)]
    pub websocket: WsConfig,
}

fn default_subscribe_candles() -> bool {
    true
}

fn default_stale_after_ms() -> u64 {
    5_000
}

fn default_report_interval_secs() -> u64 {
    30
}

/// WebSocket client tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Handshake timeout (ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Quiet-link interval before a ping is sent (ms).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this after a ping (ms).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Reconnect attempt ceiling (0 = unlimited).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Ceiling for a single backoff delay (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Maximum serialized outbound frame size (bytes).
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Capacity of the offline outbound queue.
    #[serde(default = "default_outbound_queue_limit")]
    pub outbound_queue_limit: usize,
    /// Event broadcast channel capacity.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

fn default_outbound_queue_limit() -> usize {
    256
}

fn default_event_capacity() -> usize {
    1_024
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_queue_limit: default_outbound_queue_limit(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file, with environment overrides applied.
    pub fn load(path: &str) -> AppResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(
                ::config::Environment::with_prefix("PULSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(AppError::Config(format!(
                "ws_url must be a ws:// or wss:// URL, got '{}'",
                self.ws_url
            )));
        }
        if self.report_interval_secs == 0 {
            return Err(AppError::Config(
                "report_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Client configuration derived from this application config.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            url: self.ws_url.clone(),
            connect_timeout_ms: self.websocket.connect_timeout_ms,
            heartbeat_interval_ms: self.websocket.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.websocket.heartbeat_timeout_ms,
            max_reconnect_attempts: self.websocket.max_reconnect_attempts,
            reconnect_base_delay_ms: self.websocket.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.websocket.reconnect_max_delay_ms,
            max_frame_bytes: self.websocket.max_frame_bytes,
            outbound_queue_limit: self.websocket.outbound_queue_limit,
            event_capacity: self.websocket.event_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp_config(name: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pulse-test-{}-{}.toml", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let path = write_temp_config("minimal", r#"ws_url = "wss://feed.example.com/stream""#);
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.ws_url, "wss://feed.example.com/stream");
        assert!(config.symbols.is_empty());
        assert!(config.subscribe_candles);
        assert_eq!(config.websocket.max_reconnect_attempts, 10);
        assert_eq!(config.websocket.reconnect_base_delay_ms, 1_000);
    }

    #[test]
    fn test_load_full_config() {
        let path = write_temp_config(
            "full",
            r#"
ws_url = "ws://127.0.0.1:9000"
symbols = ["AAPL", "MSFT"]
subscribe_candles = false
stale_after_ms = 2000

[websocket]
max_reconnect_attempts = 3
reconnect_base_delay_ms = 250
"#,
        );
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.symbols, vec!["AAPL", "MSFT"]);
        assert!(!config.subscribe_candles);
        assert_eq!(config.stale_after_ms, 2_000);

        let feed = config.feed_config();
        assert_eq!(feed.url, "ws://127.0.0.1:9000");
        assert_eq!(feed.max_reconnect_attempts, 3);
        assert_eq!(feed.reconnect_base_delay_ms, 250);
        // Untouched knobs fall back to defaults.
        assert_eq!(feed.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_non_ws_url() {
        let path = write_temp_config("badurl", r#"ws_url = "https://example.com""#);
        let err = AppConfig::load(path.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load("/nonexistent/pulse.toml").is_err());
    }
}
