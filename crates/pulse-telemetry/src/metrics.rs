//! Prometheus metrics for the feed client.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent
//! failure. These panics only occur during static initialization, never at
//! runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Encoder, Gauge,
    GaugeVec, TextEncoder,
};

use crate::error::TelemetryResult;

/// Feed connection state (1 = connected, 0 = disconnected).
pub static FEED_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pulse_feed_connected", "Feed connection state (1=connected)").unwrap()
});

/// Feed state machine current state.
/// Labels: state (disconnected/connecting/connected/backoff/exhausted)
pub static FEED_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_feed_state",
        "Feed state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static FEED_RECONNECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_feed_reconnects_total",
        "Total feed reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Inbound frames by kind.
pub static FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_frames_total",
        "Inbound frames processed",
        &["kind"]
    )
    .unwrap()
});

/// Dropped inbound frames by reason.
pub static FRAME_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_frame_errors_total",
        "Inbound frames dropped due to protocol errors",
        &["reason"]
    )
    .unwrap()
});

/// Server-reported errors.
pub static SERVER_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_server_errors_total",
        "Errors reported by the feed server",
        &["source"]
    )
    .unwrap()
});

const STATES: [&str; 5] = [
    "disconnected",
    "connecting",
    "connected",
    "backoff",
    "exhausted",
];

/// Set the state gauge so exactly one labelled state is active.
pub fn set_feed_state(active: &str) {
    for state in STATES {
        FEED_STATE
            .with_label_values(&[state])
            .set(if state == active { 1.0 } else { 0.0 });
    }
    FEED_CONNECTED.set(if active == "connected" { 1.0 } else { 0.0 });
}

/// Render all registered metrics in Prometheus text exposition format.
pub fn render() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_feed_state_is_exclusive() {
        set_feed_state("connected");
        assert_eq!(FEED_STATE.with_label_values(&["connected"]).get(), 1.0);
        assert_eq!(FEED_STATE.with_label_values(&["backoff"]).get(), 0.0);
        assert_eq!(FEED_CONNECTED.get(), 1.0);

        set_feed_state("backoff");
        assert_eq!(FEED_STATE.with_label_values(&["connected"]).get(), 0.0);
        assert_eq!(FEED_STATE.with_label_values(&["backoff"]).get(), 1.0);
        assert_eq!(FEED_CONNECTED.get(), 0.0);
    }

    #[test]
    fn test_render_includes_registered_metrics() {
        FRAMES_TOTAL.with_label_values(&["quote"]).inc();
        let text = render().unwrap();
        assert!(text.contains("pulse_frames_total"));
    }
}
