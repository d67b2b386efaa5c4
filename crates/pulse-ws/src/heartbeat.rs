//! Heartbeat monitoring for the feed connection.
//!
//! Sends an application-level ping when the link has been quiet for a full
//! interval and treats a missing pong within the timeout as a dead
//! connection. Any inbound frame counts as liveness, so a busy feed never
//! pings at all.

use parking_lot::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct HeartbeatState {
    last_ping: Option<Instant>,
    last_activity: Instant,
    waiting_for_pong: bool,
}

/// Connection liveness tracker.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    state: RwLock<HeartbeatState>,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            state: RwLock::new(HeartbeatState {
                last_ping: None,
                last_activity: Instant::now(),
                waiting_for_pong: false,
            }),
        }
    }

    /// Reset state (called on every successful handshake).
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.last_ping = None;
        state.last_activity = Instant::now();
        state.waiting_for_pong = false;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&self) {
        let mut state = self.state.write();
        state.last_ping = Some(Instant::now());
        state.waiting_for_pong = true;
    }

    /// Record that a pong was received.
    pub fn record_pong(&self) {
        self.state.write().waiting_for_pong = false;
    }

    /// Record any inbound frame.
    pub fn record_activity(&self) {
        self.state.write().last_activity = Instant::now();
    }

    /// True when a sent ping has gone unanswered past the timeout.
    pub fn timed_out(&self) -> bool {
        let state = self.state.read();
        match (state.waiting_for_pong, state.last_ping) {
            (true, Some(sent)) => sent.elapsed() > self.timeout,
            _ => false,
        }
    }

    /// True when the link has been quiet long enough to warrant a ping.
    pub fn should_ping(&self) -> bool {
        let state = self.state.read();
        !state.waiting_for_pong && state.last_activity.elapsed() >= self.interval
    }

    /// How often the IO loop should run the heartbeat check.
    pub fn check_period(&self) -> Duration {
        // Half the interval keeps ping latency bounded without busy-waking.
        (self.interval / 2).max(Duration::from_millis(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(interval_ms: u64, timeout_ms: u64) -> Heartbeat {
        Heartbeat::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_initial_state() {
        let hb = heartbeat(30_000, 10_000);
        assert!(!hb.timed_out());
        assert!(!hb.should_ping());
    }

    #[test]
    fn test_ping_pong_round_trip() {
        let hb = heartbeat(30_000, 10_000);
        hb.record_ping();
        assert!(!hb.should_ping());
        hb.record_pong();
        assert!(!hb.timed_out());
    }

    #[test]
    fn test_quiet_link_wants_ping() {
        let hb = heartbeat(5, 10_000);
        std::thread::sleep(Duration::from_millis(20));
        assert!(hb.should_ping());
    }

    #[test]
    fn test_activity_defers_ping() {
        let hb = heartbeat(50, 10_000);
        std::thread::sleep(Duration::from_millis(20));
        hb.record_activity();
        assert!(!hb.should_ping());
    }

    #[test]
    fn test_missing_pong_times_out() {
        let hb = heartbeat(30_000, 5);
        hb.record_ping();
        std::thread::sleep(Duration::from_millis(20));
        assert!(hb.timed_out());
    }

    #[test]
    fn test_reset_clears_pending_ping() {
        let hb = heartbeat(30_000, 5);
        hb.record_ping();
        std::thread::sleep(Duration::from_millis(20));
        hb.reset();
        assert!(!hb.timed_out());
    }
}
