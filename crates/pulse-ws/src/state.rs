//! Connection state machine.
//!
//! All lifecycle transitions go through [`StateMachine::apply`], the single
//! authoritative transition function. Timer scheduling is derived from the
//! returned state, so overlapping backoff timers and duplicate reconnect
//! attempts are unrepresentable: `BackoffScheduled` is only accepted from
//! `Disconnected`, and the ceiling check lives inside the transition itself.

use thiserror::Error;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport, no pending work.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Transport up, subscriptions replayed.
    Connected,
    /// Waiting out the delay before reconnect attempt `attempt`.
    Backoff { attempt: u32 },
    /// Retry ceiling reached; only an explicit connect resumes.
    Exhausted,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Backoff { attempt } => write!(f, "backoff({attempt})"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Inputs to the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Explicit `connect()` call.
    ConnectRequested,
    /// Transport handshake completed.
    HandshakeSucceeded,
    /// Transport handshake failed or timed out.
    HandshakeFailed,
    /// Established connection dropped (abnormal close, read error, heartbeat timeout).
    TransportLost,
    /// Reconnect loop wants to arm the next backoff timer.
    BackoffScheduled,
    /// Backoff timer fired.
    BackoffElapsed,
    /// Explicit `disconnect()` call.
    DisconnectRequested,
}

/// Invalid transition attempt.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid transition: {event:?} while {state}")]
pub struct StateError {
    pub state: ConnectionState,
    pub event: StateEvent,
}

/// Connection state machine.
///
/// Owns the reconnect attempt counter alongside the state so the retry
/// ceiling is enforced in exactly one place.
#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
    attempts: u32,
    /// Retry ceiling (0 = unlimited).
    max_attempts: u32,
}

impl StateMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts scheduled since the last successful handshake.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Apply a lifecycle event and return the resulting state.
    pub fn apply(&mut self, event: StateEvent) -> Result<ConnectionState, StateError> {
        use ConnectionState::*;
        use StateEvent::*;

        let next = match (self.state, event) {
            (Disconnected | Backoff { .. } | Exhausted, ConnectRequested) => Connecting,
            (Connecting, HandshakeSucceeded) => {
                self.attempts = 0;
                Connected
            }
            (Connecting, HandshakeFailed) => Disconnected,
            (Connected, TransportLost) => Disconnected,
            (Disconnected, BackoffScheduled) => {
                if self.max_attempts > 0 && self.attempts >= self.max_attempts {
                    Exhausted
                } else {
                    let attempt = self.attempts;
                    self.attempts += 1;
                    Backoff { attempt }
                }
            }
            (Backoff { .. }, BackoffElapsed) => Connecting,
            (_, DisconnectRequested) => Disconnected,
            (state, event) => return Err(StateError { state, event }),
        };

        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;
    use StateEvent::*;

    #[test]
    fn test_initial_state() {
        let sm = StateMachine::new(5);
        assert_eq!(sm.state(), Disconnected);
        assert_eq!(sm.attempts(), 0);
    }

    #[test]
    fn test_connect_cycle() {
        let mut sm = StateMachine::new(5);
        assert_eq!(sm.apply(ConnectRequested).unwrap(), Connecting);
        assert_eq!(sm.apply(HandshakeSucceeded).unwrap(), Connected);
        assert!(sm.is_connected());
        assert_eq!(sm.apply(TransportLost).unwrap(), Disconnected);
    }

    #[test]
    fn test_handshake_failure_does_not_schedule() {
        let mut sm = StateMachine::new(5);
        sm.apply(ConnectRequested).unwrap();
        assert_eq!(sm.apply(HandshakeFailed).unwrap(), Disconnected);
        assert_eq!(sm.attempts(), 0);
    }

    #[test]
    fn test_backoff_attempt_numbering() {
        let mut sm = StateMachine::new(3);
        sm.apply(ConnectRequested).unwrap();
        sm.apply(HandshakeSucceeded).unwrap();
        sm.apply(TransportLost).unwrap();

        assert_eq!(sm.apply(BackoffScheduled).unwrap(), Backoff { attempt: 0 });
        sm.apply(BackoffElapsed).unwrap();
        sm.apply(HandshakeFailed).unwrap();
        assert_eq!(sm.apply(BackoffScheduled).unwrap(), Backoff { attempt: 1 });
        sm.apply(BackoffElapsed).unwrap();
        sm.apply(HandshakeFailed).unwrap();
        assert_eq!(sm.apply(BackoffScheduled).unwrap(), Backoff { attempt: 2 });
        sm.apply(BackoffElapsed).unwrap();
        sm.apply(HandshakeFailed).unwrap();

        // Ceiling reached: fourth schedule exhausts instead of arming a timer.
        assert_eq!(sm.apply(BackoffScheduled).unwrap(), Exhausted);
        // And nothing can be scheduled from Exhausted.
        assert!(sm.apply(BackoffScheduled).is_err());
    }

    #[test]
    fn test_attempts_reset_on_success() {
        let mut sm = StateMachine::new(3);
        sm.apply(ConnectRequested).unwrap();
        sm.apply(HandshakeSucceeded).unwrap();
        sm.apply(TransportLost).unwrap();
        sm.apply(BackoffScheduled).unwrap();
        sm.apply(BackoffElapsed).unwrap();
        assert_eq!(sm.attempts(), 1);
        sm.apply(HandshakeSucceeded).unwrap();
        assert_eq!(sm.attempts(), 0);
    }

    #[test]
    fn test_unlimited_retries() {
        let mut sm = StateMachine::new(0);
        sm.apply(ConnectRequested).unwrap();
        sm.apply(HandshakeSucceeded).unwrap();
        sm.apply(TransportLost).unwrap();
        for attempt in 0..100 {
            assert_eq!(sm.apply(BackoffScheduled).unwrap(), Backoff { attempt });
            sm.apply(BackoffElapsed).unwrap();
            sm.apply(HandshakeFailed).unwrap();
        }
    }

    #[test]
    fn test_connect_resumes_from_exhausted() {
        let mut sm = StateMachine::new(1);
        sm.apply(ConnectRequested).unwrap();
        sm.apply(HandshakeSucceeded).unwrap();
        sm.apply(TransportLost).unwrap();
        sm.apply(BackoffScheduled).unwrap();
        sm.apply(BackoffElapsed).unwrap();
        sm.apply(HandshakeFailed).unwrap();
        assert_eq!(sm.apply(BackoffScheduled).unwrap(), Exhausted);

        assert_eq!(sm.apply(ConnectRequested).unwrap(), Connecting);
        assert_eq!(sm.apply(HandshakeSucceeded).unwrap(), Connected);
        assert_eq!(sm.attempts(), 0);
    }

    #[test]
    fn test_disconnect_from_any_state() {
        for setup in [
            vec![],
            vec![ConnectRequested],
            vec![ConnectRequested, HandshakeSucceeded],
        ] {
            let mut sm = StateMachine::new(5);
            for ev in setup {
                sm.apply(ev).unwrap();
            }
            assert_eq!(sm.apply(DisconnectRequested).unwrap(), Disconnected);
        }
    }

    #[test]
    fn test_duplicate_connect_rejected() {
        let mut sm = StateMachine::new(5);
        sm.apply(ConnectRequested).unwrap();
        let err = sm.apply(ConnectRequested).unwrap_err();
        assert_eq!(err.state, Connecting);
    }

    #[test]
    fn test_backoff_only_from_disconnected() {
        let mut sm = StateMachine::new(5);
        sm.apply(ConnectRequested).unwrap();
        sm.apply(HandshakeSucceeded).unwrap();
        // Scheduling a timer while connected is a bug; the machine refuses.
        assert!(sm.apply(BackoffScheduled).is_err());
    }
}
