//! Protocol statistics counters.
//!
//! Malformed inbound frames never crash the client; they are counted here
//! and dropped. Counters are monotonic for the lifetime of the client.

use crate::message::FrameErrorClass;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared between the IO task and callers.
#[derive(Debug, Default)]
pub struct ClientStats {
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    unknown_kinds: AtomicU64,
    invalid_shapes: AtomicU64,
    oversized_rejected: AtomicU64,
    queue_rejected: AtomicU64,
    server_errors: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl ClientStats {
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self, class: FrameErrorClass) {
        let counter = match class {
            FrameErrorClass::Malformed => &self.malformed_frames,
            FrameErrorClass::UnknownKind => &self.unknown_kinds,
            FrameErrorClass::InvalidShape => &self.invalid_shapes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oversized_rejected(&self) {
        self.oversized_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_rejected(&self) {
        self.queue_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            unknown_kinds: self.unknown_kinds.load(Ordering::Relaxed),
            invalid_shapes: self.invalid_shapes.load(Ordering::Relaxed),
            oversized_rejected: self.oversized_rejected.load(Ordering::Relaxed),
            queue_rejected: self.queue_rejected.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub unknown_kinds: u64,
    pub invalid_shapes: u64,
    pub oversized_rejected: u64,
    pub queue_rejected: u64,
    pub server_errors: u64,
    pub reconnect_attempts: u64,
}

impl StatsSnapshot {
    /// Total frames dropped due to protocol errors.
    pub fn dropped_frames(&self) -> u64 {
        self.malformed_frames + self.unknown_kinds + self.invalid_shapes
    }
}
