//! Bounded outbound frame queue.
//!
//! Frames accepted while disconnected wait here and are drained in FIFO
//! order right after the next successful handshake, before any newly issued
//! sends. The queue rejects new frames once full rather than dropping old
//! ones, so the accepted sequence keeps its exact order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;

/// Queue is at capacity; the frame was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("outbound queue full")]
pub struct QueueFull;

/// FIFO queue of serialized frames with a hard capacity.
#[derive(Debug)]
pub struct SendQueue {
    frames: Mutex<VecDeque<String>>,
    limit: usize,
}

impl SendQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    /// Append a frame, rejecting it when the queue is full.
    pub fn push(&self, frame: String) -> Result<(), QueueFull> {
        let mut frames = self.frames.lock();
        if frames.len() >= self.limit {
            return Err(QueueFull);
        }
        frames.push_back(frame);
        Ok(())
    }

    /// Take all queued frames in FIFO order.
    pub fn drain(&self) -> Vec<String> {
        self.frames.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}
