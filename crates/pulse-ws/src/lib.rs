//! WebSocket client for realtime market data.
//!
//! Provides robust connectivity for dashboard frontends with:
//! - Explicit connection state machine (no scattered reconnect flags)
//! - Automatic reconnection with exponential backoff and a retry ceiling
//! - Subscription set replay after every reconnect
//! - Bounded outbound queue drained in FIFO order on reconnect
//! - Latest-value cache per (kind, symbol) with read-side staleness
//! - Typed event broadcast instead of string-keyed listeners
//! - Heartbeat monitoring with pong timeout detection

pub mod cache;
pub mod client;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod message;
pub mod queue;
pub mod state;
pub mod stats;
pub mod subscription;

pub use cache::LatestCache;
pub use client::{FeedClient, FeedConfig};
pub use error::{WsError, WsResult};
pub use events::{EventBus, FeedEvent};
pub use heartbeat::Heartbeat;
pub use message::{decode_frame, ClientFrame, DecodeError, FrameErrorClass, ServerFrame};
pub use queue::{QueueFull, SendQueue};
pub use state::{ConnectionState, StateEvent, StateMachine};
pub use stats::{ClientStats, StatsSnapshot};
pub use subscription::{Channel, Subscription, SubscriptionSet};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
