//! Subscription set management.
//!
//! The desired subscription state is a set of `(channel, symbol)` pairs.
//! Subscribe/unsubscribe mutate the set; after every successful reconnect the
//! set is snapshotted and replayed verbatim, so exactly the current desired
//! state is requested regardless of what happened while disconnected.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Server-side channel a client can subscribe to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Top-of-book quote pushes.
    Quotes,
    /// Derived candle series pushes.
    Candles,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quotes => write!(f, "quotes"),
            Self::Candles => write!(f, "candles"),
        }
    }
}

/// A single subscription: channel plus optional symbol filter.
///
/// `symbol: None` subscribes to the whole channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Subscription {
    pub fn new(channel: Channel, symbol: impl Into<Option<String>>) -> Self {
        Self {
            channel,
            symbol: symbol.into(),
        }
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{}:{}", self.channel, symbol),
            None => write!(f, "{}", self.channel),
        }
    }
}

/// Thread-safe set of desired subscriptions.
///
/// Backed by a `BTreeSet` so replay order is deterministic.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    inner: RwLock<BTreeSet<Subscription>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription. Returns `false` when it was already present.
    pub fn insert(&self, sub: Subscription) -> bool {
        self.inner.write().insert(sub)
    }

    /// Remove a subscription. Returns `false` when it was not present.
    pub fn remove(&self, sub: &Subscription) -> bool {
        self.inner.write().remove(sub)
    }

    pub fn contains(&self, sub: &Subscription) -> bool {
        self.inner.read().contains(sub)
    }

    /// Current desired state, in deterministic order, for replay.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.inner.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
