//! Typed event surface for feed consumers.
//!
//! A closed union broadcast over a `tokio::sync::broadcast` channel replaces
//! string-keyed listener registration: payload shapes are checked at compile
//! time and per-symbol interest is a receiver-side filter on
//! [`FeedEvent::symbol`].

use crate::subscription::Subscription;
use pulse_core::{CandleSeries, Quote};
use tokio::sync::broadcast;

/// Everything the client reports to the application layer.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Transport connected and subscriptions replayed.
    Connected,
    /// Transport lost (close frame code/reason, or 1006 for read errors).
    Disconnected { code: u16, reason: String },
    /// Server acknowledged a subscribe.
    Subscribed(Subscription),
    /// Server acknowledged an unsubscribe.
    Unsubscribed(Subscription),
    /// Quote push.
    Quote(Quote),
    /// Derived candle series push.
    Candles(CandleSeries),
    /// Server-reported error; not retried by the client.
    ServerError { message: String },
    /// Retry ceiling reached; an explicit connect is required to resume.
    ReconnectExhausted { attempts: u32 },
}

impl FeedEvent {
    /// Symbol this event concerns, for receiver-side filtering.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Quote(quote) => Some(&quote.symbol),
            Self::Candles(series) => Some(&series.symbol),
            Self::Subscribed(sub) | Self::Unsubscribed(sub) => sub.symbol.as_deref(),
            _ => None,
        }
    }
}

/// Broadcast fan-out of [`FeedEvent`]s to any number of receivers.
///
/// Slow receivers lag rather than block the IO task; a receiver that falls
/// behind sees `RecvError::Lagged` and continues from the oldest retained
/// event.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Open a new receiver; it observes events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. A send with no live receivers is not an error.
    pub fn emit(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Channel;
    use chrono::Utc;
    use pulse_core::{Price, Size};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_events_fan_out_to_all_receivers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(FeedEvent::Connected);

        assert!(matches!(rx1.recv().await.unwrap(), FeedEvent::Connected));
        assert!(matches!(rx2.recv().await.unwrap(), FeedEvent::Connected));
    }

    #[test]
    fn test_emit_without_receivers_is_ok() {
        let bus = EventBus::new(16);
        bus.emit(FeedEvent::Connected);
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn test_event_symbol_accessor() {
        let quote = Quote {
            symbol: "AAPL".to_string(),
            price: Price::new(dec!(150)),
            bid: Price::new(dec!(149.99)),
            ask: Price::new(dec!(150.01)),
            volume: Size::new(dec!(10)),
            timestamp: Utc::now(),
        };
        assert_eq!(FeedEvent::Quote(quote).symbol(), Some("AAPL"));

        let sub = Subscription::new(Channel::Quotes, Some("MSFT".to_string()));
        assert_eq!(FeedEvent::Subscribed(sub).symbol(), Some("MSFT"));
        assert_eq!(FeedEvent::Connected.symbol(), None);
    }
}
