//! Latest-value cache for market data.
//!
//! One entry per `(kind, symbol)`, overwritten on every push. Entries never
//! expire on their own; staleness is computed on read against a caller
//! supplied age threshold, and ages use monotonic time.

use dashmap::DashMap;
use pulse_core::{CandleSeries, DataKind, Quote};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    received_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            received_at: Instant::now(),
        }
    }
}

/// Per-symbol latest-value store for quotes and candle series.
#[derive(Debug, Default)]
pub struct LatestCache {
    quotes: DashMap<String, Entry<Quote>>,
    candles: DashMap<String, Entry<CandleSeries>>,
}

impl LatestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a quote, replacing any previous value for the symbol.
    pub fn insert_quote(&self, quote: Quote) {
        self.quotes
            .insert(quote.symbol.clone(), Entry::new(quote));
    }

    /// Store a candle series, replacing any previous value for the symbol.
    pub fn insert_candles(&self, series: CandleSeries) {
        self.candles
            .insert(series.symbol.clone(), Entry::new(series));
    }

    /// Latest quote for a symbol, if any.
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(symbol).map(|e| e.value.clone())
    }

    /// Latest candle series for a symbol, if any.
    pub fn candles(&self, symbol: &str) -> Option<CandleSeries> {
        self.candles.get(symbol).map(|e| e.value.clone())
    }

    /// Age of the cached entry, if any.
    pub fn age(&self, kind: DataKind, symbol: &str) -> Option<Duration> {
        match kind {
            DataKind::Quote => self.quotes.get(symbol).map(|e| e.received_at.elapsed()),
            DataKind::Candles => self.candles.get(symbol).map(|e| e.received_at.elapsed()),
        }
    }

    /// True when no entry exists or its age exceeds `max_age`.
    pub fn is_stale(&self, kind: DataKind, symbol: &str, max_age: Duration) -> bool {
        match self.age(kind, symbol) {
            Some(age) => age > max_age,
            None => true,
        }
    }

    /// Number of cached entries for a kind.
    pub fn len(&self, kind: DataKind) -> usize {
        match kind {
            DataKind::Quote => self.quotes.len(),
            DataKind::Candles => self.candles.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty() && self.candles.is_empty()
    }

    /// Drop all cached values.
    pub fn clear(&self) {
        self.quotes.clear();
        self.candles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::{Price, Size};
    use rust_decimal_macros::dec;

    fn quote(symbol: &str, price: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price: price.parse().unwrap(),
            bid: Price::new(dec!(149.99)),
            ask: Price::new(dec!(150.01)),
            volume: Size::new(dec!(1000)),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_last_write_wins() {
        let cache = LatestCache::new();
        cache.insert_quote(quote("AAPL", "150.00"));
        cache.insert_quote(quote("AAPL", "150.10"));

        let cached = cache.quote("AAPL").unwrap();
        assert_eq!(cached.price, Price::new(dec!(150.10)));
        assert_eq!(cache.len(DataKind::Quote), 1);
    }

    #[test]
    fn test_missing_symbol_is_stale() {
        let cache = LatestCache::new();
        assert!(cache.is_stale(DataKind::Quote, "AAPL", Duration::from_secs(60)));
        assert!(cache.quote("AAPL").is_none());
    }

    #[test]
    fn test_fresh_entry_is_not_stale() {
        let cache = LatestCache::new();
        cache.insert_quote(quote("AAPL", "150.00"));
        assert!(!cache.is_stale(DataKind::Quote, "AAPL", Duration::from_secs(1)));
    }

    #[test]
    fn test_entry_goes_stale_after_threshold() {
        let cache = LatestCache::new();
        cache.insert_quote(quote("AAPL", "150.00"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.is_stale(DataKind::Quote, "AAPL", Duration::from_millis(10)));
        // The value itself is still served; staleness is the caller's call.
        assert!(cache.quote("AAPL").is_some());
    }

    #[test]
    fn test_kinds_are_independent() {
        let cache = LatestCache::new();
        cache.insert_quote(quote("AAPL", "150.00"));
        assert!(cache.is_stale(DataKind::Candles, "AAPL", Duration::from_secs(60)));

        cache.insert_candles(CandleSeries {
            symbol: "AAPL".to_string(),
            candles: vec![],
        });
        assert!(!cache.is_stale(DataKind::Candles, "AAPL", Duration::from_secs(60)));
    }

    #[test]
    fn test_clear() {
        let cache = LatestCache::new();
        cache.insert_quote(quote("AAPL", "150.00"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.is_stale(DataKind::Quote, "AAPL", Duration::from_secs(60)));
    }
}
