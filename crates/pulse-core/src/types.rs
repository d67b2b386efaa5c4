//! Market data types shared across the workspace.
//!
//! `Quote` is the top-of-book snapshot pushed by the server per symbol;
//! `CandleSeries` is the derived OHLCV payload. Both carry a receipt
//! timestamp so downstream consumers can reason about data age.

use crate::error::CoreError;
use crate::{Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quote validity for shape checks on inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    /// Both sides present and bid <= ask.
    Valid,
    /// No bid side (price zero or negative).
    NoBid,
    /// No ask side (price zero or negative).
    NoAsk,
    /// Both sides missing.
    Empty,
    /// Crossed book (bid > ask).
    Crossed,
}

impl QuoteState {
    /// Check whether the quote can be shown/cached as-is.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl std::fmt::Display for QuoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::NoBid => write!(f, "NO_BID"),
            Self::NoAsk => write!(f, "NO_ASK"),
            Self::Empty => write!(f, "EMPTY"),
            Self::Crossed => write!(f, "CROSSED"),
        }
    }
}

/// Top-of-book quote for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol (e.g., "AAPL").
    pub symbol: String,
    /// Last traded price.
    pub price: Price,
    /// Best bid price.
    pub bid: Price,
    /// Best ask price.
    pub ask: Price,
    /// Session volume.
    pub volume: Size,
    /// Server-side timestamp of the update.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Midpoint of bid and ask.
    pub fn mid(&self) -> Price {
        self.bid.midpoint(self.ask)
    }

    /// Bid/ask spread.
    pub fn spread(&self) -> Price {
        self.ask - self.bid
    }

    /// Classify quote validity.
    pub fn state(&self) -> QuoteState {
        let has_bid = self.bid.is_positive();
        let has_ask = self.ask.is_positive();
        match (has_bid, has_ask) {
            (false, false) => QuoteState::Empty,
            (false, true) => QuoteState::NoBid,
            (true, false) => QuoteState::NoAsk,
            (true, true) if self.bid > self.ask => QuoteState::Crossed,
            (true, true) => QuoteState::Valid,
        }
    }

    /// Minimal shape check for inbound quote frames.
    ///
    /// Serde guarantees field presence; this rejects semantically broken
    /// payloads (empty symbol, non-positive last price, negative volume).
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.symbol.is_empty() {
            return Err(CoreError::InvalidQuote("empty symbol".to_string()));
        }
        if !self.price.is_positive() {
            return Err(CoreError::InvalidQuote(format!(
                "non-positive price {} for {}",
                self.price, self.symbol
            )));
        }
        if self.volume.is_negative() {
            return Err(CoreError::InvalidQuote(format!(
                "negative volume {} for {}",
                self.volume, self.symbol
            )));
        }
        Ok(())
    }
}

/// Single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time.
    pub time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Size,
}

impl Candle {
    /// High-low range of the candle.
    pub fn range(&self) -> Price {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Derived candle series for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleSeries {
    /// Ticker symbol this series belongs to.
    pub symbol: String,
    /// Candles in chronological order.
    pub candles: Vec<Candle>,
}

impl CandleSeries {
    /// Most recent candle, if any.
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Minimal shape check for inbound candle frames.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.symbol.is_empty() {
            return Err(CoreError::InvalidCandles("empty symbol".to_string()));
        }
        Ok(())
    }
}

/// Discriminator for cached data kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Top-of-book quotes.
    Quote,
    /// Derived candle series.
    Candles,
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quote => write!(f, "quote"),
            Self::Candles => write!(f, "candles"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(bid: &str, ask: &str) -> Quote {
        Quote {
            symbol: "AAPL".to_string(),
            price: Price::new(dec!(150.00)),
            bid: bid.parse().unwrap(),
            ask: ask.parse().unwrap(),
            volume: Size::new(dec!(1000)),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_quote_state_valid() {
        assert_eq!(quote("149.99", "150.01").state(), QuoteState::Valid);
        assert!(quote("149.99", "150.01").state().is_usable());
    }

    #[test]
    fn test_quote_state_crossed() {
        assert_eq!(quote("150.02", "150.01").state(), QuoteState::Crossed);
    }

    #[test]
    fn test_quote_state_missing_sides() {
        assert_eq!(quote("0", "150.01").state(), QuoteState::NoBid);
        assert_eq!(quote("149.99", "0").state(), QuoteState::NoAsk);
        assert_eq!(quote("0", "0").state(), QuoteState::Empty);
    }

    #[test]
    fn test_quote_mid_and_spread() {
        let q = quote("149.99", "150.01");
        assert_eq!(q.mid(), Price::new(dec!(150.00)));
        assert_eq!(q.spread(), Price::new(dec!(0.02)));
    }

    #[test]
    fn test_quote_validate_rejects_empty_symbol() {
        let mut q = quote("149.99", "150.01");
        q.symbol = String::new();
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_quote_validate_rejects_negative_volume() {
        let mut q = quote("149.99", "150.01");
        q.volume = Size::new(dec!(-1));
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_candle_range() {
        let c = Candle {
            time: Utc::now(),
            open: Price::new(dec!(100)),
            high: Price::new(dec!(110)),
            low: Price::new(dec!(95)),
            close: Price::new(dec!(105)),
            volume: Size::new(dec!(5000)),
        };
        assert_eq!(c.range(), Price::new(dec!(15)));
        assert!(c.is_bullish());
    }

    #[test]
    fn test_candle_series_latest() {
        let series = CandleSeries {
            symbol: "MSFT".to_string(),
            candles: vec![],
        };
        assert!(series.latest().is_none());
        assert!(series.is_empty());
        assert!(series.validate().is_ok());
    }
}
