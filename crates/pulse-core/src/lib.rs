//! Core domain types for the marketpulse feed client.
//!
//! This crate provides fundamental types used throughout the workspace:
//! - `Price`, `Size`: precision-safe numeric types
//! - `Quote`: top-of-book market data snapshot per symbol
//! - `Candle`, `CandleSeries`: derived OHLCV data per symbol
//! - `DataKind`: cache/staleness key discriminator

pub mod decimal;
pub mod error;
pub mod types;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use types::{Candle, CandleSeries, DataKind, Quote, QuoteState};
