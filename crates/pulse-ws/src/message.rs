//! Wire protocol codec.
//!
//! Frames are JSON text with a `type` discriminator. Decoding is two-phase:
//! the frame is parsed to a JSON value first so malformed JSON, unknown
//! kinds, and shape failures for a known kind can be told apart (each feeds a
//! separate counter), then deserialized into its typed form. Shape checks go
//! beyond field presence: quote and candle payloads must also pass their
//! domain validation.

use crate::subscription::{Channel, Subscription};
use pulse_core::{CandleSeries, Quote};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Outbound control frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        channel: Channel,
        #[serde(skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
    },
    Unsubscribe {
        channel: Channel,
        #[serde(skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
    },
    Ping,
    Pong,
}

impl ClientFrame {
    pub fn subscribe(sub: &Subscription) -> Self {
        Self::Subscribe {
            channel: sub.channel,
            symbol: sub.symbol.clone(),
        }
    }

    pub fn unsubscribe(sub: &Subscription) -> Self {
        Self::Unsubscribe {
            channel: sub.channel,
            symbol: sub.symbol.clone(),
        }
    }
}

/// Inbound frames after decoding and shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Subscribed(Subscription),
    Unsubscribed(Subscription),
    Quote(Quote),
    Candles(CandleSeries),
    Ping,
    Pong,
    Error { message: String },
}

/// Why a frame was dropped, for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameErrorClass {
    /// Not valid JSON, or no `type` discriminator.
    Malformed,
    /// Valid JSON with a `type` this client does not know.
    UnknownKind,
    /// Known `type` whose payload failed deserialization or validation.
    InvalidShape,
}

/// Decode failure for a single inbound frame. Never fatal; counted and dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("frame has no type discriminator")]
    MissingKind,

    #[error("unknown frame kind: {0}")]
    UnknownKind(String),

    #[error("bad {kind} payload: {reason}")]
    InvalidShape { kind: String, reason: String },
}

impl DecodeError {
    pub fn class(&self) -> FrameErrorClass {
        match self {
            Self::Malformed(_) | Self::MissingKind => FrameErrorClass::Malformed,
            Self::UnknownKind(_) => FrameErrorClass::UnknownKind,
            Self::InvalidShape { .. } => FrameErrorClass::InvalidShape,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
}

fn shaped<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::InvalidShape {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<ServerFrame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingKind)?
        .to_string();

    let frame = match kind.as_str() {
        "subscribed" => ServerFrame::Subscribed(shaped(&kind, value)?),
        "unsubscribed" => ServerFrame::Unsubscribed(shaped(&kind, value)?),
        "quote" => {
            let quote: Quote = shaped(&kind, value)?;
            quote.validate().map_err(|e| DecodeError::InvalidShape {
                kind: kind.clone(),
                reason: e.to_string(),
            })?;
            ServerFrame::Quote(quote)
        }
        "candles" => {
            let series: CandleSeries = shaped(&kind, value)?;
            series.validate().map_err(|e| DecodeError::InvalidShape {
                kind: kind.clone(),
                reason: e.to_string(),
            })?;
            ServerFrame::Candles(series)
        }
        "ping" => ServerFrame::Ping,
        "pong" => ServerFrame::Pong,
        "error" => {
            let payload: ErrorPayload = shaped(&kind, value)?;
            ServerFrame::Error {
                message: payload.message,
            }
        }
        _ => return Err(DecodeError::UnknownKind(kind)),
    };

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::Price;
    use rust_decimal_macros::dec;

    #[test]
    fn test_encode_subscribe() {
        let sub = Subscription::new(Channel::Quotes, Some("AAPL".to_string()));
        let json = serde_json::to_string(&ClientFrame::subscribe(&sub)).unwrap();
        assert_eq!(
            json,
            r#"{"type":"subscribe","channel":"quotes","symbol":"AAPL"}"#
        );
    }

    #[test]
    fn test_encode_ping() {
        assert_eq!(
            serde_json::to_string(&ClientFrame::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
    }

    #[test]
    fn test_decode_quote() {
        let raw = r#"{
            "type": "quote",
            "symbol": "AAPL",
            "price": "150.00",
            "bid": "149.98",
            "ask": "150.02",
            "volume": "120000",
            "timestamp": "2025-06-02T14:30:00Z"
        }"#;

        match decode_frame(raw).unwrap() {
            ServerFrame::Quote(quote) => {
                assert_eq!(quote.symbol, "AAPL");
                assert_eq!(quote.price, Price::new(dec!(150.00)));
            }
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_candles() {
        let raw = r#"{
            "type": "candles",
            "symbol": "MSFT",
            "candles": [
                {
                    "time": "2025-06-02T14:30:00Z",
                    "open": "420.0",
                    "high": "421.5",
                    "low": "419.8",
                    "close": "421.0",
                    "volume": "5000"
                }
            ]
        }"#;

        match decode_frame(raw).unwrap() {
            ServerFrame::Candles(series) => {
                assert_eq!(series.symbol, "MSFT");
                assert_eq!(series.len(), 1);
                assert!(series.latest().unwrap().is_bullish());
            }
            other => panic!("expected candles, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_subscription_acks() {
        let raw = r#"{"type":"subscribed","channel":"quotes","symbol":"AAPL"}"#;
        match decode_frame(raw).unwrap() {
            ServerFrame::Subscribed(sub) => {
                assert_eq!(sub.channel, Channel::Quotes);
                assert_eq!(sub.symbol.as_deref(), Some("AAPL"));
            }
            other => panic!("expected subscribed, got {other:?}"),
        }

        let raw = r#"{"type":"unsubscribed","channel":"candles"}"#;
        match decode_frame(raw).unwrap() {
            ServerFrame::Unsubscribed(sub) => {
                assert_eq!(sub.channel, Channel::Candles);
                assert!(sub.symbol.is_none());
            }
            other => panic!("expected unsubscribed, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_frame() {
        let raw = r#"{"type":"error","message":"subscription limit reached"}"#;
        match decode_frame(raw).unwrap() {
            ServerFrame::Error { message } => {
                assert_eq!(message, "subscription limit reached");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_classified() {
        let err = decode_frame("{not json").unwrap_err();
        assert_eq!(err.class(), FrameErrorClass::Malformed);
    }

    #[test]
    fn test_missing_type_classified_malformed() {
        let err = decode_frame(r#"{"symbol":"AAPL"}"#).unwrap_err();
        assert_eq!(err.class(), FrameErrorClass::Malformed);
    }

    #[test]
    fn test_unknown_kind_classified() {
        let err = decode_frame(r#"{"type":"order_book","symbol":"AAPL"}"#).unwrap_err();
        assert_eq!(err.class(), FrameErrorClass::UnknownKind);
    }

    #[test]
    fn test_quote_missing_fields_classified_shape() {
        let err = decode_frame(r#"{"type":"quote","symbol":"AAPL"}"#).unwrap_err();
        assert_eq!(err.class(), FrameErrorClass::InvalidShape);
    }

    #[test]
    fn test_quote_failing_domain_validation_classified_shape() {
        let raw = r#"{
            "type": "quote",
            "symbol": "",
            "price": "150.00",
            "bid": "149.98",
            "ask": "150.02",
            "volume": "120000",
            "timestamp": "2025-06-02T14:30:00Z"
        }"#;
        let err = decode_frame(raw).unwrap_err();
        assert_eq!(err.class(), FrameErrorClass::InvalidShape);
    }

    #[test]
    fn test_error_frame_requires_message() {
        let err = decode_frame(r#"{"type":"error"}"#).unwrap_err();
        assert_eq!(err.class(), FrameErrorClass::InvalidShape);
    }
}
