//! Candle: bid/ask OHLC for one window of one timeframe.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bid/ask OHLC candle, timestamped at the start of its window.
///
/// Candles of one (instrument, timeframe) series are strictly ordered and
/// unique by `time`. `complete` is false for a window that is still open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open_bid: Decimal,
    pub open_ask: Decimal,
    pub high_bid: Decimal,
    pub high_ask: Decimal,
    pub low_bid: Decimal,
    pub low_ask: Decimal,
    pub close_bid: Decimal,
    pub close_ask: Decimal,
    pub volume: u64,
    pub complete: bool,
}

impl Candle {
    pub fn close_mid(&self) -> Decimal {
        (self.close_bid + self.close_ask) / Decimal::TWO
    }

    /// Fold finer candles into one incomplete candle stamped at `window_start`.
    ///
    /// Returns `None` for an empty slice.
    pub fn aggregate(window_start: DateTime<Utc>, parts: &[Candle]) -> Option<Candle> {
        let first = parts.first()?;
        let last = parts.last()?;
        let mut merged = Candle {
            time: window_start,
            open_bid: first.open_bid,
            open_ask: first.open_ask,
            high_bid: first.high_bid,
            high_ask: first.high_ask,
            low_bid: first.low_bid,
            low_ask: first.low_ask,
            close_bid: last.close_bid,
            close_ask: last.close_ask,
            volume: 0,
            complete: false,
        };
        for part in parts {
            merged.high_bid = merged.high_bid.max(part.high_bid);
            merged.high_ask = merged.high_ask.max(part.high_ask);
            merged.low_bid = merged.low_bid.min(part.low_bid);
            merged.low_ask = merged.low_ask.min(part.low_ask);
            merged.volume = merged.volume.saturating_add(part.volume);
        }
        Some(merged)
    }
}
