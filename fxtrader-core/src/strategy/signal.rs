//! Signal generation boundary.
//!
//! Indicator maths lives behind [`SignalGenerator`]: it sees the candle
//! feeds a strategy collected this tick and answers with actions. It never
//! sees the broker or the portfolio.

use super::{Action, OrderIntent};
use crate::domain::{Candle, OrderType, Side, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Latest history per timeframe, finest first.
pub type Feeds = BTreeMap<Timeframe, Vec<Candle>>;

pub trait SignalGenerator: Send {
    /// Human-readable name (e.g., "last_candle").
    fn name(&self) -> &str;

    /// Called with each timeframe's history whenever it changed.
    fn annotate(&mut self, _timeframe: Timeframe, _candles: &[Candle]) {}

    /// Actions to take while flat.
    fn open_signal(&self, feeds: &Feeds, tick: DateTime<Utc>) -> Vec<Action>;

    /// Actions to take while holding positions.
    fn close_signal(&self, feeds: &Feeds, tick: DateTime<Utc>) -> Vec<Action>;
}

/// Demonstration generator: buys the last close and exits on the next candle.
///
/// Entries are priced at the finest feed's last ask, exits at its last bid.
#[derive(Debug, Clone, Copy)]
pub struct LastCandleSignal {
    order_type: OrderType,
}

impl LastCandleSignal {
    pub fn new(order_type: OrderType) -> Self {
        Self { order_type }
    }

    fn last_candle(feeds: &Feeds) -> Option<&Candle> {
        feeds.values().next()?.last()
    }
}

impl Default for LastCandleSignal {
    fn default() -> Self {
        Self::new(OrderType::Limit)
    }
}

impl SignalGenerator for LastCandleSignal {
    fn name(&self) -> &str {
        "last_candle"
    }

    fn open_signal(&self, feeds: &Feeds, _tick: DateTime<Utc>) -> Vec<Action> {
        let Some(candle) = Self::last_candle(feeds) else {
            return Vec::new();
        };
        let price = (self.order_type != OrderType::Market).then_some(candle.close_ask);
        vec![Action::Open(OrderIntent {
            side: Side::Buy,
            order_type: self.order_type,
            price,
            expiry: None,
            stop_loss: None,
        })]
    }

    fn close_signal(&self, feeds: &Feeds, _tick: DateTime<Utc>) -> Vec<Action> {
        match Self::last_candle(feeds) {
            Some(candle) => vec![Action::Close {
                price: Some(candle.close_bid),
            }],
            None => Vec::new(),
        }
    }
}
