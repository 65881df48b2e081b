//! Strategies: per-instrument decision makers polled once per tick.
//!
//! A strategy never owns positions. It keeps the ids of the positions the
//! portfolio opened on its behalf in an [`OpenSet`] and answers each tick
//! with zero or more [`Action`]s, which the controller tags with the
//! strategy's id and hands to the portfolio as [`Intent`]s.

pub mod signal;
pub mod timeframe;

pub use signal::{Feeds, LastCandleSignal, SignalGenerator};
pub use timeframe::{StrategyMode, TimeframeConfig, TimeframeStrategy};

use crate::broker::Broker;
use crate::domain::{Candle, Instrument, OrderId, OrderType, Side, StrategyId, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// What a strategy wants opened.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub expiry: Option<DateTime<Utc>>,
    pub stop_loss: Option<Decimal>,
}

impl OrderIntent {
    /// A limit order at `price` with no expiry or stop override.
    pub fn limit(side: Side, price: Decimal) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            expiry: None,
            stop_loss: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Open(OrderIntent),
    /// Close or cancel everything the strategy holds; `price` is the close hint.
    Close { price: Option<Decimal> },
    /// Widen the excursion of every held position with this candle.
    Mark { candle: Candle },
}

/// An action tagged with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub strategy: StrategyId,
    pub action: Action,
}

/// Non-owning references to the positions a strategy holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenSet {
    ids: Vec<OrderId>,
}

impl OpenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: OrderId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Returns whether the id was held.
    pub fn remove(&mut self, id: OrderId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|held| *held != id);
        self.ids.len() != before
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[OrderId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub trait Strategy: Send {
    /// Stable name, also the cache namespace for backtest data.
    fn name(&self) -> &str;

    fn instrument(&self) -> &Instrument;

    /// Ascending by duration.
    fn timeframes(&self) -> &[Timeframe];

    /// Candles of history needed before the first decision.
    fn warmup_candles(&self) -> usize;

    /// Called once with the first clock tick.
    fn start(&mut self, broker: &dyn Broker, tick: DateTime<Utc>);

    fn tick(&mut self, broker: &dyn Broker, tick: DateTime<Utc>) -> Vec<Action>;

    fn positions(&self) -> &OpenSet;

    fn positions_mut(&mut self) -> &mut OpenSet;

    fn is_open(&self) -> bool {
        !self.positions().is_empty()
    }
}
