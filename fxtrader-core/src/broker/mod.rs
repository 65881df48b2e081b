//! Broker adapters.
//!
//! The [`Broker`] trait gives backtest replay and live trading one contract.
//! Network failures never escape it: they surface as `None`, empty history,
//! `false`, or a PENDING sync status, and the caller retries on a later tick.

pub mod backtest;
pub mod live;

pub use backtest::BacktestBroker;
pub use live::LiveBroker;

use crate::api::Quote;
use crate::domain::{Candle, Instrument, OrderType, Position, Side, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// Result of reconciling a pending position against the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Still resting, or the broker could not be asked.
    Pending,
    /// Filled; the position was updated from the fill.
    Confirmed,
    /// Neither resting nor filled: cancelled, expired or rejected upstream.
    NotFound,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Confirmed => "CONFIRMED",
            SyncStatus::NotFound => "NOTFOUND",
        })
    }
}

/// A history slice request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Append the still-accumulating candle of the current window.
    pub include_current: bool,
}

/// A sized, priced order ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: Instrument,
    pub units: u64,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub expiry: Option<DateTime<Utc>>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

pub trait Broker: Send {
    fn set_current_tick(&mut self, tick: DateTime<Utc>);

    fn current_tick(&self) -> Option<DateTime<Utc>>;

    fn get_history(&self, query: &HistoryQuery) -> Vec<Candle>;

    fn get_account_balance(&self) -> Option<Decimal>;

    /// Current quote. Backtests have none.
    fn get_price(&self, instrument: &Instrument) -> Option<Quote>;

    /// Submit an order. `None` if it was rejected or could not be placed.
    fn open_order(&mut self, request: &OrderRequest) -> Option<Position>;

    /// Close a confirmed position, filling in close price, time and profit.
    /// `position.close_price`, when set, is the caller's price hint.
    fn close_trade(&mut self, position: &mut Position) -> bool;

    /// Reconcile a pending position. May update open price, transaction id
    /// and stop loss from the fill.
    fn sync_transactions(&self, position: &mut Position) -> SyncStatus;

    /// Cancel a pending order. Idempotent; never fails.
    fn delete_pending_order(&mut self, position: &Position) -> bool;
}
