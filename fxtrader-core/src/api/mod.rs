//! Upstream brokerage API boundary.
//!
//! [`BrokerageApi`] is the only place the engine talks to the outside market.
//! `OandaClient` implements it over HTTP; tests substitute a scripted fake.

pub mod oanda;
pub mod types;

pub use oanda::{Environment, OandaClient};
pub use types::{
    CandleRequest, CloseReceipt, OrderReceipt, OrderTicket, Quote, Transaction, WireDecimal,
};

use crate::domain::{Candle, Instrument, OrderId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure classes of an upstream call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure: refused, reset, timed out, DNS.
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker answered with an error payload.
    #[error("broker error {code}: {message}")]
    Broker { code: i64, message: String },

    /// The reply could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Malformed replies are never retried; a retry would see the same bytes.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Malformed(_))
    }
}

pub trait BrokerageApi: Send + Sync {
    fn account_balance(&self) -> Result<Decimal, ApiError>;

    fn prices(&self, instrument: &str) -> Result<Vec<Quote>, ApiError>;

    fn candles(&self, request: &CandleRequest) -> Result<Vec<Candle>, ApiError>;

    fn instrument(&self, symbol: &str) -> Result<Instrument, ApiError>;

    fn create_order(&self, ticket: &OrderTicket) -> Result<OrderReceipt, ApiError>;

    fn close_trade(&self, trade_id: OrderId) -> Result<CloseReceipt, ApiError>;

    fn cancel_order(&self, order_id: OrderId) -> Result<(), ApiError>;

    /// Whether an order with this id is still resting at the broker.
    fn order_exists(&self, order_id: OrderId) -> Result<bool, ApiError>;

    /// Whether a trade with this id is still open at the broker.
    fn trade_exists(&self, trade_id: OrderId) -> Result<bool, ApiError>;

    /// Recent account transactions, newest first.
    fn transactions(&self) -> Result<Vec<Transaction>, ApiError>;
}
