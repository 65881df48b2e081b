//! Request and reply types shared by every `BrokerageApi` implementation.

use crate::domain::decimal::{decimal_from_f64, parse_decimal};
use crate::domain::{OrderId, OrderType, Side, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

/// Current bid/ask for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub instrument: String,
    pub time: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
}

/// One page of candles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub count: Option<u32>,
    /// Whether a candle starting exactly at `start` is returned.
    pub include_first: bool,
}

/// A fully-resolved order submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTicket {
    pub instrument: String,
    pub units: u64,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub expiry: Option<DateTime<Utc>>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Accepted order: id of the resting order or the opened trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderReceipt {
    pub id: OrderId,
    pub price: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReceipt {
    pub id: OrderId,
    pub price: Decimal,
    pub time: DateTime<Utc>,
    pub profit: Decimal,
}

/// One entry of the account transaction history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: OrderId,
    /// Upstream type code, e.g. `ORDER_FILLED`.
    pub kind: String,
    pub order_id: Option<OrderId>,
    pub price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
}

impl Transaction {
    pub const MARKET_ORDER_CREATE: &'static str = "MARKET_ORDER_CREATE";

    /// Types that mean a resting order or protective leg was filled.
    pub const FILL_KINDS: [&'static str; 4] = [
        "ORDER_FILLED",
        "STOP_LOSS_FILLED",
        "TAKE_PROFIT_FILLED",
        "TRAILING_STOP_FILLED",
    ];

    /// Whether this transaction confirms the order `order_id` of `order_type`.
    pub fn confirms(&self, order_id: OrderId, order_type: OrderType) -> bool {
        match order_type {
            OrderType::Market => self.id == order_id && self.kind == Self::MARKET_ORDER_CREATE,
            _ => {
                self.order_id == Some(order_id)
                    && Self::FILL_KINDS.contains(&self.kind.as_str())
            }
        }
    }
}

/// A decimal decoded from either a JSON string or a JSON number.
///
/// Numbers go through their shortest textual form so `1.1` stays `1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireDecimal(pub Decimal);

impl<'de> Deserialize<'de> for WireDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DecimalVisitor;

        impl Visitor<'_> for DecimalVisitor {
            type Value = WireDecimal;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal number or decimal string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                parse_decimal(v).map(WireDecimal).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                decimal_from_f64(v).map(WireDecimal).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(WireDecimal(Decimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(WireDecimal(Decimal::from(v)))
            }
        }

        deserializer.deserialize_any(DecimalVisitor)
    }
}

impl From<WireDecimal> for Decimal {
    fn from(value: WireDecimal) -> Self {
        value.0
    }
}
