use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type as understood by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "market")]
    Market,
    #[serde(rename = "limit")]
    Limit,
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "marketIfTouched")]
    MarketIfTouched,
    #[serde(rename = "takeprofit")]
    TakeProfit,
}

impl OrderType {
    pub const fn code(self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Stop => "stop",
            OrderType::MarketIfTouched => "marketIfTouched",
            OrderType::TakeProfit => "takeprofit",
        }
    }

    /// Resting orders need a trigger price and carry an expiry.
    pub const fn requires_price(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::Stop | OrderType::MarketIfTouched)
    }

    /// Stop and take-profit legs live on the trade endpoint once submitted;
    /// everything else is looked up on the order endpoint.
    pub const fn tracked_as_trade(self) -> bool {
        matches!(self, OrderType::Stop | OrderType::TakeProfit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
