//! Position: one order/trade tracked through pending → confirmed → closed.

use super::{Candle, Instrument, OrderId, OrderType, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Pending,
    Confirmed,
    Closed,
}

/// A position created by the broker adapter when an order is accepted.
///
/// The portfolio owns it; strategies refer to it by `order_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub instrument: Instrument,
    pub units: u64,
    pub open_price: Decimal,
    pub open_time: DateTime<Utc>,
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: PositionStatus,
    /// Id of the fill transaction; equals `order_id` until sync says otherwise.
    pub transaction_id: OrderId,
    pub close_price: Option<Decimal>,
    pub close_time: Option<DateTime<Utc>>,
    pub profit_pips: Option<Decimal>,
    pub profit_cash: Option<Decimal>,
    /// Most favourable price seen while open.
    pub max_profit: Decimal,
    /// Worst price seen while open.
    pub max_loss: Decimal,
    pub max_profit_pips: Decimal,
    pub max_loss_pips: Decimal,
}

impl Position {
    pub fn new(
        side: Side,
        instrument: Instrument,
        units: u64,
        open_price: Decimal,
        open_time: DateTime<Utc>,
        order_id: OrderId,
        order_type: OrderType,
    ) -> Self {
        Self {
            side,
            instrument,
            units,
            open_price,
            open_time,
            order_id,
            order_type,
            stop_loss: None,
            take_profit: None,
            status: PositionStatus::Pending,
            transaction_id: order_id,
            close_price: None,
            close_time: None,
            profit_pips: None,
            profit_cash: None,
            max_profit: open_price,
            max_loss: open_price,
            max_profit_pips: Decimal::ZERO,
            max_loss_pips: Decimal::ZERO,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: Option<Decimal>) -> Self {
        self.stop_loss = stop_loss;
        self
    }

    pub fn with_take_profit(mut self, take_profit: Option<Decimal>) -> Self {
        self.take_profit = take_profit;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == PositionStatus::Pending
    }

    pub fn is_open(&self) -> bool {
        self.status != PositionStatus::Closed
    }

    /// PENDING → CONFIRMED. No-op in any other state.
    pub fn confirm(&mut self) {
        if self.status == PositionStatus::Pending {
            self.status = PositionStatus::Confirmed;
        }
    }

    /// CONFIRMED → CLOSED. Pending positions are cancelled, never closed,
    /// so this returns false for them.
    pub fn mark_closed(&mut self) -> bool {
        if self.status != PositionStatus::Confirmed {
            return false;
        }
        self.status = PositionStatus::Closed;
        true
    }

    /// Profit in pips if closed at `close_price`.
    pub fn pip_profit(&self, close_price: Decimal) -> Decimal {
        let pips = self.instrument.pips_between(self.open_price, close_price);
        match self.side {
            Side::Buy => pips,
            Side::Sell => -pips,
        }
    }

    /// Widen the favourable / adverse excursion with one candle.
    ///
    /// A buy's best price is the highest bid and its worst the lowest ask;
    /// a sell mirrors that. Pip figures are magnitudes rounded to one place.
    pub fn record_excursion(&mut self, candle: &Candle) {
        match self.side {
            Side::Buy => {
                self.max_profit = self.max_profit.max(candle.high_bid);
                self.max_loss = self.max_loss.min(candle.low_ask);
            }
            Side::Sell => {
                self.max_profit = self.max_profit.min(candle.low_bid);
                self.max_loss = self.max_loss.max(candle.high_ask);
            }
        }
        let pip = self.instrument.pip;
        self.max_profit_pips = ((self.max_profit - self.open_price).abs() / pip).round_dp(1);
        self.max_loss_pips = ((self.open_price - self.max_loss).abs() / pip).round_dp(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn position(side: Side, open: Decimal) -> Position {
        let instrument = Instrument::from_symbol("EUR_USD", dec!(0.0001), 10_000_000).unwrap();
        Position::new(
            side,
            instrument,
            10_000,
            open,
            Utc.with_ymd_and_hms(2015, 7, 15, 10, 0, 0).unwrap(),
            OrderId(1),
            OrderType::Limit,
        )
    }

    fn candle(low_bid: Decimal, high_bid: Decimal) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2015, 7, 15, 10, 5, 0).unwrap(),
            open_bid: low_bid,
            open_ask: low_bid + dec!(0.0002),
            high_bid,
            high_ask: high_bid + dec!(0.0002),
            low_bid,
            low_ask: low_bid + dec!(0.0002),
            close_bid: high_bid,
            close_ask: high_bid + dec!(0.0002),
            volume: 1,
            complete: true,
        }
    }

    #[test]
    fn lifecycle_has_no_pending_to_closed_edge() {
        let mut pos = position(Side::Buy, dec!(1.1050));
        assert!(pos.is_pending());
        assert!(!pos.mark_closed());
        assert_eq!(pos.status, PositionStatus::Pending);

        pos.confirm();
        assert_eq!(pos.status, PositionStatus::Confirmed);
        assert!(pos.mark_closed());
        assert!(!pos.is_open());

        pos.confirm();
        assert_eq!(pos.status, PositionStatus::Closed);
    }

    #[test]
    fn buy_and_sell_pip_profit() {
        let buy = position(Side::Buy, dec!(1.1050));
        assert_eq!(buy.pip_profit(dec!(1.1070)), dec!(20));
        let sell = position(Side::Sell, dec!(1.1050));
        assert_eq!(sell.pip_profit(dec!(1.1070)), dec!(-20));
        assert_eq!(sell.pip_profit(dec!(1.1035)), dec!(15));
    }

    #[test]
    fn buy_excursion_tracks_high_bid_and_low_ask() {
        let mut pos = position(Side::Buy, dec!(1.1050));
        // low ask 1.1042
        pos.record_excursion(&candle(dec!(1.1040), dec!(1.10625)));
        assert_eq!(pos.max_profit, dec!(1.10625));
        assert_eq!(pos.max_loss, dec!(1.1042));
        assert_eq!(pos.max_profit_pips, dec!(12.5));
        assert_eq!(pos.max_loss_pips, dec!(8.0));

        // narrower candle leaves the extremes alone
        pos.record_excursion(&candle(dec!(1.1045), dec!(1.1055)));
        assert_eq!(pos.max_profit_pips, dec!(12.5));
        assert_eq!(pos.max_loss_pips, dec!(8.0));
    }

    #[test]
    fn sell_excursion_tracks_low_bid_and_high_ask() {
        let mut pos = position(Side::Sell, dec!(1.1050));
        // high ask 1.1062
        pos.record_excursion(&candle(dec!(1.1030), dec!(1.1060)));
        assert_eq!(pos.max_profit, dec!(1.1030));
        assert_eq!(pos.max_loss, dec!(1.1062));
        assert_eq!(pos.max_profit_pips, dec!(20.0));
        assert_eq!(pos.max_loss_pips, dec!(12.0));
    }
}
