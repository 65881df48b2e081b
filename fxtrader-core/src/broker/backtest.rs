//! Backtest broker: fills instantly against the preloaded feed.

use super::{Broker, HistoryQuery, OrderRequest, SyncStatus};
use crate::api::Quote;
use crate::data::BacktestFeed;
use crate::domain::{Candle, Instrument, OrderId, Position, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

pub struct BacktestBroker {
    feed: BacktestFeed,
    tick: Option<DateTime<Utc>>,
    balance: Decimal,
    last_id: u64,
    pip_cash_multiplier: Option<Decimal>,
}

impl BacktestBroker {
    pub fn new(feed: BacktestFeed, initial_balance: Decimal) -> Self {
        Self {
            feed,
            tick: None,
            balance: initial_balance,
            last_id: 0,
            pip_cash_multiplier: None,
        }
    }

    /// Cash value of one pip of profit. Defaults to `units × pip` per position.
    pub fn with_pip_cash_multiplier(mut self, multiplier: Option<Decimal>) -> Self {
        self.pip_cash_multiplier = multiplier;
        self
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    fn latest_candle(&self, instrument: &Instrument, tick: DateTime<Utc>) -> Option<&Candle> {
        self.feed.get(&instrument.symbol())?.latest_closed(tick)
    }

    /// Price a market order would get now: buys pay the ask, sells hit the bid.
    fn entry_price(&self, instrument: &Instrument, side: Side, tick: DateTime<Utc>) -> Option<Decimal> {
        let candle = self.latest_candle(instrument, tick)?;
        Some(match side {
            Side::Buy => candle.close_ask,
            Side::Sell => candle.close_bid,
        })
    }

    fn exit_price(&self, position: &Position, tick: DateTime<Utc>) -> Option<Decimal> {
        let candle = self.latest_candle(&position.instrument, tick)?;
        Some(match position.side {
            Side::Buy => candle.close_bid,
            Side::Sell => candle.close_ask,
        })
    }
}

impl Broker for BacktestBroker {
    fn set_current_tick(&mut self, tick: DateTime<Utc>) {
        self.tick = Some(tick);
    }

    fn current_tick(&self) -> Option<DateTime<Utc>> {
        self.tick
    }

    fn get_history(&self, query: &HistoryQuery) -> Vec<Candle> {
        match self.feed.get(&query.instrument) {
            Some(feed) => feed.history(query.timeframe, query.start, query.end, query.include_current),
            None => {
                warn!(instrument = %query.instrument, "no backtest data loaded for instrument");
                Vec::new()
            }
        }
    }

    fn get_account_balance(&self) -> Option<Decimal> {
        Some(self.balance)
    }

    fn get_price(&self, _instrument: &Instrument) -> Option<Quote> {
        None
    }

    fn open_order(&mut self, request: &OrderRequest) -> Option<Position> {
        let Some(tick) = self.tick else {
            warn!(instrument = %request.instrument, "order before first tick ignored");
            return None;
        };
        let price = match request.price {
            Some(price) => price,
            None => match self.entry_price(&request.instrument, request.side, tick) {
                Some(price) => price,
                None => {
                    warn!(instrument = %request.instrument, %tick, "no candle to price market order");
                    return None;
                }
            },
        };

        self.last_id += 1;
        let position = Position::new(
            request.side,
            request.instrument.clone(),
            request.units,
            price,
            tick,
            OrderId(self.last_id),
            request.order_type,
        )
        .with_stop_loss(request.stop_loss)
        .with_take_profit(request.take_profit);
        debug!(order_id = %position.order_id, %price, "backtest order filled");
        Some(position)
    }

    fn close_trade(&mut self, position: &mut Position) -> bool {
        let Some(tick) = self.tick else {
            return false;
        };
        let Some(close_price) = position.close_price.or_else(|| self.exit_price(position, tick)) else {
            warn!(order_id = %position.order_id, %tick, "no price to close at");
            return false;
        };

        let pips = position.pip_profit(close_price);
        let multiplier = self
            .pip_cash_multiplier
            .unwrap_or_else(|| Decimal::from(position.units) * position.instrument.pip);
        let cash = (pips * multiplier).round_dp(2);

        position.close_price = Some(close_price);
        position.close_time = Some(tick);
        position.profit_pips = Some(pips.round_dp(1));
        position.profit_cash = Some(cash);
        self.balance += cash;
        true
    }

    fn sync_transactions(&self, _position: &mut Position) -> SyncStatus {
        SyncStatus::Confirmed
    }

    fn delete_pending_order(&mut self, _position: &Position) -> bool {
        true
    }
}
