//! Live broker: proxies the contract to the upstream brokerage API.

use super::{Broker, HistoryQuery, OrderRequest, SyncStatus};
use crate::api::{ApiError, BrokerageApi, CandleRequest, OrderTicket, Quote};
use crate::data::RetryPolicy;
use crate::domain::{Candle, Instrument, Position};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default lifetime of a resting order, in seconds.
pub const DEFAULT_ORDER_EXPIRY_SECS: i64 = 300;

pub struct LiveBroker {
    api: Arc<dyn BrokerageApi>,
    tick: Option<DateTime<Utc>>,
    read_retry: RetryPolicy,
    /// Balance and quote reads; a miss skips the tick instead of stalling it.
    quote_retry: RetryPolicy,
    write_retry: RetryPolicy,
    order_expiry: Duration,
}

impl LiveBroker {
    pub fn new(api: Arc<dyn BrokerageApi>) -> Self {
        Self {
            api,
            tick: None,
            read_retry: RetryPolicy::default(),
            quote_retry: RetryPolicy::single(),
            write_retry: RetryPolicy::mutation(),
            order_expiry: Duration::seconds(DEFAULT_ORDER_EXPIRY_SECS),
        }
    }

    pub fn with_retry(mut self, read: RetryPolicy, write: RetryPolicy) -> Self {
        self.read_retry = read;
        self.write_retry = write;
        self
    }

    pub fn with_quote_retry(mut self, quote: RetryPolicy) -> Self {
        self.quote_retry = quote;
        self
    }

    pub fn with_order_expiry(mut self, expiry: Duration) -> Self {
        self.order_expiry = expiry;
        self
    }

    fn ticket(&self, request: &OrderRequest) -> OrderTicket {
        let instrument = &request.instrument;
        let tick = self.tick.unwrap_or_else(Utc::now);
        let resting = request.order_type.requires_price();
        OrderTicket {
            instrument: instrument.symbol(),
            units: request.units,
            side: request.side,
            order_type: request.order_type,
            price: request.price.map(|p| instrument.round_price(p)),
            expiry: resting.then(|| request.expiry.unwrap_or(tick + self.order_expiry)),
            stop_loss: request.stop_loss.map(|p| instrument.round_price(p)),
            take_profit: request.take_profit.map(|p| instrument.round_price(p)),
        }
    }
}

impl Broker for LiveBroker {
    fn set_current_tick(&mut self, tick: DateTime<Utc>) {
        self.tick = Some(tick);
    }

    fn current_tick(&self) -> Option<DateTime<Utc>> {
        self.tick
    }

    fn get_history(&self, query: &HistoryQuery) -> Vec<Candle> {
        let request = CandleRequest {
            instrument: query.instrument.clone(),
            timeframe: query.timeframe,
            start: Some(query.start),
            end: Some(query.end),
            count: None,
            include_first: false,
        };
        match self.read_retry.run("candles", || self.api.candles(&request)) {
            Ok(candles) => candles
                .into_iter()
                .filter(|c| query.include_current || c.complete)
                .collect(),
            Err(e) => {
                warn!(instrument = %query.instrument, timeframe = %query.timeframe, error = %e,
                    "history unavailable");
                Vec::new()
            }
        }
    }

    fn get_account_balance(&self) -> Option<Decimal> {
        self.quote_retry
            .run("account_balance", || self.api.account_balance())
            .map_err(|e| warn!(error = %e, "account balance unavailable"))
            .ok()
    }

    fn get_price(&self, instrument: &Instrument) -> Option<Quote> {
        let symbol = instrument.symbol();
        let quotes = self
            .quote_retry
            .run("prices", || self.api.prices(&symbol))
            .map_err(|e| warn!(instrument = %symbol, error = %e, "price unavailable"))
            .ok()?;
        quotes.into_iter().find(|q| q.instrument == symbol)
    }

    fn open_order(&mut self, request: &OrderRequest) -> Option<Position> {
        if request.order_type.requires_price() && request.price.is_none() {
            error!(
                instrument = %request.instrument,
                order_type = %request.order_type,
                "order type requires a price, not submitted"
            );
            return None;
        }

        let ticket = self.ticket(request);
        match self.write_retry.run("create_order", || self.api.create_order(&ticket)) {
            Ok(receipt) => {
                info!(
                    instrument = %ticket.instrument,
                    order_id = %receipt.id,
                    price = %receipt.price,
                    "order accepted"
                );
                Some(
                    Position::new(
                        request.side,
                        request.instrument.clone(),
                        request.units,
                        receipt.price,
                        receipt.time,
                        receipt.id,
                        request.order_type,
                    )
                    .with_stop_loss(ticket.stop_loss)
                    .with_take_profit(ticket.take_profit),
                )
            }
            Err(e) => {
                error!(instrument = %ticket.instrument, error = %e, "order submission failed");
                None
            }
        }
    }

    fn close_trade(&mut self, position: &mut Position) -> bool {
        let trade_id = position.transaction_id;
        match self.write_retry.run("close_trade", || self.api.close_trade(trade_id)) {
            Ok(receipt) => {
                position.close_price = Some(receipt.price);
                position.close_time = Some(receipt.time);
                position.profit_cash = Some(receipt.profit);
                position.profit_pips = Some(position.pip_profit(receipt.price).round_dp(1));
                true
            }
            Err(e) => {
                error!(%trade_id, error = %e, "close failed");
                false
            }
        }
    }

    fn sync_transactions(&self, position: &mut Position) -> SyncStatus {
        let order_id = position.order_id;
        let lookup = if position.order_type.tracked_as_trade() {
            self.api.trade_exists(order_id)
        } else {
            self.api.order_exists(order_id)
        };
        match lookup {
            Ok(true) => return SyncStatus::Pending,
            Ok(false) => {}
            Err(ApiError::Connection(reason)) => {
                warn!(%order_id, %reason, "order lookup failed, still pending");
                return SyncStatus::Pending;
            }
            Err(e) => debug!(%order_id, error = %e, "order lookup error, scanning transactions"),
        }

        let transactions = match self.api.transactions() {
            Ok(transactions) => transactions,
            Err(e) => {
                warn!(%order_id, error = %e, "transaction history unavailable, still pending");
                return SyncStatus::Pending;
            }
        };
        let Some(fill) = transactions
            .iter()
            .find(|t| t.confirms(order_id, position.order_type))
        else {
            return SyncStatus::NotFound;
        };

        if let Some(price) = fill.price {
            position.open_price = price;
            position.max_profit = price;
            position.max_loss = price;
        }
        position.transaction_id = fill.id;
        if fill.stop_loss_price.is_some() {
            position.stop_loss = fill.stop_loss_price;
        }
        SyncStatus::Confirmed
    }

    fn delete_pending_order(&mut self, position: &Position) -> bool {
        match self.api.cancel_order(position.order_id) {
            Ok(()) => info!(order_id = %position.order_id, "pending order cancelled"),
            Err(e) => warn!(order_id = %position.order_id, error = %e, "cancel failed, treating as gone"),
        }
        true
    }
}
