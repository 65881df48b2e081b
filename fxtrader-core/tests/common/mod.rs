//! Shared fixtures for the integration tests.
//!
//! `ScriptedApi` is an in-memory `BrokerageApi`: candles are served from a
//! fixed series, mutations pop scripted replies, and every call is recorded.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use fxtrader_core::api::{
    ApiError, BrokerageApi, CandleRequest, CloseReceipt, OrderReceipt, OrderTicket, Quote,
    Transaction,
};
use fxtrader_core::broker::Broker;
use fxtrader_core::domain::{Candle, Instrument, OrderId, Timeframe};
use fxtrader_core::strategy::{Action, OpenSet, Strategy};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

// ── Time and instruments ─────────────────────────────────────────────

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 7, 15, 0, 0, 0).unwrap()
}

pub fn eur_usd() -> Instrument {
    Instrument::from_symbol("EUR_USD", dec!(0.0001), 10_000_000).unwrap()
}

// ── Candle builders ──────────────────────────────────────────────────

/// Flat candle: every bid field is `bid`, every ask field `bid + 0.0002`.
pub fn candle(time: DateTime<Utc>, bid: Decimal) -> Candle {
    let ask = bid + dec!(0.0002);
    Candle {
        time,
        open_bid: bid,
        open_ask: ask,
        high_bid: bid,
        high_ask: ask,
        low_bid: bid,
        low_ask: ask,
        close_bid: bid,
        close_ask: ask,
        volume: 1,
        complete: true,
    }
}

/// `count` consecutive complete candles of `timeframe` from `start`, with a
/// bid that walks up one pip per candle and wraps every 50.
pub fn series(timeframe: Timeframe, start: DateTime<Utc>, count: i64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let time = start + Duration::seconds(timeframe.seconds() * i);
            candle(time, Decimal::new(11000 + i % 50, 4))
        })
        .collect()
}

// ── Scripted upstream ────────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptState {
    /// Candles served by `candles`, one series per timeframe.
    pub series: BTreeMap<Timeframe, Vec<Candle>>,
    /// Serve the candle at `start` even when `include_first` is false, so
    /// consecutive pages overlap by one candle.
    pub overlap_pages: bool,
    /// Candle pages served before every further `candles` call fails.
    pub pages_before_outage: Option<usize>,
    pub candle_requests: Vec<CandleRequest>,
    pub quotes: Vec<Quote>,
    pub quotes_error: Option<ApiError>,
    pub price_calls: usize,
    pub balance: Option<Decimal>,
    pub balance_calls: usize,
    pub instruments: Vec<Instrument>,

    pub order_replies: VecDeque<Result<OrderReceipt, ApiError>>,
    pub tickets: Vec<OrderTicket>,
    pub close_replies: VecDeque<Result<CloseReceipt, ApiError>>,
    pub closed: Vec<OrderId>,
    pub cancel_error: Option<ApiError>,
    pub cancelled: Vec<OrderId>,

    /// Ids still resting on the order endpoint.
    pub resting_orders: Vec<OrderId>,
    /// Ids still open on the trade endpoint.
    pub open_trades: Vec<OrderId>,
    pub lookup_error: Option<ApiError>,
    pub order_lookups: usize,
    pub trade_lookups: usize,
    pub transactions: Vec<Transaction>,
    pub transactions_error: Option<ApiError>,
}

#[derive(Default)]
pub struct ScriptedApi {
    state: Mutex<ScriptState>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(script: impl FnOnce(&mut ScriptState)) -> Arc<Self> {
        let api = Self::default();
        script(&mut api.state());
        Arc::new(api)
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }
}

fn unscripted(call: &str) -> ApiError {
    ApiError::Malformed(format!("no scripted reply for {call}"))
}

impl BrokerageApi for ScriptedApi {
    fn account_balance(&self) -> Result<Decimal, ApiError> {
        let mut state = self.state();
        state.balance_calls += 1;
        state
            .balance
            .ok_or_else(|| ApiError::Connection("balance unavailable".into()))
    }

    fn prices(&self, _instrument: &str) -> Result<Vec<Quote>, ApiError> {
        let mut state = self.state();
        state.price_calls += 1;
        match state.quotes_error.clone() {
            Some(e) => Err(e),
            None => Ok(state.quotes.clone()),
        }
    }

    /// Honours `start`, `end`, `count` and `include_first` like the upstream.
    fn candles(&self, request: &CandleRequest) -> Result<Vec<Candle>, ApiError> {
        let mut state = self.state();
        state.candle_requests.push(request.clone());
        if let Some(pages) = state.pages_before_outage.as_mut() {
            if *pages == 0 {
                return Err(ApiError::Connection("upstream down".into()));
            }
            *pages -= 1;
        }
        let series = state.series.get(&request.timeframe).cloned().unwrap_or_default();
        let limit = request.count.map_or(usize::MAX, |c| c as usize);
        let inclusive = request.include_first || state.overlap_pages;
        Ok(series
            .into_iter()
            .filter(|c| match request.start {
                Some(start) if inclusive => c.time >= start,
                Some(start) => c.time > start,
                None => true,
            })
            .filter(|c| request.end.map_or(true, |end| c.time <= end))
            .take(limit)
            .collect())
    }

    fn instrument(&self, symbol: &str) -> Result<Instrument, ApiError> {
        self.state()
            .instruments
            .iter()
            .find(|i| i.symbol() == symbol)
            .cloned()
            .ok_or_else(|| ApiError::Broker {
                code: 404,
                message: format!("unknown instrument {symbol}"),
            })
    }

    fn create_order(&self, ticket: &OrderTicket) -> Result<OrderReceipt, ApiError> {
        let mut state = self.state();
        state.tickets.push(ticket.clone());
        state
            .order_replies
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("create_order")))
    }

    fn close_trade(&self, trade_id: OrderId) -> Result<CloseReceipt, ApiError> {
        let mut state = self.state();
        state.closed.push(trade_id);
        state
            .close_replies
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("close_trade")))
    }

    fn cancel_order(&self, order_id: OrderId) -> Result<(), ApiError> {
        let mut state = self.state();
        state.cancelled.push(order_id);
        match state.cancel_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn order_exists(&self, order_id: OrderId) -> Result<bool, ApiError> {
        let mut state = self.state();
        state.order_lookups += 1;
        match state.lookup_error.clone() {
            Some(e) => Err(e),
            None => Ok(state.resting_orders.contains(&order_id)),
        }
    }

    fn trade_exists(&self, trade_id: OrderId) -> Result<bool, ApiError> {
        let mut state = self.state();
        state.trade_lookups += 1;
        match state.lookup_error.clone() {
            Some(e) => Err(e),
            None => Ok(state.open_trades.contains(&trade_id)),
        }
    }

    fn transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        let state = self.state();
        match state.transactions_error.clone() {
            Some(e) => Err(e),
            None => Ok(state.transactions.clone()),
        }
    }
}

pub fn receipt(id: u64, price: Decimal, time: DateTime<Utc>) -> OrderReceipt {
    OrderReceipt {
        id: OrderId(id),
        price,
        time,
    }
}

pub fn fill(id: u64, kind: &str, order_id: Option<u64>, price: Decimal) -> Transaction {
    Transaction {
        id: OrderId(id),
        kind: kind.into(),
        order_id: order_id.map(OrderId),
        price: Some(price),
        stop_loss_price: None,
    }
}

// ── Strategies ───────────────────────────────────────────────────────

/// A strategy that never acts on its own; tests drive the portfolio directly.
pub struct Holder {
    pub instrument: Instrument,
    pub positions: OpenSet,
}

impl Holder {
    pub fn boxed() -> Box<dyn Strategy> {
        Box::new(Self {
            instrument: eur_usd(),
            positions: OpenSet::new(),
        })
    }
}

impl Strategy for Holder {
    fn name(&self) -> &str {
        "holder"
    }
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }
    fn timeframes(&self) -> &[Timeframe] {
        &[Timeframe::M5]
    }
    fn warmup_candles(&self) -> usize {
        0
    }
    fn start(&mut self, _: &dyn Broker, _: DateTime<Utc>) {}
    fn tick(&mut self, _: &dyn Broker, _: DateTime<Utc>) -> Vec<Action> {
        Vec::new()
    }
    fn positions(&self) -> &OpenSet {
        &self.positions
    }
    fn positions_mut(&mut self) -> &mut OpenSet {
        &mut self.positions
    }
}
