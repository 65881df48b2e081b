//! Live broker against a scripted upstream.
//!
//! Covers:
//! 1. Order submission: price checks, rounding, expiry, retry limits
//! 2. Pending-order reconciliation: PENDING / CONFIRMED / NOTFOUND
//! 3. Closing and cancelling
//! 4. Reads: history filtering, quotes, balance

mod common;

use chrono::Duration;
use common::{eur_usd, fill, receipt, series, t0, ScriptedApi};
use fxtrader_core::api::{ApiError, CloseReceipt, Quote};
use fxtrader_core::broker::{Broker, HistoryQuery, LiveBroker, OrderRequest, SyncStatus};
use fxtrader_core::data::RetryPolicy;
use fxtrader_core::domain::{OrderId, OrderType, Position, Side, Timeframe};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration as StdDuration;

fn broker(api: &Arc<ScriptedApi>) -> LiveBroker {
    let mut broker = LiveBroker::new(api.clone()).with_retry(
        RetryPolicy::bounded(StdDuration::ZERO, 2),
        RetryPolicy::bounded(StdDuration::ZERO, RetryPolicy::MUTATION_ATTEMPTS),
    );
    broker.set_current_tick(t0());
    broker
}

fn request(order_type: OrderType, price: Option<Decimal>) -> OrderRequest {
    OrderRequest {
        instrument: eur_usd(),
        units: 10_000,
        side: Side::Buy,
        order_type,
        price,
        expiry: None,
        stop_loss: Some(dec!(1.10304)),
        take_profit: Some(dec!(1.10716)),
    }
}

fn pending(order_id: u64, order_type: OrderType) -> Position {
    Position::new(
        Side::Buy,
        eur_usd(),
        10_000,
        dec!(1.1050),
        t0(),
        OrderId(order_id),
        order_type,
    )
}

fn connection() -> ApiError {
    ApiError::Connection("connection reset".into())
}

// ── 1. Order submission ──────────────────────────────────────────────

#[test]
fn resting_order_without_price_is_not_submitted() {
    let api = ScriptedApi::new();
    let mut broker = broker(&api);
    assert!(broker.open_order(&request(OrderType::Limit, None)).is_none());
    assert!(api.state().tickets.is_empty());
}

#[test]
fn ticket_prices_are_rounded_and_expiry_defaults() {
    let api = ScriptedApi::with(|s| s.order_replies.push_back(Ok(receipt(101, dec!(1.1050), t0()))));
    let mut broker = broker(&api);

    let position = broker
        .open_order(&request(OrderType::Limit, Some(dec!(1.105037))))
        .unwrap();

    let state = api.state();
    let ticket = &state.tickets[0];
    assert_eq!(ticket.instrument, "EUR_USD");
    assert_eq!(ticket.price, Some(dec!(1.1050)));
    assert_eq!(ticket.stop_loss, Some(dec!(1.1030)));
    assert_eq!(ticket.take_profit, Some(dec!(1.1072)));
    assert_eq!(ticket.expiry, Some(t0() + Duration::seconds(300)));

    assert_eq!(position.order_id, OrderId(101));
    assert_eq!(position.transaction_id, OrderId(101));
    assert_eq!(position.stop_loss, Some(dec!(1.1030)));
    assert!(position.is_pending());
}

#[test]
fn explicit_expiry_and_market_orders() {
    let api = ScriptedApi::with(|s| {
        s.order_replies.push_back(Ok(receipt(1, dec!(1.1050), t0())));
        s.order_replies.push_back(Ok(receipt(2, dec!(1.1052), t0())));
    });
    let mut broker = broker(&api).with_order_expiry(Duration::minutes(30));

    let mut limit = request(OrderType::Limit, Some(dec!(1.1050)));
    limit.expiry = Some(t0() + Duration::hours(4));
    broker.open_order(&limit).unwrap();
    broker.open_order(&request(OrderType::Market, None)).unwrap();

    let state = api.state();
    assert_eq!(state.tickets[0].expiry, Some(t0() + Duration::hours(4)));
    assert_eq!(state.tickets[1].expiry, None);
    assert_eq!(state.tickets[1].price, None);
}

#[test]
fn submission_gives_up_after_three_attempts() {
    let api = ScriptedApi::with(|s| {
        s.order_replies.push_back(Err(connection()));
        s.order_replies.push_back(Err(ApiError::Broker { code: 24, message: "busy".into() }));
        s.order_replies.push_back(Err(connection()));
        s.order_replies.push_back(Ok(receipt(9, dec!(1.1050), t0())));
    });
    let mut broker = broker(&api);
    assert!(broker.open_order(&request(OrderType::Limit, Some(dec!(1.1050)))).is_none());
    assert_eq!(api.state().tickets.len(), 3);
}

#[test]
fn submission_recovers_within_attempt_limit() {
    let api = ScriptedApi::with(|s| {
        s.order_replies.push_back(Err(ApiError::Broker { code: 24, message: "busy".into() }));
        s.order_replies.push_back(Ok(receipt(9, dec!(1.1050), t0())));
    });
    let mut broker = broker(&api);
    let position = broker.open_order(&request(OrderType::Limit, Some(dec!(1.1050))));
    assert_eq!(position.map(|p| p.order_id), Some(OrderId(9)));
    assert_eq!(api.state().tickets.len(), 2);
}

#[test]
fn malformed_reply_is_not_retried() {
    let api = ScriptedApi::with(|s| s.order_replies.push_back(Err(ApiError::Malformed("eof".into()))));
    let mut broker = broker(&api);
    assert!(broker.open_order(&request(OrderType::Limit, Some(dec!(1.1050)))).is_none());
    assert_eq!(api.state().tickets.len(), 1);
}

// ── 2. Reconciliation ────────────────────────────────────────────────

#[test]
fn resting_order_stays_pending_and_unchanged() {
    let api = ScriptedApi::with(|s| s.resting_orders.push(OrderId(7)));
    let broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);
    let before = position.clone();

    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Pending);
    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Pending);
    assert_eq!(position, before);
    assert_eq!(api.state().order_lookups, 2);
}

#[test]
fn filled_order_is_confirmed_from_its_fill() {
    let api = ScriptedApi::with(|s| {
        let mut order_fill = fill(42, "ORDER_FILLED", Some(7), dec!(1.1046));
        order_fill.stop_loss_price = Some(dec!(1.1026));
        s.transactions = vec![fill(43, "ORDER_CANCEL", Some(8), dec!(1.2)), order_fill];
    });
    let broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);

    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Confirmed);
    assert_eq!(position.open_price, dec!(1.1046));
    assert_eq!(position.transaction_id, OrderId(42));
    assert_eq!(position.order_id, OrderId(7));
    assert_eq!(position.stop_loss, Some(dec!(1.1026)));
    assert_eq!(position.max_profit, dec!(1.1046));
    assert_eq!(position.max_loss, dec!(1.1046));
}

#[test]
fn market_order_matches_its_create_transaction() {
    let api = ScriptedApi::with(|s| {
        s.transactions = vec![
            fill(5, "ORDER_FILLED", Some(5), dec!(1.2000)),
            fill(5, "MARKET_ORDER_CREATE", None, dec!(1.1051)),
        ];
    });
    let broker = broker(&api);
    let mut position = pending(5, OrderType::Market);

    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Confirmed);
    assert_eq!(position.open_price, dec!(1.1051));
    assert_eq!(position.stop_loss, None);
}

#[test]
fn stop_orders_are_looked_up_as_trades() {
    let api = ScriptedApi::with(|s| s.open_trades.push(OrderId(3)));
    let broker = broker(&api);
    let mut position = pending(3, OrderType::Stop);

    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Pending);
    let state = api.state();
    assert_eq!(state.trade_lookups, 1);
    assert_eq!(state.order_lookups, 0);
}

#[test]
fn vanished_order_is_not_found() {
    let api = ScriptedApi::with(|s| s.transactions = vec![fill(9, "ORDER_FILLED", Some(8), dec!(1.1))]);
    let broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);
    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::NotFound);
}

#[test]
fn unreachable_broker_keeps_order_pending() {
    let api = ScriptedApi::with(|s| {
        s.lookup_error = Some(connection());
        s.transactions = vec![fill(42, "ORDER_FILLED", Some(7), dec!(1.1046))];
    });
    let broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);
    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Pending);
    assert_eq!(position.open_price, dec!(1.1050));
}

#[test]
fn lookup_rejection_falls_back_to_transactions() {
    let api = ScriptedApi::with(|s| {
        s.lookup_error = Some(ApiError::Broker { code: 404, message: "no such order".into() });
        s.transactions = vec![fill(42, "ORDER_FILLED", Some(7), dec!(1.1046))];
    });
    let broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);
    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Confirmed);
}

#[test]
fn transaction_history_failure_keeps_order_pending() {
    let api = ScriptedApi::with(|s| s.transactions_error = Some(connection()));
    let broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);
    assert_eq!(broker.sync_transactions(&mut position), SyncStatus::Pending);
}

// ── 3. Close and cancel ──────────────────────────────────────────────

#[test]
fn close_uses_transaction_id_and_broker_figures() {
    let close_time = t0() + Duration::minutes(30);
    let api = ScriptedApi::with(|s| {
        s.close_replies.push_back(Ok(CloseReceipt {
            id: OrderId(600),
            price: dec!(1.1070),
            time: close_time,
            profit: dec!(18.07),
        }))
    });
    let mut broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);
    position.transaction_id = OrderId(42);
    position.confirm();

    assert!(broker.close_trade(&mut position));
    assert_eq!(api.state().closed, vec![OrderId(42)]);
    assert_eq!(position.close_price, Some(dec!(1.1070)));
    assert_eq!(position.close_time, Some(close_time));
    assert_eq!(position.profit_cash, Some(dec!(18.07)));
    assert_eq!(position.profit_pips, Some(dec!(20.0)));
}

#[test]
fn failed_close_leaves_position_untouched() {
    let api = ScriptedApi::with(|s| {
        for _ in 0..3 {
            s.close_replies.push_back(Err(connection()));
        }
    });
    let mut broker = broker(&api);
    let mut position = pending(7, OrderType::Limit);
    position.confirm();
    let before = position.clone();

    assert!(!broker.close_trade(&mut position));
    assert_eq!(position, before);
    assert_eq!(api.state().closed.len(), 3);
}

#[test]
fn cancel_succeeds_even_when_the_broker_objects() {
    let api = ScriptedApi::with(|s| s.cancel_error = Some(ApiError::Broker { code: 404, message: "gone".into() }));
    let mut broker = broker(&api);
    let position = pending(7, OrderType::Limit);
    assert!(broker.delete_pending_order(&position));
    assert!(broker.delete_pending_order(&position));
    assert_eq!(api.state().cancelled, vec![OrderId(7), OrderId(7)]);
}

// ── 4. Reads ─────────────────────────────────────────────────────────

#[test]
fn history_drops_the_open_candle_unless_asked() {
    let api = ScriptedApi::with(|s| {
        let mut candles = series(Timeframe::M5, t0(), 4);
        candles[3].complete = false;
        s.series.insert(Timeframe::M5, candles);
    });
    let broker = broker(&api);
    let mut query = HistoryQuery {
        instrument: "EUR_USD".into(),
        timeframe: Timeframe::M5,
        start: t0() - Duration::seconds(1),
        end: t0() + Duration::minutes(20),
        include_current: false,
    };

    assert_eq!(broker.get_history(&query).len(), 3);
    query.include_current = true;
    assert_eq!(broker.get_history(&query).len(), 4);
}

#[test]
fn price_selects_the_requested_instrument() {
    let api = ScriptedApi::with(|s| {
        s.quotes = vec![
            Quote { instrument: "GBP_USD".into(), time: t0(), bid: dec!(1.56), ask: dec!(1.5602) },
            Quote { instrument: "EUR_USD".into(), time: t0(), bid: dec!(1.1050), ask: dec!(1.1052) },
        ];
    });
    let quote = broker(&api).get_price(&eur_usd()).unwrap();
    assert_eq!(quote.bid, dec!(1.1050));
    assert_eq!(quote.ask, dec!(1.1052));
}

#[test]
fn balance_is_none_when_unavailable() {
    let api = ScriptedApi::new();
    assert_eq!(broker(&api).get_account_balance(), None);

    api.state().balance = Some(dec!(10000));
    assert_eq!(broker(&api).get_account_balance(), Some(dec!(10000)));
}

#[test]
fn balance_and_quotes_are_tried_once() {
    // Unbounded read retry: only the quote policy keeps these from stalling.
    let api = ScriptedApi::with(|s| {
        s.quotes_error = Some(ApiError::Connection("timed out".into()));
    });
    let mut broker = LiveBroker::new(api.clone()).with_retry(
        RetryPolicy::unbounded(StdDuration::ZERO),
        RetryPolicy::bounded(StdDuration::ZERO, RetryPolicy::MUTATION_ATTEMPTS),
    );
    broker.set_current_tick(t0());

    assert_eq!(broker.get_account_balance(), None);
    assert!(broker.get_price(&eur_usd()).is_none());
    let state = api.state();
    assert_eq!(state.balance_calls, 1);
    assert_eq!(state.price_calls, 1);
}

#[test]
fn quote_retry_can_be_widened() {
    let api = ScriptedApi::new();
    let broker = broker(&api).with_quote_retry(RetryPolicy::bounded(StdDuration::ZERO, 3));
    assert_eq!(broker.get_account_balance(), None);
    assert_eq!(api.state().balance_calls, 3);
}
