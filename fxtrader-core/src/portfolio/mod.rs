//! Portfolio: owns every position and drives its order lifecycle.
//!
//! A position lives in exactly one of two lists: `pending_order_list` until
//! the broker confirms the fill, `position_list` until it is closed. Pending
//! orders are cancelled, never closed, so a pending position never reaches
//! the ledger.

pub mod ledger;
pub mod notify;
pub mod risk;

pub use ledger::{Ledger, LedgerError, LedgerRecord};
pub use notify::{LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use risk::{Reference, RiskConfig};

use crate::broker::{Broker, OrderRequest, SyncStatus};
use crate::domain::{Candle, OrderId, Position};
use crate::strategy::{Action, Intent, OrderIntent, Strategy};
use rust_decimal::Decimal;
use std::mem;
use tracing::{debug, error, info, warn};

/// What one `close_trade` pass did to a strategy's positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseOutcome {
    /// Pending orders cancelled.
    pub cancelled: usize,
    /// Confirmed trades closed and booked.
    pub closed: usize,
    /// Confirmed trades the broker did not close; still held.
    pub failed: usize,
}

pub struct Portfolio {
    risk: RiskConfig,
    pending_order_list: Vec<Position>,
    position_list: Vec<Position>,
    realized: Vec<LedgerRecord>,
    ledger: Option<Ledger>,
    notifier: Box<dyn Notifier>,
}

impl Portfolio {
    pub fn new(risk: RiskConfig) -> Self {
        Self {
            risk,
            pending_order_list: Vec::new(),
            position_list: Vec::new(),
            realized: Vec::new(),
            ledger: None,
            notifier: Box::new(LogNotifier),
        }
    }

    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn pending(&self) -> &[Position] {
        &self.pending_order_list
    }

    pub fn confirmed(&self) -> &[Position] {
        &self.position_list
    }

    /// Ledger rows booked during this run, in close order.
    pub fn realized(&self) -> &[LedgerRecord] {
        &self.realized
    }

    pub fn overall_profit(&self) -> Decimal {
        self.realized.iter().map(|r| r.profit_cash).sum()
    }

    /// Size, protect and submit an order for `strategy`.
    ///
    /// In split mode two half-size legs are submitted; the first carries the
    /// take profit. Each leg that fills is tracked on its own. Returns true
    /// only when every leg filled.
    pub fn open_order(
        &mut self,
        broker: &mut dyn Broker,
        strategy: &mut dyn Strategy,
        intent: &OrderIntent,
    ) -> bool {
        let instrument = strategy.instrument().clone();
        let units = self.risk.position_size(&instrument);

        let reference = broker
            .get_price(&instrument)
            .map(|q| Reference { bid: q.bid, ask: q.ask })
            .or_else(|| intent.price.map(Reference::flat));
        let stop_loss = match (intent.stop_loss, reference) {
            (Some(price), _) => Some(price),
            (None, Some(reference)) if self.risk.use_stoploss_calc => {
                Some(self.risk.stop_loss_price(&instrument, intent.side, reference))
            }
            _ => None,
        };
        let take_profit = reference.map(|r| self.risk.take_profit_price(&instrument, intent.side, r));

        let mut request = OrderRequest {
            instrument,
            units,
            side: intent.side,
            order_type: intent.order_type,
            price: intent.price,
            expiry: intent.expiry,
            stop_loss,
            take_profit,
        };

        let split = self.risk.split_take_profit && units >= 2;
        if self.risk.split_take_profit && !split {
            warn!(instrument = %request.instrument, units, "too few units to split, opening one order");
        }
        if !split {
            let Some(position) = broker.open_order(&request) else {
                warn!(instrument = %request.instrument, side = %request.side, "order not opened");
                return false;
            };
            self.track_open(strategy, position, "");
            return true;
        }

        request.units = units / 2;
        let runner = OrderRequest {
            units: units - units / 2,
            take_profit: None,
            ..request.clone()
        };
        let mut all_filled = true;
        for (leg, request) in [("1/2 ", request), ("2/2 ", runner)] {
            match broker.open_order(&request) {
                Some(position) => self.track_open(strategy, position, leg),
                None => {
                    all_filled = false;
                    warn!(instrument = %request.instrument, leg = leg.trim(), "split leg not opened");
                }
            }
        }
        all_filled
    }

    fn track_open(&mut self, strategy: &mut dyn Strategy, position: Position, leg: &str) {
        strategy.positions_mut().attach(position.order_id);
        let message = format!(
            "Open {}{} ORDER #{} for {}/{} at {}",
            leg, position.side, position.order_id, position.instrument, position.open_price, position.open_time
        );
        info!(order_id = %position.order_id, instrument = %position.instrument, "{message}");
        self.send(&message);
        self.pending_order_list.push(position);
    }

    /// Close or cancel everything `strategy` holds.
    ///
    /// `price` is handed to the broker as the close hint. Ids the portfolio
    /// does not know are dropped from the strategy.
    pub fn close_trade(
        &mut self,
        broker: &mut dyn Broker,
        strategy: &mut dyn Strategy,
        price: Option<Decimal>,
    ) -> CloseOutcome {
        let mut outcome = CloseOutcome::default();
        let ids = strategy.positions().ids().to_vec();

        for id in ids {
            if let Some(index) = find(&self.pending_order_list, id) {
                if broker.delete_pending_order(&self.pending_order_list[index]) {
                    self.pending_order_list.remove(index);
                    strategy.positions_mut().remove(id);
                    outcome.cancelled += 1;
                    info!(order_id = %id, "pending order cancelled");
                }
            } else if let Some(index) = find(&self.position_list, id) {
                let position = &mut self.position_list[index];
                if price.is_some() {
                    position.close_price = price;
                }
                if !broker.close_trade(position) {
                    position.close_price = None;
                    outcome.failed += 1;
                    warn!(order_id = %id, "trade not closed, will retry");
                    continue;
                }
                position.mark_closed();
                let position = self.position_list.remove(index);
                strategy.positions_mut().remove(id);
                self.book(position);
                outcome.closed += 1;
            } else {
                debug!(order_id = %id, "dropping unknown position reference");
                strategy.positions_mut().remove(id);
            }
        }
        outcome
    }

    fn book(&mut self, position: Position) {
        let Some(record) = LedgerRecord::from_position(&position) else {
            error!(order_id = %position.order_id, "closed position is missing close fields");
            return;
        };
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.append(&record) {
                error!(path = %ledger.path().display(), error = %e, "ledger write failed");
            }
        }
        self.realized.push(record);

        let message = format!(
            "Close TRADE #{} for {}/{} at {} [PROFIT: {}/Total: {}]",
            position.transaction_id,
            position.instrument,
            position.close_price.unwrap_or_default(),
            position
                .close_time
                .map(|t| t.to_string())
                .unwrap_or_default(),
            position.profit_cash.unwrap_or_default(),
            self.overall_profit()
        );
        info!(order_id = %position.order_id, instrument = %position.instrument, "{message}");
        self.send(&message);
    }

    /// Widen the excursion of every position `strategy` holds.
    pub fn mark(&mut self, strategy: &dyn Strategy, candle: &Candle) {
        for id in strategy.positions().ids() {
            if let Some(position) = self
                .pending_order_list
                .iter_mut()
                .chain(self.position_list.iter_mut())
                .find(|p| p.order_id == *id)
            {
                position.record_excursion(candle);
            }
        }
    }

    /// Apply intents in arrival order, then reconcile pending orders.
    pub fn run_operations(
        &mut self,
        broker: &mut dyn Broker,
        intents: Vec<Intent>,
        strategies: &mut [Box<dyn Strategy>],
    ) {
        for intent in intents {
            let Some(strategy) = strategies.get_mut(intent.strategy.0) else {
                warn!(strategy = %intent.strategy, "intent for unknown strategy ignored");
                continue;
            };
            match intent.action {
                Action::Open(order) => {
                    self.open_order(broker, strategy.as_mut(), &order);
                }
                Action::Close { price } => {
                    self.close_trade(broker, strategy.as_mut(), price);
                }
                Action::Mark { candle } => self.mark(strategy.as_ref(), &candle),
            }
        }
        self.update_transactions(broker, strategies);
    }

    /// Sync every pending position once. CONFIRMED moves it to the position
    /// list, NOTFOUND forgets it everywhere, PENDING leaves it alone.
    pub fn update_transactions(&mut self, broker: &mut dyn Broker, strategies: &mut [Box<dyn Strategy>]) {
        for mut position in mem::take(&mut self.pending_order_list) {
            match broker.sync_transactions(&mut position) {
                SyncStatus::Pending => self.pending_order_list.push(position),
                SyncStatus::Confirmed => {
                    position.confirm();
                    info!(
                        order_id = %position.order_id,
                        transaction_id = %position.transaction_id,
                        open_price = %position.open_price,
                        "order confirmed"
                    );
                    self.position_list.push(position);
                }
                SyncStatus::NotFound => {
                    info!(order_id = %position.order_id, instrument = %position.instrument, "order not found, forgetting it");
                    for strategy in strategies.iter_mut() {
                        if strategy.positions_mut().remove(position.order_id) {
                            break;
                        }
                    }
                }
            }
        }
    }

    fn send(&self, message: &str) {
        if let Err(e) = self.notifier.notify(message) {
            warn!(error = %e, "notification failed");
        }
    }
}

fn find(list: &[Position], id: OrderId) -> Option<usize> {
    list.iter().position(|p| p.order_id == id)
}
