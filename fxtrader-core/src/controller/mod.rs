//! Controller: drives strategies and the portfolio from a clock.
//!
//! The first tick of the clock starts every strategy; each later tick sets
//! the broker's current time, polls the strategies in registration order,
//! and hands the tagged actions to the portfolio.

pub mod threaded;

pub use threaded::ThreadedController;

use crate::broker::Broker;
use crate::clock::Clock;
use crate::domain::StrategyId;
use crate::portfolio::Portfolio;
use crate::shutdown::StopHandle;
use crate::strategy::{Intent, Strategy};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ClockExhausted,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed, not counting the initializing tick.
    pub ticks: usize,
    pub last_tick: Option<DateTime<Utc>>,
    pub reason: StopReason,
}

pub struct Controller {
    clock: Box<dyn Clock>,
    broker: Box<dyn Broker>,
    portfolio: Portfolio,
    strategies: Vec<Box<dyn Strategy>>,
    stop: StopHandle,
}

impl Controller {
    pub fn new(
        clock: Box<dyn Clock>,
        broker: Box<dyn Broker>,
        portfolio: Portfolio,
        strategies: Vec<Box<dyn Strategy>>,
    ) -> Self {
        Self {
            clock,
            broker,
            portfolio,
            strategies,
            stop: StopHandle::new(),
        }
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn broker(&self) -> &dyn Broker {
        self.broker.as_ref()
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    pub fn initialize(&mut self, tick: DateTime<Utc>) {
        initialize(self.broker.as_mut(), &mut self.strategies, tick);
    }

    pub fn execute_tick(&mut self, tick: DateTime<Utc>) {
        execute_tick(self.broker.as_mut(), &mut self.portfolio, &mut self.strategies, tick);
    }

    /// Run on the calling thread until the clock runs out or a stop is
    /// requested. The stop flag is checked before and after every tick.
    pub fn run_until_stopped(&mut self) -> RunSummary {
        let Self {
            clock,
            broker,
            portfolio,
            strategies,
            stop,
        } = self;
        let mut summary = RunSummary {
            ticks: 0,
            last_tick: None,
            reason: StopReason::ClockExhausted,
        };

        let mut ticks = clock.ticks();
        if stop.is_stop_requested() {
            summary.reason = StopReason::StopRequested;
            return summary;
        }
        let Some(first) = ticks.next() else {
            info!("clock produced no ticks");
            return summary;
        };
        initialize(broker.as_mut(), strategies, first);
        summary.last_tick = Some(first);

        for tick in ticks {
            if stop.is_stop_requested() {
                break;
            }
            execute_tick(broker.as_mut(), portfolio, strategies, tick);
            summary.ticks += 1;
            summary.last_tick = Some(tick);
            if stop.is_stop_requested() {
                break;
            }
        }

        if stop.is_stop_requested() {
            summary.reason = StopReason::StopRequested;
            info!(ticks = summary.ticks, "stop requested, loop finished");
        } else {
            info!(ticks = summary.ticks, "the clock stopped ticking");
        }
        summary
    }
}

fn initialize(broker: &mut dyn Broker, strategies: &mut [Box<dyn Strategy>], tick: DateTime<Utc>) {
    broker.set_current_tick(tick);
    for strategy in strategies.iter_mut() {
        strategy.start(broker, tick);
    }
    info!(%tick, strategies = strategies.len(), "strategies started");
}

fn execute_tick(
    broker: &mut dyn Broker,
    portfolio: &mut Portfolio,
    strategies: &mut [Box<dyn Strategy>],
    tick: DateTime<Utc>,
) {
    broker.set_current_tick(tick);

    let mut intents = Vec::new();
    for (index, strategy) in strategies.iter_mut().enumerate() {
        let actions = strategy.tick(broker, tick);
        intents.extend(actions.into_iter().map(|action| Intent {
            strategy: StrategyId(index),
            action,
        }));
    }
    if !intents.is_empty() {
        debug!(%tick, intents = intents.len(), "running operations");
    }
    portfolio.run_operations(broker, intents, strategies);
}
