//! Multi-timeframe strategy shell around a [`SignalGenerator`].

use super::signal::{Feeds, SignalGenerator};
use super::{Action, OpenSet, Strategy};
use crate::broker::{Broker, HistoryQuery};
use crate::domain::{Instrument, Timeframe, TimeframeError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error(transparent)]
    Timeframe(#[from] TimeframeError),

    #[error("tick timeframe {0} must be one of the strategy's timeframes")]
    TickTimeframeMissing(Timeframe),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Decide only when a full tick-timeframe candle has elapsed.
    #[default]
    Backtest,
    /// Decide on every clock tick.
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeframeConfig {
    pub name: String,
    pub timeframes: Vec<Timeframe>,
    pub tick_timeframe: Timeframe,
    /// Candles requested per timeframe on each poll.
    pub buffer_size: usize,
    pub include_current: bool,
    pub mode: StrategyMode,
}

impl Default for TimeframeConfig {
    fn default() -> Self {
        Self {
            name: "last_candle".into(),
            timeframes: vec![Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::H2],
            tick_timeframe: Timeframe::M5,
            buffer_size: 300,
            include_current: false,
            mode: StrategyMode::Backtest,
        }
    }
}

/// Polls each timeframe's history, feeds changed series to the generator,
/// and asks it for open or close actions.
///
/// Nothing is decided unless at least one timeframe produced a candle newer
/// than the last one seen; a lapse in market data leaves the strategy idle.
pub struct TimeframeStrategy<G> {
    config: TimeframeConfig,
    instrument: Instrument,
    generator: G,
    positions: OpenSet,
    last_tick: Option<DateTime<Utc>>,
    last_polls: BTreeMap<Timeframe, DateTime<Utc>>,
    last_candles: BTreeMap<Timeframe, DateTime<Utc>>,
    feeds: Feeds,
}

impl<G: SignalGenerator> TimeframeStrategy<G> {
    pub fn new(config: TimeframeConfig, instrument: Instrument, generator: G) -> Result<Self, StrategyError> {
        Timeframe::ensure_ascending(&config.timeframes)?;
        if !config.timeframes.contains(&config.tick_timeframe) {
            return Err(StrategyError::TickTimeframeMissing(config.tick_timeframe));
        }
        Ok(Self {
            config,
            instrument,
            generator,
            positions: OpenSet::new(),
            last_tick: None,
            last_polls: BTreeMap::new(),
            last_candles: BTreeMap::new(),
            feeds: Feeds::new(),
        })
    }

    pub fn config(&self) -> &TimeframeConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn feeds(&self) -> &Feeds {
        &self.feeds
    }

    fn tick_due(&mut self, tick: DateTime<Utc>) -> bool {
        match self.config.mode {
            StrategyMode::Live => true,
            StrategyMode::Backtest => {
                let due = self
                    .last_tick
                    .map_or(true, |last| tick - last >= self.config.tick_timeframe.duration());
                if due {
                    self.last_tick = Some(tick);
                }
                due
            }
        }
    }

    fn poll_due(&mut self, timeframe: Timeframe, tick: DateTime<Utc>) -> bool {
        if self.config.mode == StrategyMode::Live || self.config.include_current {
            return true;
        }
        let due = self
            .last_polls
            .get(&timeframe)
            .map_or(true, |last| tick - *last >= timeframe.duration());
        if due {
            self.last_polls.insert(timeframe, tick);
        }
        due
    }

    /// Record the newest candle time; true if it advanced.
    fn advanced(&mut self, timeframe: Timeframe, newest: Option<DateTime<Utc>>) -> bool {
        let Some(newest) = newest else {
            return false;
        };
        match self.last_candles.get(&timeframe) {
            Some(seen) if newest <= *seen => false,
            _ => {
                self.last_candles.insert(timeframe, newest);
                true
            }
        }
    }

    fn query(&self, timeframe: Timeframe, tick: DateTime<Utc>) -> HistoryQuery {
        let span = i64::try_from(self.config.buffer_size + 1).unwrap_or(i64::MAX);
        let start = tick - Duration::seconds(timeframe.seconds().saturating_mul(span)) + Duration::seconds(1);
        HistoryQuery {
            instrument: self.instrument.symbol(),
            timeframe,
            start,
            end: tick,
            include_current: self.config.include_current,
        }
    }
}

impl<G: SignalGenerator> Strategy for TimeframeStrategy<G> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn timeframes(&self) -> &[Timeframe] {
        &self.config.timeframes
    }

    fn warmup_candles(&self) -> usize {
        self.config.buffer_size + 1
    }

    fn start(&mut self, _broker: &dyn Broker, tick: DateTime<Utc>) {
        self.last_tick = Some(tick);
        self.feeds.clear();
        for &timeframe in &self.config.timeframes {
            self.last_polls.insert(timeframe, tick);
            self.last_candles.insert(timeframe, tick - Duration::seconds(1));
        }
    }

    fn tick(&mut self, broker: &dyn Broker, tick: DateTime<Utc>) -> Vec<Action> {
        if !self.tick_due(tick) {
            return Vec::new();
        }

        // The tick timeframe goes first so coarser in-progress candles,
        // whose timestamp stays put, can follow its changes.
        let primary = self.config.tick_timeframe;
        let order: Vec<Timeframe> = iter::once(primary)
            .chain(self.config.timeframes.iter().copied().filter(|tf| *tf != primary))
            .collect();

        let mut primary_changed = false;
        let mut changed = false;
        for timeframe in order {
            if !self.poll_due(timeframe, tick) {
                continue;
            }
            let candles = broker.get_history(&self.query(timeframe, tick));
            let advanced = self.advanced(timeframe, candles.last().map(|c| c.time));
            let tf_changed = if timeframe == primary {
                primary_changed = advanced;
                advanced
            } else {
                advanced || (self.config.include_current && primary_changed && !candles.is_empty())
            };
            if tf_changed {
                changed = true;
                self.generator.annotate(timeframe, &candles);
                self.feeds.insert(timeframe, candles);
            }
        }

        if !changed {
            debug!(strategy = %self.config.name, %tick, "no new candles");
            return Vec::new();
        }

        if !self.is_open() {
            return self.generator.open_signal(&self.feeds, tick);
        }

        let mut actions = Vec::new();
        if let Some(candle) = self.feeds.get(&primary).and_then(|c| c.last()) {
            actions.push(Action::Mark { candle: candle.clone() });
        }
        let close = self.generator.close_signal(&self.feeds, tick);
        if !close.is_empty() {
            actions.extend(close);
            actions.extend(self.generator.open_signal(&self.feeds, tick));
        }
        actions
    }

    fn positions(&self) -> &OpenSet {
        &self.positions
    }

    fn positions_mut(&mut self) -> &mut OpenSet {
        &mut self.positions
    }
}
