//! In-memory candle series replayed by the backtest broker.

use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// All loaded timeframes of one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentFeed {
    series: BTreeMap<Timeframe, Vec<Candle>>,
}

impl InstrumentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the series for `timeframe`. Candles must be ascending by time.
    pub fn insert(&mut self, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series.insert(timeframe, candles);
    }

    pub fn series(&self, timeframe: Timeframe) -> &[Candle] {
        self.series.get(&timeframe).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.series.keys().copied()
    }

    pub fn finest(&self) -> Option<Timeframe> {
        self.series.keys().next().copied()
    }

    /// Complete candles with `start < time` and `time + duration <= end`, plus
    /// the in-progress candle of the current window when `include_current`.
    pub fn history(
        &self,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_current: bool,
    ) -> Vec<Candle> {
        let mut candles: Vec<Candle> = closed_between(self.series(timeframe), timeframe, start, end)
            .filter(|c| c.complete)
            .cloned()
            .collect();
        if include_current {
            if let Some(current) = self.in_progress(timeframe, start, end) {
                candles.push(current);
            }
        }
        candles
    }

    /// Aggregate of the finest candles that have closed inside the coarse
    /// window containing `end`. Only for timeframes coarser than the finest.
    fn in_progress(
        &self,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Candle> {
        let finest = self.finest()?;
        if timeframe <= finest {
            return None;
        }
        let window = timeframe.window_start(end);
        if window <= start {
            return None;
        }
        let series = self.series(finest);
        let from = series.partition_point(|c| c.time < window);
        let to = series.partition_point(|c| c.time + finest.duration() <= end);
        Candle::aggregate(window, &series[from..to.max(from)])
    }

    /// The most recent finest-timeframe candle closed by `at`.
    pub fn latest_closed(&self, at: DateTime<Utc>) -> Option<&Candle> {
        let finest = self.finest()?;
        let series = self.series(finest);
        let closed = series.partition_point(|c| c.time + finest.duration() <= at);
        closed.checked_sub(1).map(|i| &series[i])
    }
}

fn closed_between(
    series: &[Candle],
    timeframe: Timeframe,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> impl Iterator<Item = &Candle> {
    let from = series.partition_point(|c| c.time <= start);
    series[from..]
        .iter()
        .take_while(move |c| c.time + timeframe.duration() <= end)
}

/// Loaded feeds for every traded instrument, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct BacktestFeed {
    instruments: HashMap<String, InstrumentFeed>,
}

impl BacktestFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, feed: InstrumentFeed) {
        self.instruments.insert(symbol.into(), feed);
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentFeed> {
        self.instruments.get(symbol)
    }
}
