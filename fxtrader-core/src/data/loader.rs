//! Upstream candle paging and cache population for backtests.

use super::cache::CandleCache;
use super::feed::InstrumentFeed;
use super::merge::merge_candles;
use super::retry::RetryPolicy;
use super::DataError;
use crate::api::{ApiError, BrokerageApi, CandleRequest};
use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Candles requested per upstream page.
pub const PAGE_SIZE: u32 = 2000;

/// What one strategy needs preloaded.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub strategy: &'a str,
    pub instrument: &'a str,
    /// Ascending by duration.
    pub timeframes: &'a [Timeframe],
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Candles of history required before `start` on every timeframe.
    pub warmup_candles: usize,
}

pub struct HistoryLoader {
    api: Arc<dyn BrokerageApi>,
    retry: RetryPolicy,
    page_size: u32,
}

impl HistoryLoader {
    pub fn new(api: Arc<dyn BrokerageApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Load every timeframe of `request`, from the cache when present and
    /// from the upstream otherwise. Fresh fetches are written back.
    pub fn load(
        &self,
        cache: Option<&CandleCache>,
        request: &LoadRequest<'_>,
    ) -> Result<InstrumentFeed, DataError> {
        Timeframe::ensure_ascending(request.timeframes)?;
        if request.end <= request.start {
            return Err(DataError::ValidationError(format!(
                "backtest end {} is not after start {}",
                request.end, request.start
            )));
        }

        let mut artifact = cache
            .map(|c| c.open(request.strategy, request.instrument, request.start, request.end))
            .transpose()?;
        let mut feed = InstrumentFeed::new();

        for &timeframe in request.timeframes {
            let cached = match artifact.as_mut() {
                Some(a) => a.read(timeframe)?,
                None => None,
            };
            let candles = match cached {
                Some(candles) => {
                    info!(
                        instrument = request.instrument,
                        %timeframe,
                        candles = candles.len(),
                        "loaded candles from cache"
                    );
                    candles
                }
                None => {
                    let from = request.start - lookback(timeframe, request.warmup_candles);
                    let fetched =
                        self.fetch_range(request.instrument, timeframe, from, request.end)?;
                    info!(
                        instrument = request.instrument,
                        %timeframe,
                        candles = fetched.len(),
                        "fetched candles from upstream"
                    );
                    match artifact.as_mut() {
                        Some(a) if !fetched.is_empty() => a.write(timeframe, &fetched)?,
                        Some(_) => warn!(
                            instrument = request.instrument,
                            %timeframe,
                            "upstream returned no candles, nothing cached"
                        ),
                        None => {}
                    }
                    fetched
                }
            };
            feed.insert(timeframe, candles);
        }

        if let Some(artifact) = artifact {
            artifact.finish()?;
        }
        Ok(feed)
    }

    /// Page `[start, end]` from the upstream into one deduplicated series.
    ///
    /// Paging starts one second before `start` and continues from the last
    /// accepted candle until it reaches `end`, the upstream runs dry, or a
    /// page makes no progress. The result is trimmed to `time <= end`.
    ///
    /// A page that stays unavailable after the retry policy gives up fails
    /// the whole range, so a partial series is never returned.
    pub fn fetch_range(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        let mut series = Vec::new();
        let mut cursor = start - Duration::seconds(1);

        loop {
            let page = self.page(instrument, timeframe, cursor)?;
            if page.is_empty() {
                break;
            }
            let accepted = merge_candles(&mut series, page.into_iter().filter(|c| c.complete));
            let Some(last) = series.last() else {
                break;
            };
            if last.time >= end || accepted == 0 {
                break;
            }
            cursor = last.time;
        }

        series.retain(|c| c.time <= end);
        Ok(series)
    }

    fn page(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        let request = CandleRequest {
            instrument: instrument.to_string(),
            timeframe,
            start: Some(from),
            end: None,
            count: Some(self.page_size),
            include_first: false,
        };
        match self.retry.run("candles", || self.api.candles(&request)) {
            Ok(candles) => Ok(candles),
            Err(ApiError::Malformed(reason)) => {
                warn!(instrument, %timeframe, %reason, "malformed candle page, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(instrument, %timeframe, error = %e, "candle page unavailable, aborting fetch");
                Err(DataError::Upstream {
                    instrument: instrument.to_string(),
                    timeframe,
                    source: e,
                })
            }
        }
    }
}

fn lookback(timeframe: Timeframe, warmup_candles: usize) -> Duration {
    let candles = i64::try_from(warmup_candles).unwrap_or(i64::MAX);
    Duration::seconds(timeframe.seconds().saturating_mul(candles))
}
