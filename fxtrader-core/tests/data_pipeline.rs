//! Historical data pipeline: upstream paging → merge → Parquet cache → replay.

mod common;

use chrono::Duration;
use common::{series, t0, ScriptedApi};
use fxtrader_core::data::{CandleCache, DataError, HistoryLoader, LoadRequest, RetryPolicy};
use fxtrader_core::domain::Timeframe;
use std::time::Duration as StdDuration;

const WARMUP: usize = 1000;

fn five_day_window() -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
    let start = t0() + Duration::minutes(5 * WARMUP as i64);
    (start, start + Duration::days(5))
}

#[test]
fn overlapping_pages_merge_into_one_series() {
    let (start, end) = five_day_window();
    // Upstream has data well past the window and repeats the cursor candle
    // at the head of every page.
    let api = ScriptedApi::with(|s| {
        s.series.insert(Timeframe::M5, series(Timeframe::M5, t0(), 4000));
        s.overlap_pages = true;
    });
    let loader = HistoryLoader::new(api.clone(), RetryPolicy::bounded(StdDuration::ZERO, 1));
    let request = LoadRequest {
        strategy: "last_candle",
        instrument: "EUR_USD",
        timeframes: &[Timeframe::M5],
        start,
        end,
        warmup_candles: WARMUP,
    };

    let feed = loader.load(None, &request).unwrap();
    let candles = feed.series(Timeframe::M5);

    // 1000 warmup candles, 1440 in the window, and the candle at `end`.
    assert_eq!(candles.len(), WARMUP + 1440 + 1);
    assert_eq!(candles.first().unwrap().time, t0());
    assert_eq!(candles.last().unwrap().time, end);
    assert!(candles
        .windows(2)
        .all(|w| w[1].time - w[0].time == Duration::minutes(5)));

    let state = api.state();
    assert_eq!(state.candle_requests.len(), 2);
    assert_eq!(state.candle_requests[0].start, Some(t0() - Duration::seconds(1)));
    assert_eq!(state.candle_requests[0].count, Some(2000));
    assert_eq!(state.candle_requests[1].start, Some(candles[1999].time));
}

#[test]
fn cached_artifact_replaces_the_upstream_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CandleCache::new(dir.path());
    let (start, end) = five_day_window();
    let api = ScriptedApi::with(|s| {
        s.series.insert(Timeframe::M5, series(Timeframe::M5, t0(), 4000));
        s.series.insert(Timeframe::H1, series(Timeframe::H1, t0(), 400));
    });
    let loader = HistoryLoader::new(api.clone(), RetryPolicy::bounded(StdDuration::ZERO, 1));
    let request = LoadRequest {
        strategy: "last_candle",
        instrument: "EUR_USD",
        timeframes: &[Timeframe::M5, Timeframe::H1],
        start,
        end,
        warmup_candles: WARMUP,
    };

    let first = loader.load(Some(&cache), &request).unwrap();
    let upstream_calls = api.state().candle_requests.len();
    assert!(upstream_calls >= 2);

    let second = loader.load(Some(&cache), &request).unwrap();
    assert_eq!(second, first);
    assert_eq!(api.state().candle_requests.len(), upstream_calls);

    // H1 warmup reaches before the upstream's first candle; the series
    // starts at the first one available and stops at the last hour <= end.
    let hourly = first.series(Timeframe::H1);
    assert_eq!(hourly.first().unwrap().time, t0());
    let last = hourly.last().unwrap().time;
    assert!(last <= end && end - last < Duration::hours(1));

    let artifacts = cache.status().unwrap();
    assert_eq!(artifacts.len(), 1);
    let meta = &artifacts[0].meta;
    assert_eq!(meta.strategy, "last_candle");
    assert_eq!(meta.instrument, "EUR_USD");
    assert_eq!(meta.start, start);
    assert_eq!(meta.end, end);
    assert_eq!(meta.timeframes.len(), 2);
}

#[test]
fn outage_mid_fetch_leaves_nothing_cached() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CandleCache::new(dir.path());
    let (start, end) = five_day_window();
    let request = LoadRequest {
        strategy: "last_candle",
        instrument: "EUR_USD",
        timeframes: &[Timeframe::M5],
        start,
        end,
        warmup_candles: WARMUP,
    };

    let flaky = ScriptedApi::with(|s| {
        s.series.insert(Timeframe::M5, series(Timeframe::M5, t0(), 4000));
        s.pages_before_outage = Some(1);
    });
    let failed = HistoryLoader::new(flaky.clone(), RetryPolicy::bounded(StdDuration::ZERO, 1))
        .load(Some(&cache), &request);
    assert!(matches!(failed, Err(DataError::Upstream { .. })));
    assert_eq!(flaky.state().candle_requests.len(), 2);
    assert!(cache.status().unwrap().is_empty());

    let healthy = ScriptedApi::with(|s| {
        s.series.insert(Timeframe::M5, series(Timeframe::M5, t0(), 4000));
    });
    let feed = HistoryLoader::new(healthy.clone(), RetryPolicy::bounded(StdDuration::ZERO, 1))
        .load(Some(&cache), &request)
        .unwrap();
    let candles = feed.series(Timeframe::M5);
    assert_eq!(candles.len(), WARMUP + 1440 + 1);
    assert_eq!(candles.last().unwrap().time, end);
    assert_eq!(healthy.state().candle_requests.len(), 2);
    assert_eq!(cache.status().unwrap()[0].meta.timeframes["M5"].candles, candles.len());
}

#[test]
fn replay_serves_only_closed_candles() {
    let (start, end) = five_day_window();
    let api = ScriptedApi::with(|s| {
        s.series.insert(Timeframe::M5, series(Timeframe::M5, t0(), 4000));
    });
    let loader = HistoryLoader::new(api, RetryPolicy::bounded(StdDuration::ZERO, 1));
    let request = LoadRequest {
        strategy: "last_candle",
        instrument: "EUR_USD",
        timeframes: &[Timeframe::M5],
        start,
        end,
        warmup_candles: WARMUP,
    };
    let feed = loader.load(None, &request).unwrap();

    let tick = start + Duration::minutes(7);
    let history = feed.history(Timeframe::M5, tick - Duration::minutes(30), tick, false);
    assert_eq!(history.len(), 5);
    assert_eq!(history.last().unwrap().time, start);
    assert_eq!(feed.latest_closed(tick).unwrap().time, start);
}
