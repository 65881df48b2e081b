//! Historical candle data: upstream paging, Parquet cache, backtest replay.
//!
//! Layers, bottom-up:
//! - `retry`: fixed-delay retry policy shared with the live broker
//! - `merge`: append-only dedup of overlapping pages
//! - `cache`: one Parquet artifact per (strategy, instrument, range)
//! - `loader`: pages the upstream API and fills the cache
//! - `feed`: in-memory slices served to the backtest broker

pub mod cache;
pub mod feed;
pub mod loader;
pub mod merge;
pub mod retry;

pub use cache::{ArtifactMeta, ArtifactStatus, CacheArtifact, CandleCache};
pub use feed::{BacktestFeed, InstrumentFeed};
pub use loader::{HistoryLoader, LoadRequest, PAGE_SIZE};
pub use merge::merge_candles;
pub use retry::RetryPolicy;

use crate::api::ApiError;
use crate::domain::{Timeframe, TimeframeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("cache error: {0}")]
    CacheError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error(transparent)]
    Timeframe(#[from] TimeframeError),

    #[error("upstream candles for {instrument} {timeframe} unavailable: {source}")]
    Upstream {
        instrument: String,
        timeframe: Timeframe,
        source: ApiError,
    },
}
