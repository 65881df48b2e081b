//! Parquet candle cache.
//!
//! Layout: `{cache_dir}/{strategy}/{instrument}/{start}_{end}/{TF}.parquet`
//!
//! Features:
//! - One artifact per (strategy, instrument, range), shared by all timeframes
//! - Atomic writes (write to .tmp, rename into place)
//! - Prices stored as exact decimal strings
//! - Integrity check against the sidecar hash on load
//! - Quarantine for corrupt files ({TF}.parquet.quarantined)
//! - Metadata sidecar `meta.json` (range, per-timeframe counts and hashes)

use super::DataError;
use crate::domain::{parse_decimal, Candle, Timeframe};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const META_FILE: &str = "meta.json";
const RANGE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const PRICE_COLUMNS: [&str; 8] = [
    "open_bid",
    "open_ask",
    "high_bid",
    "high_ask",
    "low_bid",
    "low_ask",
    "close_bid",
    "close_ask",
];

/// Per-timeframe entry of the metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeMeta {
    pub candles: usize,
    pub data_hash: String,
}

/// Metadata sidecar for one cache artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub strategy: String,
    pub instrument: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Keyed by timeframe code.
    pub timeframes: BTreeMap<String, TimeframeMeta>,
    pub cached_at: DateTime<Utc>,
}

/// Summary row for `cache status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub path: PathBuf,
    pub meta: ArtifactMeta,
}

/// The cache root.
pub struct CandleCache {
    cache_dir: PathBuf,
}

impl CandleCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn artifact_dir(
        &self,
        strategy: &str,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PathBuf {
        self.cache_dir.join(strategy).join(instrument).join(format!(
            "{}_{}",
            start.format(RANGE_FORMAT),
            end.format(RANGE_FORMAT)
        ))
    }

    /// Open (creating if needed) the artifact for one strategy and instrument.
    pub fn open(
        &self,
        strategy: &str,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CacheArtifact, DataError> {
        let dir = self.artifact_dir(strategy, instrument, start, end);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let meta = match read_meta(&dir) {
            Some(meta) => meta,
            None => ArtifactMeta {
                strategy: strategy.to_string(),
                instrument: instrument.to_string(),
                start,
                end,
                timeframes: BTreeMap::new(),
                cached_at: Utc::now(),
            },
        };
        Ok(CacheArtifact {
            dir,
            meta,
            dirty: false,
        })
    }

    /// Every finished artifact under the cache root, sorted by path.
    pub fn status(&self) -> Result<Vec<ArtifactStatus>, DataError> {
        let mut found = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(found);
        }
        for strategy in subdirs(&self.cache_dir)? {
            for instrument in subdirs(&strategy)? {
                for range in subdirs(&instrument)? {
                    if let Some(meta) = read_meta(&range) {
                        found.push(ArtifactStatus { path: range, meta });
                    }
                }
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let entries =
        fs::read_dir(dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?
            .path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn read_meta(dir: &Path) -> Option<ArtifactMeta> {
    let content = fs::read_to_string(dir.join(META_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

/// One open artifact. Read and write timeframes, then [`finish`](Self::finish).
pub struct CacheArtifact {
    dir: PathBuf,
    meta: ArtifactMeta,
    dirty: bool,
}

impl CacheArtifact {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }

    fn timeframe_path(&self, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{timeframe}.parquet"))
    }

    /// Cached candles for `timeframe`, or `None` on a miss.
    ///
    /// A file that fails to decode or whose content hash disagrees with the
    /// sidecar is quarantined and reported as a miss.
    pub fn read(&mut self, timeframe: Timeframe) -> Result<Option<Vec<Candle>>, DataError> {
        let path = self.timeframe_path(timeframe);
        if !path.exists() {
            return Ok(None);
        }

        let expected = self.meta.timeframes.get(timeframe.code()).map(|m| m.data_hash.clone());
        let loaded = load_parquet(&path).and_then(|candles| match expected {
            Some(hash) if hash != content_hash(&candles) => {
                Err(DataError::ValidationError("content hash mismatch".into()))
            }
            _ => Ok(candles),
        });

        match loaded {
            Ok(candles) => {
                debug!(path = %path.display(), candles = candles.len(), "cache hit");
                Ok(Some(candles))
            }
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                let _ = fs::rename(&path, &quarantine);
                if self.meta.timeframes.remove(timeframe.code()).is_some() {
                    self.dirty = true;
                }
                Ok(None)
            }
        }
    }

    /// Store the candles for `timeframe`. Writes are atomic.
    pub fn write(&mut self, timeframe: Timeframe, candles: &[Candle]) -> Result<(), DataError> {
        if candles.is_empty() {
            return Err(DataError::CacheError("no candles to cache".into()));
        }

        let mut df = candles_to_dataframe(candles)?;
        let path = self.timeframe_path(timeframe);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        self.meta.timeframes.insert(
            timeframe.code().to_string(),
            TimeframeMeta {
                candles: candles.len(),
                data_hash: content_hash(candles),
            },
        );
        self.dirty = true;
        Ok(())
    }

    /// Write the sidecar if anything changed.
    pub fn finish(mut self) -> Result<ArtifactMeta, DataError> {
        if self.dirty {
            self.meta.cached_at = Utc::now();
            let json = serde_json::to_string_pretty(&self.meta)
                .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
            let path = self.dir.join(META_FILE);
            let tmp_path = path.with_extension("json.tmp");
            fs::write(&tmp_path, json)
                .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
            fs::rename(&tmp_path, &path)
                .map_err(|e| DataError::CacheError(format!("meta rename: {e}")))?;
        }
        Ok(self.meta)
    }
}

/// BLAKE3 over the exact stored representation of each candle.
fn content_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(&c.time.timestamp_millis().to_le_bytes());
        for price in prices(c) {
            hasher.update(price.to_string().as_bytes());
            hasher.update(b"|");
        }
        hasher.update(&c.volume.to_le_bytes());
        hasher.update(&[u8::from(c.complete)]);
    }
    hasher.finalize().to_hex().to_string()
}

fn prices(c: &Candle) -> [Decimal; 8] {
    [
        c.open_bid,
        c.open_ask,
        c.high_bid,
        c.high_ask,
        c.low_bid,
        c.low_ask,
        c.close_bid,
        c.close_ask,
    ]
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn candles_to_dataframe(candles: &[Candle]) -> Result<DataFrame, DataError> {
    let times: Vec<i64> = candles.iter().map(|c| c.time.timestamp_millis()).collect();
    let volumes: Vec<u64> = candles.iter().map(|c| c.volume).collect();
    let complete: Vec<bool> = candles.iter().map(|c| c.complete).collect();

    let mut columns = vec![Column::new("time".into(), times)];
    for (i, name) in PRICE_COLUMNS.iter().enumerate() {
        let values: Vec<String> = candles.iter().map(|c| prices(c)[i].to_string()).collect();
        columns.push(Column::new((*name).into(), values));
    }
    columns.push(Column::new("volume".into(), volumes));
    columns.push(Column::new("complete".into(), complete));

    DataFrame::new(columns).map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_parquet(path: &Path) -> Result<Vec<Candle>, DataError> {
    let df = LazyFrame::scan_parquet(path, Default::default())
        .map_err(|e| DataError::ParquetError(format!("scan: {e}")))?
        .sort(["time"], SortMultipleOptions::default().with_maintain_order(true))
        .collect()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }
    dataframe_to_candles(&df)
}

fn dataframe_to_candles(df: &DataFrame) -> Result<Vec<Candle>, DataError> {
    let column = |name: &str| {
        df.column(name)
            .map_err(|_| DataError::ValidationError(format!("missing column '{name}'")))
    };
    let type_err = |name: &str, e: PolarsError| {
        DataError::ParquetError(format!("{name} column type: {e}"))
    };

    let time_ca = column("time")?.i64().map_err(|e| type_err("time", e))?;
    let volume_ca = column("volume")?.u64().map_err(|e| type_err("volume", e))?;
    let complete_ca = column("complete")?.bool().map_err(|e| type_err("complete", e))?;
    let mut price_cas = Vec::with_capacity(PRICE_COLUMNS.len());
    for name in PRICE_COLUMNS {
        price_cas.push(column(name)?.str().map_err(|e| type_err(name, e))?);
    }

    let mut candles = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let millis = time_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null time at row {i}")))?;
        let time = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| DataError::ValidationError(format!("invalid time {millis} at row {i}")))?;

        let mut p = [Decimal::ZERO; 8];
        for (slot, (ca, name)) in p.iter_mut().zip(price_cas.iter().zip(PRICE_COLUMNS)) {
            let raw = ca
                .get(i)
                .ok_or_else(|| DataError::ParquetError(format!("null {name} at row {i}")))?;
            *slot = parse_decimal(raw)
                .map_err(|e| DataError::ValidationError(format!("{name} at row {i}: {e}")))?;
        }

        candles.push(Candle {
            time,
            open_bid: p[0],
            open_ask: p[1],
            high_bid: p[2],
            high_ask: p[3],
            low_bid: p[4],
            low_ask: p[5],
            close_bid: p[6],
            close_ask: p[7],
            volume: volume_ca.get(i).unwrap_or(0),
            complete: complete_ca.get(i).unwrap_or(true),
        });
    }

    if candles.windows(2).any(|w| w[1].time <= w[0].time) {
        return Err(DataError::ValidationError("candles not strictly ascending".into()));
    }
    Ok(candles)
}
