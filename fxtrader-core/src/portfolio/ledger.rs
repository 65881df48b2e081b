//! Append-only CSV ledger of realized trades.

use crate::domain::{Position, PositionStatus, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One row per closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub instrument: String,
    pub side: Side,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub profit_cash: Decimal,
    pub profit_pips: Decimal,
    pub max_profit_pips: Decimal,
    pub max_loss_pips: Decimal,
}

impl LedgerRecord {
    /// `None` unless the position is closed with its close fields filled in.
    pub fn from_position(position: &Position) -> Option<Self> {
        if position.status != PositionStatus::Closed {
            return None;
        }
        Some(Self {
            open_time: position.open_time,
            close_time: position.close_time?,
            instrument: position.instrument.symbol(),
            side: position.side,
            open_price: position.open_price,
            close_price: position.close_price?,
            profit_cash: position.profit_cash?,
            profit_pips: position.profit_pips?,
            max_profit_pips: position.max_profit_pips,
            max_loss_pips: position.max_loss_pips,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{dir}/backtest_log-{%Y%m%d-%H%M%S}.csv`, stamped with the local start time.
    pub fn default_path(dir: impl AsRef<Path>) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        dir.as_ref().join(format!("backtest_log-{stamp}.csv"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row; the header is written only when the file is new.
    pub fn append(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let fresh = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }

    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<LedgerRecord>, LedgerError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        reader
            .deserialize()
            .collect::<Result<Vec<LedgerRecord>, csv::Error>>()
            .map_err(LedgerError::from)
    }
}
