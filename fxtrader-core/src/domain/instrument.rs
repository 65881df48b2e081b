use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Currency pair metadata, immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
    /// Minimum price increment, e.g. `0.0001` for EUR/USD.
    pub pip: Decimal,
    pub max_order_units: u64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("'{0}' is not a BASE_QUOTE instrument symbol")]
    InvalidSymbol(String),

    #[error("pip for {symbol} must be positive, got {pip}")]
    InvalidPip { symbol: String, pip: Decimal },

    #[error("instrument {0} registered twice")]
    Duplicate(String),
}

impl Instrument {
    pub fn new(
        base: impl Into<String>,
        quote: impl Into<String>,
        pip: Decimal,
        max_order_units: u64,
    ) -> Result<Self, InstrumentError> {
        let instrument = Self {
            base: base.into(),
            quote: quote.into(),
            pip,
            max_order_units,
        };
        if pip <= Decimal::ZERO {
            return Err(InstrumentError::InvalidPip {
                symbol: instrument.symbol(),
                pip,
            });
        }
        Ok(instrument)
    }

    /// Build from an upstream `EUR_USD` symbol.
    pub fn from_symbol(
        symbol: &str,
        pip: Decimal,
        max_order_units: u64,
    ) -> Result<Self, InstrumentError> {
        let (base, quote) = split_symbol(symbol)?;
        Self::new(base, quote, pip, max_order_units)
    }

    pub fn symbol(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }

    /// Decimal places of the pip; submitted prices are rounded to this.
    pub fn display_precision(&self) -> u32 {
        self.pip.normalize().scale()
    }

    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp(self.display_precision())
    }

    /// Signed distance `to - from` expressed in pips.
    pub fn pips_between(&self, from: Decimal, to: Decimal) -> Decimal {
        (to - from) / self.pip
    }

    /// `pips` pips expressed as a price offset.
    pub fn pip_offset(&self, pips: Decimal) -> Decimal {
        pips * self.pip
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

fn split_symbol(symbol: &str) -> Result<(&str, &str), InstrumentError> {
    let invalid = || InstrumentError::InvalidSymbol(symbol.to_string());
    let (base, quote) = symbol.split_once('_').ok_or_else(invalid)?;
    let valid_leg = |leg: &str| !leg.is_empty() && leg.chars().all(|c| c.is_ascii_alphanumeric());
    if valid_leg(base) && valid_leg(quote) {
        Ok((base, quote))
    } else {
        Err(invalid())
    }
}

/// Instruments loaded for a session, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    by_symbol: BTreeMap<String, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instrument. Registering the same symbol twice is an error.
    pub fn register(&mut self, instrument: Instrument) -> Result<&Instrument, InstrumentError> {
        let symbol = instrument.symbol();
        if self.by_symbol.contains_key(&symbol) {
            return Err(InstrumentError::Duplicate(symbol));
        }
        Ok(self.by_symbol.entry(symbol).or_insert(instrument))
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.by_symbol.get(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.by_symbol.values()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}
