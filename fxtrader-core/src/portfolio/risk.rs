//! Static position sizing and protective-order tables.

use crate::domain::{Instrument, Side};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference prices for stop-loss / take-profit placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Reference {
    /// Both sides at one price, used when no live quote is available.
    pub fn flat(price: Decimal) -> Self {
        Self { bid: price, ask: price }
    }
}

/// Sizing and protective-order configuration, injected into the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub home_currency: String,
    /// Margin committed per position, in home currency.
    pub margin: Decimal,
    pub leverage: Decimal,
    /// Units when no `BASE_HOME` conversion rate is configured.
    pub fallback_units: u64,
    /// Derive a stop loss from the pip table when the intent carries none.
    pub use_stoploss_calc: bool,
    /// Open every position as two half-size legs: one with take profit, one runner.
    pub split_take_profit: bool,
    /// `BASE_HOME` → home-currency price of one base unit.
    pub conversion_rates: BTreeMap<String, Decimal>,
    /// Per-instrument unit multiplier, default 1.
    pub unit_multipliers: BTreeMap<String, u64>,
    pub stop_loss_pips: BTreeMap<String, Decimal>,
    pub default_stop_loss_pips: Decimal,
    pub take_profit_pips: BTreeMap<String, Decimal>,
    pub default_take_profit_pips: Decimal,
}

fn table<V: Copy>(entries: &[(&str, V)]) -> BTreeMap<String, V> {
    entries.iter().map(|&(k, v)| (k.to_string(), v)).collect()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            home_currency: "CHF".into(),
            margin: Decimal::from(1000),
            leverage: Decimal::from(50),
            fallback_units: 10,
            use_stoploss_calc: true,
            split_take_profit: false,
            conversion_rates: table(&[
                ("JP225_CHF", Decimal::from(12500)),
                ("DE30_CHF", Decimal::from(10000)),
                ("AUD_CHF", Decimal::new(68, 2)),
                ("BCO_CHF", Decimal::new(3846, 2)),
                ("NZD_CHF", Decimal::new(61101, 5)),
                ("XAU_CHF", Decimal::new(106382, 2)),
                ("CHF_CHF", Decimal::ONE),
                ("GBP_CHF", Decimal::new(14749, 4)),
                ("USD_CHF", Decimal::new(93586, 5)),
                ("EUR_CHF", Decimal::new(108053, 5)),
                ("XAG_CHF", Decimal::new(13736, 3)),
                ("HK33_CHF", Decimal::new(263157, 2)),
                ("UK100_CHF", Decimal::from(8333)),
            ]),
            unit_multipliers: table(&[
                ("EUR_USD", 2),
                ("EUR_GBP", 2),
                ("GBP_USD", 2),
                ("NZD_JPY", 2),
                ("USD_JPY", 2),
                ("GBP_CHF", 2),
                ("USD_CHF", 2),
                ("USD_CAD", 2),
                ("EUR_CHF", 2),
            ]),
            stop_loss_pips: table(&[
                ("XAG_USD", Decimal::from(350)),
                ("EUR_USD", Decimal::from(20)),
                ("UK100_GBP", Decimal::from(9)),
                ("NZD_JPY", Decimal::from(15)),
                ("BCO_USD", Decimal::from(40)),
                ("AUD_USD", Decimal::from(9)),
                ("DE30_EUR", Decimal::from(40)),
                ("HK33_USD", Decimal::from(70)),
                ("USD_JPY", Decimal::from(20)),
                ("XAU_USD", Decimal::from(300)),
            ]),
            default_stop_loss_pips: Decimal::from(20),
            take_profit_pips: table(&[
                ("AUD_USD", Decimal::from(27)),
                ("AUD_JPY", Decimal::from(8)),
                ("EUR_CHF", Decimal::from(10)),
                ("EUR_USD", Decimal::from(12)),
                ("EUR_GBP", Decimal::from(12)),
                ("GBP_CHF", Decimal::from(12)),
                ("GBP_USD", Decimal::from(15)),
                ("NZD_JPY", Decimal::from(8)),
                ("USD_CAD", Decimal::from(12)),
                ("USD_CHF", Decimal::from(15)),
                ("USD_JPY", Decimal::from(8)),
                ("BCO_USD", Decimal::from(25)),
                ("DE30_EUR", Decimal::from(20)),
                ("HK33_HKD", Decimal::from(9)),
                ("JP225_USD", Decimal::from(25)),
                ("UK100_GBP", Decimal::from(20)),
                ("XAG_USD", Decimal::from(340)),
                ("XAU_USD", Decimal::from(400)),
            ]),
            default_take_profit_pips: Decimal::from(20),
        }
    }
}

impl RiskConfig {
    /// `floor(margin × leverage / rate) × multiplier`, clamped to the
    /// instrument's maximum order size.
    pub fn position_size(&self, instrument: &Instrument) -> u64 {
        let base_home = format!("{}_{}", instrument.base, self.home_currency);
        let units = self
            .conversion_rates
            .get(&base_home)
            .filter(|rate| !rate.is_zero())
            .and_then(|rate| (self.margin * self.leverage / *rate).floor().to_u64())
            .unwrap_or(self.fallback_units);
        let multiplier = self
            .unit_multipliers
            .get(&instrument.symbol())
            .copied()
            .unwrap_or(1);
        units.saturating_mul(multiplier).min(instrument.max_order_units)
    }

    pub fn stop_loss_price(&self, instrument: &Instrument, side: Side, reference: Reference) -> Decimal {
        let pips = self
            .stop_loss_pips
            .get(&instrument.symbol())
            .copied()
            .unwrap_or(self.default_stop_loss_pips);
        let offset = instrument.pip_offset(pips);
        match side {
            Side::Buy => reference.bid - offset,
            Side::Sell => reference.ask + offset,
        }
    }

    pub fn take_profit_price(&self, instrument: &Instrument, side: Side, reference: Reference) -> Decimal {
        let pips = self
            .take_profit_pips
            .get(&instrument.symbol())
            .copied()
            .unwrap_or(self.default_take_profit_pips);
        let offset = instrument.pip_offset(pips);
        match side {
            Side::Buy => reference.ask + offset,
            Side::Sell => reference.bid - offset,
        }
    }
}
