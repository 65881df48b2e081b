//! Runtime settings: a TOML file with environment overrides.
//!
//! Every section has defaults, so an empty file is a valid backtest
//! configuration. Live trading additionally needs the account credentials,
//! which are usually supplied through `TRADER_*` environment variables.

use crate::api::Environment;
use crate::data::RetryPolicy;
use crate::domain::{OrderType, Timeframe};
use crate::portfolio::RiskConfig;
use crate::strategy::{StrategyMode, TimeframeConfig};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid value for '{key}': {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub account: AccountSettings,
    pub clock: ClockSettings,
    pub backtest: BacktestSettings,
    pub portfolio: PortfolioSettings,
    pub strategy: StrategySettings,
    pub notify: NotifySettings,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub access_token: Option<String>,
    pub account_id: Option<String>,
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub interval_secs: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// `YYYY-MM-DD` or RFC 3339.
    pub start: String,
    pub end: String,
    pub initial_balance: Decimal,
    /// Cash per pip of profit; `units × pip` when unset.
    pub pip_cash_multiplier: Option<Decimal>,
    pub cache_dir: PathBuf,
    /// Overrides the strategy's own warmup requirement.
    pub warmup_candles: Option<usize>,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            start: "2015-07-15".into(),
            end: "2015-07-16".into(),
            initial_balance: Decimal::from(10_000),
            pip_cash_multiplier: None,
            cache_dir: PathBuf::from("data/cache"),
            warmup_candles: None,
        }
    }
}

impl BacktestSettings {
    pub fn start(&self) -> Result<DateTime<Utc>, ConfigError> {
        parse_timestamp("backtest.start", &self.start)
    }

    pub fn end(&self) -> Result<DateTime<Utc>, ConfigError> {
        parse_timestamp("backtest.end", &self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioSettings {
    pub ledger_dir: PathBuf,
    pub risk: RiskConfig,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            ledger_dir: PathBuf::from("logs"),
            risk: RiskConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub name: String,
    pub timeframes: Vec<Timeframe>,
    pub tick_timeframe: Timeframe,
    pub buffer_size: usize,
    pub include_current: bool,
    pub order_type: OrderType,
}

impl Default for StrategySettings {
    fn default() -> Self {
        let defaults = TimeframeConfig::default();
        Self {
            name: defaults.name,
            timeframes: defaults.timeframes,
            tick_timeframe: defaults.tick_timeframe,
            buffer_size: defaults.buffer_size,
            include_current: defaults.include_current,
            order_type: OrderType::Limit,
        }
    }
}

impl StrategySettings {
    pub fn timeframe_config(&self, mode: StrategyMode) -> TimeframeConfig {
        TimeframeConfig {
            name: self.name.clone(),
            timeframes: self.timeframes.clone(),
            tick_timeframe: self.tick_timeframe,
            buffer_size: self.buffer_size,
            include_current: self.include_current,
            mode,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl NotifySettings {
    /// Bot token and chat id, when both are configured.
    pub fn telegram(&self) -> Option<(&str, &str)> {
        Some((self.telegram_token.as_deref()?, self.telegram_chat_id.as_deref()?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub delay_secs: u64,
    /// Attempts for read-only calls; unbounded when unset.
    pub max_attempts: Option<u32>,
    /// Attempts for order submission and closes.
    pub mutation_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            delay_secs: RetryPolicy::DEFAULT_DELAY.as_secs(),
            max_attempts: None,
            mutation_attempts: RetryPolicy::MUTATION_ATTEMPTS,
        }
    }
}

impl RetrySettings {
    pub fn read_policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.delay_secs);
        match self.max_attempts {
            Some(max) => RetryPolicy::bounded(delay, max),
            None => RetryPolicy::unbounded(delay),
        }
    }

    pub fn write_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(Duration::from_secs(self.delay_secs), self.mutation_attempts)
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `TRADER_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = get("TRADER_ACCESS_TOKEN") {
            self.account.access_token = Some(token);
        }
        if let Some(account) = get("TRADER_ACCOUNT_ID") {
            self.account.account_id = Some(account);
        }
        if let Some(environment) = get("TRADER_ENVIRONMENT") {
            self.account.environment = environment
                .parse()
                .map_err(|value| ConfigError::InvalidValue {
                    key: "TRADER_ENVIRONMENT",
                    value,
                })?;
        }
        if let Some(token) = get("TRADER_TELEGRAM_TOKEN") {
            self.notify.telegram_token = Some(token);
        }
        if let Some(chat) = get("TRADER_TELEGRAM_CHAT_ID") {
            self.notify.telegram_chat_id = Some(chat);
        }
        Ok(())
    }

    /// Access token and account id, both required to reach the broker.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let token = self
            .account
            .access_token
            .as_deref()
            .ok_or(ConfigError::Missing("account.access_token"))?;
        let account = self
            .account
            .account_id
            .as_deref()
            .ok_or(ConfigError::Missing("account.account_id"))?;
        Ok((token, account))
    }

    pub fn clock_interval(&self) -> Result<Duration, ConfigError> {
        if self.clock.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "clock.interval_secs",
                value: "0".into(),
            });
        }
        Ok(Duration::from_secs(self.clock.interval_secs))
    }
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_timestamp(key: &'static str, value: &str) -> Result<DateTime<Utc>, ConfigError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}
