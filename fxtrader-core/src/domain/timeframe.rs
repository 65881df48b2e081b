//! Candle granularities.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Candle granularity, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    S5,
    M1,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    D,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("unknown timeframe '{0}'")]
    Unknown(String),

    #[error("no timeframes given")]
    Empty,

    #[error("timeframes must be strictly ascending, {later} follows {earlier}")]
    NotAscending { earlier: Timeframe, later: Timeframe },
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::S5,
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::D,
    ];

    pub const fn seconds(self) -> i64 {
        match self {
            Timeframe::S5 => 5,
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H2 => 7_200,
            Timeframe::H4 => 14_400,
            Timeframe::D => 86_400,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Broker granularity code, e.g. `"M5"`.
    pub const fn code(self) -> &'static str {
        match self {
            Timeframe::S5 => "S5",
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H2 => "H2",
            Timeframe::H4 => "H4",
            Timeframe::D => "D",
        }
    }

    /// Start of the candle window containing `time`, aligned to the epoch.
    pub fn window_start(self, time: DateTime<Utc>) -> DateTime<Utc> {
        let secs = time.timestamp();
        let aligned = secs - secs.rem_euclid(self.seconds());
        DateTime::from_timestamp(aligned, 0).unwrap_or(time)
    }

    /// Validate a strategy's timeframe list: non-empty, strictly ascending.
    pub fn ensure_ascending(timeframes: &[Timeframe]) -> Result<(), TimeframeError> {
        if timeframes.is_empty() {
            return Err(TimeframeError::Empty);
        }
        for pair in timeframes.windows(2) {
            if pair[1] <= pair[0] {
                return Err(TimeframeError::NotAscending {
                    earlier: pair[0],
                    later: pair[1],
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TimeframeError::Unknown(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_and_display() {
        assert_eq!("M5".parse::<Timeframe>().unwrap(), Timeframe::M5);
        assert_eq!("h1".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert_eq!(Timeframe::H2.to_string(), "H2");
        assert!(matches!("W".parse::<Timeframe>(), Err(TimeframeError::Unknown(_))));
    }

    #[test]
    fn order_matches_duration() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].duration() < pair[1].duration());
        }
    }

    #[test]
    fn window_start_aligns_to_boundary() {
        let t = Utc.with_ymd_and_hms(2015, 7, 15, 10, 47, 12).unwrap();
        assert_eq!(
            Timeframe::H1.window_start(t),
            Utc.with_ymd_and_hms(2015, 7, 15, 10, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::M5.window_start(t),
            Utc.with_ymd_and_hms(2015, 7, 15, 10, 45, 0).unwrap()
        );
        let exact = Utc.with_ymd_and_hms(2015, 7, 15, 10, 0, 0).unwrap();
        assert_eq!(Timeframe::H2.window_start(exact), exact);
    }

    #[test]
    fn ascending_validation() {
        use Timeframe::*;
        assert!(Timeframe::ensure_ascending(&[M5, M15, H1, H2]).is_ok());
        assert_eq!(Timeframe::ensure_ascending(&[]), Err(TimeframeError::Empty));
        assert_eq!(
            Timeframe::ensure_ascending(&[M5, H1, M15]),
            Err(TimeframeError::NotAscending { earlier: H1, later: M15 })
        );
        assert!(Timeframe::ensure_ascending(&[M5, M5]).is_err());
    }
}
