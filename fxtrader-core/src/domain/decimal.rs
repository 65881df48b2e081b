//! Exact decimal parsing for prices, pips and money.
//!
//! Every monetary value in the crate is a [`Decimal`]. Text coming from the
//! broker or from configuration goes through [`parse_decimal`], which accepts
//! only plain fixed-point notation and never rounds through binary floats.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecimalError {
    #[error("empty decimal value")]
    Empty,

    #[error("'{0}' is not a plain decimal number")]
    NotDecimal(String),

    #[error("{0} is not a finite number")]
    NonFinite(f64),
}

/// Parse `"1.1050"`, `"-0.5"` or `"+20"`. Exponents, separators and
/// anything else that is not plain fixed-point notation are rejected.
pub fn parse_decimal(raw: &str) -> Result<Decimal, DecimalError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(DecimalError::Empty);
    }

    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let well_formed = !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if !well_formed {
        return Err(DecimalError::NotDecimal(raw.to_string()));
    }

    let magnitude =
        Decimal::from_str(digits).map_err(|_| DecimalError::NotDecimal(raw.to_string()))?;
    Ok(if text.starts_with('-') { -magnitude } else { magnitude })
}

/// Convert a JSON number to a decimal via its shortest textual form.
pub fn decimal_from_f64(value: f64) -> Result<Decimal, DecimalError> {
    if !value.is_finite() {
        return Err(DecimalError::NonFinite(value));
    }
    parse_decimal(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn plain_values_parse_exactly() {
        assert_eq!(parse_decimal("1.1050").unwrap(), dec!(1.1050));
        assert_eq!(parse_decimal("-0.5").unwrap(), dec!(-0.5));
        assert_eq!(parse_decimal("+20").unwrap(), dec!(20));
        assert_eq!(parse_decimal(" 0.0001 ").unwrap(), dec!(0.0001));
    }

    #[test]
    fn rejects_non_decimal_text() {
        for bad in ["1e5", "1,000", "1_000", "abc", "1.2.3", "-", ".", "NaN", "--1"] {
            assert!(
                matches!(parse_decimal(bad), Err(DecimalError::NotDecimal(_))),
                "accepted {bad}"
            );
        }
        assert_eq!(parse_decimal("  "), Err(DecimalError::Empty));
    }

    #[test]
    fn float_conversion_keeps_shortest_form() {
        assert_eq!(decimal_from_f64(1.1).unwrap(), dec!(1.1));
        assert_eq!(decimal_from_f64(0.0001).unwrap(), dec!(0.0001));
        assert_eq!(decimal_from_f64(5000.0).unwrap(), dec!(5000));
        assert!(decimal_from_f64(f64::NAN).is_err());
        assert!(decimal_from_f64(f64::INFINITY).is_err());
    }
}
