//! Fixed-precision monetary values.
//!
//! An [`Amount`] stores its value as an integer scaled by `10^exponent` of
//! its currency, so arithmetic and string round-trips never go through
//! floating point.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::currency::{CurrencyCode, CurrencyError, CurrencyRegistry};

#[derive(Debug, Clone, PartialEq)]
/// Errors raised by amount arithmetic and parsing.
pub enum AmountError {
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },
    InvalidDecimal(String),
    Overflow(String),
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::CurrencyMismatch { left, right } => {
                write!(f, "cannot combine {} with {}", left, right)
            }
            AmountError::InvalidDecimal(text) => write!(f, "not a decimal number: {:?}", text),
            AmountError::Overflow(text) => write!(f, "amount out of range: {:?}", text),
        }
    }
}

impl std::error::Error for AmountError {}

/// A monetary value bound to a currency.
///
/// `value` is expressed in the currency's minor unit (cents for USD, yen
/// for JPY).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub value: i64,
    pub currency: CurrencyCode,
}

impl Amount {
    pub fn new(value: i64, currency: CurrencyCode) -> Self {
        Self { value, currency }
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self { value: 0, currency }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    pub fn is_negative(&self) -> bool {
        self.value < 0
    }

    pub fn negated(&self) -> Self {
        Self {
            value: -self.value,
            currency: self.currency.clone(),
        }
    }

    pub fn abs(&self) -> Self {
        Self {
            value: self.value.abs(),
            currency: self.currency.clone(),
        }
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.ensure_same_currency(other)?;
        Ok(Amount::new(self.value + other.value, self.currency.clone()))
    }

    /// Subtracts `other` from `self`, both of the same currency.
    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.ensure_same_currency(other)?;
        Ok(Amount::new(self.value - other.value, self.currency.clone()))
    }

    /// A new amount in `to`, converted at the rate effective on `date`.
    /// Delegates to the registry's deterministic conversion.
    pub fn converted_to(
        &self,
        currencies: &CurrencyRegistry,
        to: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Amount, CurrencyError> {
        currencies.convert(self, to, date)
    }

    fn ensure_same_currency(&self, other: &Amount) -> Result<(), AmountError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(AmountError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            })
        }
    }

    /// Parses an exact decimal string (`"12.34"`, `"-0.5"`, `"1200"`) at
    /// the given exponent. More fractional digits than the exponent allows
    /// are rejected rather than silently rounded.
    pub fn parse(text: &str, currency: CurrencyCode, exponent: u32) -> Result<Amount, AmountError> {
        let trimmed = text.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if body.is_empty() {
            return Err(AmountError::InvalidDecimal(text.into()));
        }
        let (int_part, frac_part) = match body.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountError::InvalidDecimal(text.into()));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::InvalidDecimal(text.into()));
        }
        if frac_part.len() as u32 > exponent {
            return Err(AmountError::InvalidDecimal(text.into()));
        }

        let overflow = || AmountError::Overflow(text.into());
        let mut value: i64 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((c as u8 - b'0') as i64))
                .ok_or_else(overflow)?;
        }
        let padding = exponent - frac_part.len() as u32;
        value = value
            .checked_mul(10_i64.pow(padding))
            .ok_or_else(overflow)?;
        if negative {
            value = -value;
        }
        Ok(Amount::new(value, currency))
    }

    /// Formats the amount as an exact decimal string at the given exponent.
    /// Round-trips losslessly through [`Amount::parse`].
    pub fn format(&self, exponent: u32) -> String {
        let factor = 10_i64.pow(exponent);
        let units = self.value.unsigned_abs();
        let sign = if self.value < 0 { "-" } else { "" };
        if exponent == 0 {
            return format!("{}{}", sign, units);
        }
        let int_part = units / factor.unsigned_abs();
        let frac_part = units % factor.unsigned_abs();
        format!(
            "{}{}.{:0width$}",
            sign,
            int_part,
            frac_part,
            width = exponent as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(value: i64) -> Amount {
        Amount::new(value, CurrencyCode::new("USD"))
    }

    #[test]
    fn addition_is_commutative() {
        let a = usd(1_250);
        let b = usd(-375);
        assert_eq!(a.checked_add(&b).unwrap(), b.checked_add(&a).unwrap());
    }

    #[test]
    fn adding_the_negation_yields_zero() {
        let a = usd(9_999);
        let zero = Amount::zero(CurrencyCode::new("USD"));
        let negated = zero.checked_sub(&a).unwrap();
        assert_eq!(a.checked_add(&negated).unwrap(), zero);
    }

    #[test]
    fn arithmetic_rejects_mixed_currencies() {
        let a = usd(100);
        let b = Amount::new(100, CurrencyCode::new("EUR"));
        let err = a.checked_add(&b).expect_err("currencies differ");
        assert!(matches!(err, AmountError::CurrencyMismatch { .. }));
    }

    #[test]
    fn parse_and_format_round_trip_exactly() {
        let cases = ["0.00", "12.34", "-0.05", "1200.00", "-12345678.90"];
        for case in cases {
            let amount = Amount::parse(case, CurrencyCode::new("USD"), 2).unwrap();
            assert_eq!(amount.format(2), case, "round-trip of {}", case);
        }
    }

    #[test]
    fn parse_pads_missing_fraction_digits() {
        let amount = Amount::parse("3.5", CurrencyCode::new("USD"), 2).unwrap();
        assert_eq!(amount.value, 350);
        let whole = Amount::parse("42", CurrencyCode::new("USD"), 2).unwrap();
        assert_eq!(whole.value, 4_200);
    }

    #[test]
    fn parse_handles_zero_exponent_currencies() {
        let amount = Amount::parse("1500", CurrencyCode::new("JPY"), 0).unwrap();
        assert_eq!(amount.value, 1_500);
        assert_eq!(amount.format(0), "1500");
    }

    #[test]
    fn parse_rejects_excess_precision_and_garbage() {
        for case in ["1.234", "abc", "", "-", "1.2.3", "12,00"] {
            assert!(
                Amount::parse(case, CurrencyCode::new("USD"), 2).is_err(),
                "{:?} should not parse",
                case
            );
        }
    }

    #[test]
    fn predicates_reflect_the_scaled_value() {
        assert!(usd(0).is_zero());
        assert!(usd(-1).is_negative());
        assert!(!usd(1).is_negative());
        assert_eq!(usd(-500).abs(), usd(500));
        assert_eq!(usd(500).negated(), usd(-500));
    }
}
