//! Currency registry and dated exchange-rate lookup.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// ISO 4217 currency representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CurrencyCode(pub String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered currency. The exponent is the number of decimal places of
/// its minor unit; it never changes after registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Currency {
    pub code: CurrencyCode,
    pub exponent: u32,
}

impl Currency {
    pub fn new(code: impl Into<String>, exponent: u32) -> Self {
        Self {
            code: CurrencyCode::new(code),
            exponent,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Errors raised by currency registration, lookup, and conversion.
pub enum CurrencyError {
    Duplicate(String),
    Unknown(String),
    NoRateAvailable {
        from: CurrencyCode,
        to: CurrencyCode,
        date: NaiveDate,
    },
}

impl fmt::Display for CurrencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyError::Duplicate(code) => write!(f, "currency {} is already registered", code),
            CurrencyError::Unknown(code) => write!(f, "currency {} is not registered", code),
            CurrencyError::NoRateAvailable { from, to, date } => {
                write!(f, "no {} -> {} rate on or before {}", from, to, date)
            }
        }
    }
}

impl std::error::Error for CurrencyError {}

/// Dated exchange-rate series per ordered currency pair.
///
/// Lookups resolve to the rate effective at or before the requested date;
/// when only the opposite pair carries a series, its reciprocal is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateBook {
    #[serde(default)]
    rates: HashMap<(String, String), BTreeMap<NaiveDate, f64>>,
}

impl RateBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `rate` for the pair effective on `date`. Re-recording an
    /// existing date overwrites it (a correction).
    pub fn set_rate(&mut self, from: &CurrencyCode, to: &CurrencyCode, date: NaiveDate, rate: f64) {
        let key = (from.0.clone(), to.0.clone());
        self.rates.entry(key).or_default().insert(date, rate);
    }

    /// Returns the rate effective at or before `date`, or `None` when the
    /// pair has no applicable series in either direction.
    pub fn rate_on(&self, from: &str, to: &str, date: NaiveDate) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        let key = (from.to_string(), to.to_string());
        if let Some(series) = self.rates.get(&key) {
            if let Some((_, rate)) = series.range(..=date).next_back() {
                return Some(*rate);
            }
        }
        let inverse_key = (to.to_string(), from.to_string());
        if let Some(series) = self.rates.get(&inverse_key) {
            if let Some((_, rate)) = series.range(..=date).next_back() {
                if rate.abs() < f64::EPSILON {
                    return None;
                }
                return Some(1.0 / rate);
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.rates.values().all(|series| series.is_empty())
    }
}

/// Registry of known currencies plus their exchange-rate series.
///
/// One registry per document; it is never a process-wide singleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<String, Currency>,
    rates: RateBook,
}

impl CurrencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a currency code with its exponent.
    pub fn register(&mut self, code: impl Into<String>, exponent: u32) -> Result<(), CurrencyError> {
        let currency = Currency::new(code, exponent);
        let key = currency.code.0.clone();
        if self.currencies.contains_key(&key) {
            return Err(CurrencyError::Duplicate(key));
        }
        self.currencies.insert(key, currency);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&Currency> {
        self.currencies.get(&code.to_uppercase())
    }

    pub fn exponent_of(&self, code: &CurrencyCode) -> Result<u32, CurrencyError> {
        self.get(code.as_str())
            .map(|currency| currency.exponent)
            .ok_or_else(|| CurrencyError::Unknown(code.0.clone()))
    }

    pub fn set_rate(&mut self, from: &CurrencyCode, to: &CurrencyCode, date: NaiveDate, rate: f64) {
        self.rates.set_rate(from, to, date, rate);
    }

    pub fn rates(&self) -> &RateBook {
        &self.rates
    }

    /// Converts `amount` into `to` using the rate effective at or before
    /// `as_of`. Deterministic: the scaled result is rounded to the target
    /// currency's exponent with ties away from zero.
    pub fn convert(
        &self,
        amount: &Amount,
        to: &CurrencyCode,
        as_of: NaiveDate,
    ) -> Result<Amount, CurrencyError> {
        if amount.currency == *to {
            return Ok(amount.clone());
        }
        let from_exponent = self.exponent_of(&amount.currency)?;
        let to_exponent = self.exponent_of(to)?;
        let rate = self
            .rates
            .rate_on(amount.currency.as_str(), to.as_str(), as_of)
            .ok_or_else(|| CurrencyError::NoRateAvailable {
                from: amount.currency.clone(),
                to: to.clone(),
                date: as_of,
            })?;
        let scaled =
            amount.value as f64 * rate * pow10(to_exponent) as f64 / pow10(from_exponent) as f64;
        Ok(Amount::new(round_half_away(scaled), to.clone()))
    }

    /// Formats `amount` as an exact decimal string at its currency's
    /// exponent.
    pub fn format_amount(&self, amount: &Amount) -> Result<String, CurrencyError> {
        let exponent = self.exponent_of(&amount.currency)?;
        Ok(amount.format(exponent))
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

fn pow10(exponent: u32) -> i64 {
    10_i64.pow(exponent)
}

fn round_half_away(value: f64) -> i64 {
    if value >= 0.0 {
        (value + 0.5).floor() as i64
    } else {
        (value - 0.5).ceil() as i64
    }
}
