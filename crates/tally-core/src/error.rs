use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use tally_domain::{AmountError, CurrencyCode, CurrencyError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Unified error type for document commands and queries.
///
/// Every variant is a recoverable, command-local condition: the rejected
/// command leaves the document untouched.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Currency mismatch: {left} and {right}")]
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },
    #[error("No rate available for {from} -> {to} on or before {date}")]
    NoRateAvailable {
        from: CurrencyCode,
        to: CurrencyCode,
        date: NaiveDate,
    },
    #[error("Duplicate account name: {0}")]
    DuplicateAccountName(String),
    #[error("Duplicate currency: {0}")]
    DuplicateCurrency(String),
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
    #[error("Not reconcilable: {0}")]
    NotReconcilable(String),
    #[error("Invalid move: {0}")]
    InvalidMove(String),
    #[error("Transaction does not balance: {0}")]
    UnbalancedTransaction(String),
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),
    #[error("Split not found: {0}")]
    SplitNotFound(Uuid),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<AmountError> for CoreError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::CurrencyMismatch { left, right } => {
                CoreError::CurrencyMismatch { left, right }
            }
            AmountError::InvalidDecimal(_) | AmountError::Overflow(_) => {
                CoreError::InvalidOperation(err.to_string())
            }
        }
    }
}

impl From<CurrencyError> for CoreError {
    fn from(err: CurrencyError) -> Self {
        match err {
            CurrencyError::Duplicate(code) => CoreError::DuplicateCurrency(code),
            CurrencyError::Unknown(code) => CoreError::UnknownCurrency(code),
            CurrencyError::NoRateAvailable { from, to, date } => {
                CoreError::NoRateAvailable { from, to, date }
            }
        }
    }
}
