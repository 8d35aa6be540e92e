//! Totals over the visible row subset of an account register.

use std::fmt;

use serde::{Deserialize, Serialize};

use tally_domain::Amount;

use crate::ledger::Entry;

/// Narrows an account register to the rows a view currently shows, without
/// duplicating the ledger. Mirrors the account filter bar of the
/// application.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryFilter {
    #[default]
    All,
    /// Rows that increase the account (positive normalized amount).
    Increases,
    /// Rows that decrease the account (negative normalized amount).
    Decreases,
    Reconciled,
    NotReconciled,
}

impl EntryFilter {
    pub fn matches(self, entry: &Entry) -> bool {
        match self {
            EntryFilter::All => true,
            EntryFilter::Increases => entry.normalized.value > 0,
            EntryFilter::Decreases => entry.normalized.value < 0,
            EntryFilter::Reconciled => entry.reconciled,
            EntryFilter::NotReconciled => !entry.reconciled,
        }
    }
}

/// Totals over the visible rows of one account register, in the account's
/// default currency.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TotalsReport {
    pub shown: usize,
    pub total: usize,
    pub debits: Amount,
    pub credits: Amount,
    pub net: Amount,
    /// The account currency's exponent, captured for formatting.
    pub exponent: u32,
}

impl fmt::Display for TotalsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} entries out of {} shown.", self.shown, self.total)?;
        writeln!(
            f,
            "Total debits: {} {}",
            self.debits.format(self.exponent),
            self.debits.currency
        )?;
        writeln!(
            f,
            "Total credits: {} {}",
            self.credits.format(self.exponent),
            self.credits.currency
        )?;
        write!(
            f,
            "Net: {} {}",
            self.net.format(self.exponent),
            self.net.currency
        )
    }
}
