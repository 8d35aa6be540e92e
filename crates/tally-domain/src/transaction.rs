//! Transactions and their splits.
//!
//! A transaction owns an ordered sequence of splits, one per account leg.
//! The model tolerates unbalanced and single-leg states while a transaction
//! is being edited; balance is only enforced at commit time, by the ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::common::*;
use crate::currency::CurrencyCode;

/// One account/amount leg of a transaction.
///
/// The split's currency need not match its account's default currency;
/// display and balance computation normalize through the rate book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Split {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Amount,
    #[serde(default)]
    pub reconciled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation_date: Option<NaiveDate>,
}

impl Split {
    pub fn new(account_id: Uuid, amount: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            reconciled: false,
            reconciliation_date: None,
        }
    }
}

impl Identifiable for Split {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// A dated, ordered collection of splits.
///
/// `position` is the manual order key among transactions sharing one date;
/// the ledger assigns and rewrites it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payee: String,
    #[serde(default)]
    pub checkno: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub splits: Vec<Split>,
}

impl Transaction {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            description: String::new(),
            payee: String::new(),
            checkno: String::new(),
            notes: String::new(),
            position: 0,
            splits: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = payee.into();
        self
    }

    /// Appends a split. Does not auto-balance.
    pub fn add_split(&mut self, account_id: Uuid, amount: Amount) -> Uuid {
        let split = Split::new(account_id, amount);
        let id = split.id;
        self.splits.push(split);
        id
    }

    pub fn remove_split(&mut self, split_id: Uuid) -> Option<Split> {
        let index = self.splits.iter().position(|split| split.id == split_id)?;
        Some(self.splits.remove(index))
    }

    pub fn split(&self, split_id: Uuid) -> Option<&Split> {
        self.splits.iter().find(|split| split.id == split_id)
    }

    pub fn split_mut(&mut self, split_id: Uuid) -> Option<&mut Split> {
        self.splits.iter_mut().find(|split| split.id == split_id)
    }

    pub fn splits_for_account(&self, account_id: Uuid) -> impl Iterator<Item = &Split> {
        self.splits
            .iter()
            .filter(move |split| split.account_id == account_id)
    }

    /// Distinct accounts referenced by this transaction, in split order.
    pub fn affected_accounts(&self) -> Vec<Uuid> {
        let mut accounts = Vec::new();
        for split in &self.splits {
            if !accounts.contains(&split.account_id) {
                accounts.push(split.account_id);
            }
        }
        accounts
    }

    /// Distinct currencies referenced by the splits, in split order.
    pub fn currencies(&self) -> Vec<CurrencyCode> {
        let mut currencies = Vec::new();
        for split in &self.splits {
            if !currencies.contains(&split.amount.currency) {
                currencies.push(split.amount.currency.clone());
            }
        }
        currencies
    }

    /// True iff the splits span more than one distinct currency.
    pub fn is_multi_currency(&self) -> bool {
        self.currencies().len() > 1
    }

    pub fn has_reconciled_split(&self) -> bool {
        self.splits.iter().any(|split| split.reconciled)
    }

    /// The ledger's ordering key: date first, manual position second.
    pub fn order_key(&self) -> (NaiveDate, i64) {
        (self.date, self.position)
    }
}

impl Identifiable for Transaction {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Displayable for Transaction {
    fn display_label(&self) -> String {
        format!("{} {}", self.date, self.description)
    }
}
