//! Accounts: named ledger buckets with a type and a default currency.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::common::*;
use crate::currency::{CurrencyCode, CurrencyError, CurrencyRegistry};

/// Enumerates the four double-entry account classifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Income,
    Expense,
}

impl AccountType {
    /// Asset and Liability accounts appear on the balance sheet.
    pub fn is_balance_sheet(self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Liability)
    }

    /// Income and Expense accounts appear on the income statement.
    pub fn is_income_statement(self) -> bool {
        matches!(self, AccountType::Income | AccountType::Expense)
    }

    /// Liability and Income balances increase on the credit side.
    pub fn is_credit(self) -> bool {
        matches!(self, AccountType::Liability | AccountType::Income)
    }

    /// Asset and Expense balances increase on the debit side.
    pub fn is_debit(self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// The type under its string form, as shown to the presentation layer.
    pub fn name(self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Income => "income",
            AccountType::Expense => "expense",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Collation key used for case-insensitive account lookup and uniqueness.
pub fn collation_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A ledger bucket. Name uniqueness is enforced by the owning registry via
/// the collation key, which is kept in lockstep with the name.
///
/// Cloning an account is a total value copy with no preconditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub name_key: String,
    pub account_type: AccountType,
    pub currency: CurrencyCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub inactive: bool,
    #[serde(default)]
    pub autocreated: bool,
}

impl Account {
    pub fn new(name: impl Into<String>, currency: CurrencyCode, account_type: AccountType) -> Self {
        let name = name.into();
        let name_key = collation_key(&name);
        Self {
            id: Uuid::new_v4(),
            name,
            name_key,
            account_type,
            currency,
            reference: None,
            group: None,
            account_number: None,
            notes: String::new(),
            inactive: false,
            autocreated: false,
        }
    }

    /// Places the account in a named group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Marks the account as implicitly created during entry or import.
    pub fn autocreated(mut self) -> Self {
        self.autocreated = true;
        self
    }

    /// Sets the name and recomputes the collation key in one step. The
    /// owning registry checks uniqueness before calling this.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.name_key = collation_key(&name);
        self.name = name;
    }

    /// Converts `amount` into the account's default currency, using the
    /// rate effective at `date` (the enclosing transaction's date).
    pub fn normalize_amount(
        &self,
        amount: &Amount,
        currencies: &CurrencyRegistry,
        date: NaiveDate,
    ) -> Result<Amount, CurrencyError> {
        currencies.convert(amount, &self.currency, date)
    }

    /// Autocreated placeholder accounts cannot hold reconciled splits.
    pub fn allows_reconciliation(&self) -> bool {
        !self.autocreated
    }
}

impl Identifiable for Account {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for Account {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Displayable for Account {
    fn display_label(&self) -> String {
        format!("{} ({})", self.name, self.account_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_predicates_follow_double_entry_conventions() {
        assert!(AccountType::Asset.is_balance_sheet());
        assert!(AccountType::Liability.is_balance_sheet());
        assert!(AccountType::Income.is_income_statement());
        assert!(AccountType::Expense.is_income_statement());
        assert!(AccountType::Liability.is_credit());
        assert!(AccountType::Income.is_credit());
        assert!(AccountType::Asset.is_debit());
        assert!(AccountType::Expense.is_debit());
    }

    #[test]
    fn type_names_match_the_query_surface() {
        assert_eq!(AccountType::Asset.name(), "asset");
        assert_eq!(AccountType::Liability.name(), "liability");
        assert_eq!(AccountType::Income.name(), "income");
        assert_eq!(AccountType::Expense.name(), "expense");
    }

    #[test]
    fn rename_keeps_collation_key_in_lockstep() {
        let mut account = Account::new("Checking", CurrencyCode::new("USD"), AccountType::Asset);
        assert_eq!(account.name_key, "checking");
        account.set_name("  Épargne  ");
        assert_eq!(account.name, "  Épargne  ");
        assert_eq!(account.name_key, "épargne");
    }

    #[test]
    fn clone_is_a_total_copy() {
        let mut account = Account::new("Savings", CurrencyCode::new("EUR"), AccountType::Asset)
            .with_group("Banking");
        account.notes = "rainy day".into();
        account.account_number = Some("0042".into());
        let copy = account.clone();
        assert_eq!(copy, account);
    }

    #[test]
    fn autocreated_accounts_refuse_reconciliation() {
        let account =
            Account::new("Imported", CurrencyCode::new("USD"), AccountType::Expense).autocreated();
        assert!(!account.allows_reconciliation());
    }
}
