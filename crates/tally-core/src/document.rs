//! The document: one open file's registries, ledger, and observers.
//!
//! Everything the presentation layer may do goes through here as a discrete
//! synchronous command or query. A rejected command mutates nothing; a
//! successful mutation ends with a single "data changed" notification that
//! views consume by re-querying. The document is the only owner of the
//! canonical account and currency instances; there are no process-wide
//! singletons.

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use tally_domain::{Account, AccountType, Amount, CurrencyCode, CurrencyRegistry, Transaction};

use crate::accounts::AccountRegistry;
use crate::error::{CoreError, Result};
use crate::ledger::{Entry, Ledger, TextField};
use crate::report::{EntryFilter, TotalsReport};

/// Receives the invalidation signal after every successful mutation.
/// The core pushes no deltas; observers re-pull current state.
pub trait ChangeObserver: Send + Sync {
    fn document_changed(&self);
}

/// One open document. Lifecycle: create, mutate through commands, close.
#[derive(Default)]
pub struct Document {
    currencies: CurrencyRegistry,
    accounts: AccountRegistry,
    ledger: Ledger,
    observers: Vec<Box<dyn ChangeObserver>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn ChangeObserver>) {
        self.observers.push(observer);
    }

    fn notify(&self) {
        for observer in &self.observers {
            observer.document_changed();
        }
    }

    fn purge_orphaned_autocreated(&mut self) {
        let referenced = self.ledger.referenced_accounts();
        let purged = self.accounts.purge_autocreated(&referenced);
        if !purged.is_empty() {
            debug!(count = purged.len(), "purged orphaned autocreated accounts");
        }
    }

    // --- Currency commands

    pub fn register_currency(&mut self, code: &str, exponent: u32) -> Result<()> {
        self.currencies.register(code, exponent)?;
        debug!(code, exponent, "registered currency");
        self.notify();
        Ok(())
    }

    /// Records an exchange rate and rebuilds running balances with it.
    pub fn set_rate(
        &mut self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        date: NaiveDate,
        rate: f64,
    ) -> Result<()> {
        for code in [from, to] {
            if self.currencies.get(code.as_str()).is_none() {
                return Err(CoreError::UnknownCurrency(code.as_str().into()));
            }
        }
        self.currencies.set_rate(from, to, date, rate);
        self.ledger.rebuild(&self.accounts, &self.currencies)?;
        debug!(%from, %to, %date, rate, "set exchange rate");
        self.notify();
        Ok(())
    }

    pub fn currencies(&self) -> &CurrencyRegistry {
        &self.currencies
    }

    // --- Account commands

    pub fn create_account(
        &mut self,
        name: impl Into<String>,
        currency: CurrencyCode,
        account_type: AccountType,
    ) -> Result<Uuid> {
        if self.currencies.get(currency.as_str()).is_none() {
            return Err(CoreError::UnknownCurrency(currency.as_str().into()));
        }
        let id = self.accounts.create(name, currency, account_type)?;
        debug!(%id, "created account");
        self.notify();
        Ok(id)
    }

    /// Finds an account by name, creating it as autocreated when unknown.
    /// This is the entry/import path; orphans left behind later are purged
    /// opportunistically.
    pub fn find_or_create_account(
        &mut self,
        name: &str,
        currency: CurrencyCode,
        account_type: AccountType,
    ) -> Result<Uuid> {
        if self.currencies.get(currency.as_str()).is_none() {
            return Err(CoreError::UnknownCurrency(currency.as_str().into()));
        }
        let known = self.accounts.find_by_name(name).map(|account| account.id);
        match known {
            Some(id) => Ok(id),
            None => {
                let id = self
                    .accounts
                    .find_or_autocreate(name, currency, account_type);
                debug!(%id, name, "autocreated account");
                self.notify();
                Ok(id)
            }
        }
    }

    pub fn rename_account(&mut self, id: Uuid, new_name: impl Into<String>) -> Result<()> {
        self.accounts.rename(id, new_name)?;
        self.notify();
        Ok(())
    }

    pub fn set_account_notes(&mut self, id: Uuid, notes: impl Into<String>) -> Result<()> {
        let account = self
            .accounts
            .get_mut(id)
            .ok_or(CoreError::AccountNotFound(id))?;
        account.notes = notes.into();
        self.notify();
        Ok(())
    }

    pub fn set_account_inactive(&mut self, id: Uuid, inactive: bool) -> Result<()> {
        let account = self
            .accounts
            .get_mut(id)
            .ok_or(CoreError::AccountNotFound(id))?;
        account.inactive = inactive;
        self.notify();
        Ok(())
    }

    /// Deletes an account. While splits still reference it, an explicit
    /// reassignment target must be supplied; the splits move there first.
    pub fn delete_account(&mut self, id: Uuid, reassign_to: Option<Uuid>) -> Result<()> {
        if self.accounts.get(id).is_none() {
            return Err(CoreError::AccountNotFound(id));
        }
        if self.ledger.referenced_accounts().contains(&id) {
            let target = reassign_to.ok_or_else(|| {
                CoreError::InvalidOperation(
                    "account still has splits; supply a reassignment target".into(),
                )
            })?;
            if target == id {
                return Err(CoreError::InvalidOperation(
                    "cannot reassign an account to itself".into(),
                ));
            }
            self.ledger
                .reassign_account(id, target, &self.accounts, &self.currencies)?;
        }
        let removed = self.accounts.remove(id)?;
        debug!(name = %removed.name, "deleted account");
        self.purge_orphaned_autocreated();
        self.notify();
        Ok(())
    }

    // --- Account queries

    pub fn account(&self, id: Uuid) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn find_account(&self, name: &str) -> Option<&Account> {
        self.accounts.find_by_name(name)
    }

    pub fn account_type_name(&self, id: Uuid) -> Result<&'static str> {
        self.accounts
            .get(id)
            .map(|account| account.account_type.name())
            .ok_or(CoreError::AccountNotFound(id))
    }

    /// A running balance is meaningful for balance-sheet accounts only.
    pub fn should_show_balance_column(&self, id: Uuid) -> Result<bool> {
        self.accounts
            .get(id)
            .map(|account| account.account_type.is_balance_sheet())
            .ok_or(CoreError::AccountNotFound(id))
    }

    // --- Transaction commands

    pub fn add_transaction(&mut self, txn: Transaction) -> Result<Uuid> {
        let id = self.ledger.commit(txn, &self.accounts, &self.currencies)?;
        debug!(%id, "committed transaction");
        self.purge_orphaned_autocreated();
        self.notify();
        Ok(id)
    }

    pub fn remove_transaction(&mut self, id: Uuid) -> Result<()> {
        self.ledger.remove(id, &self.accounts, &self.currencies)?;
        debug!(%id, "removed transaction");
        self.purge_orphaned_autocreated();
        self.notify();
        Ok(())
    }

    /// Re-enters draft state for one committed transaction; its entries
    /// leave the balance computation until the edit ends.
    pub fn begin_edit(&mut self, id: Uuid) -> Result<()> {
        self.ledger.begin_edit(id, &self.accounts, &self.currencies)?;
        self.notify();
        Ok(())
    }

    pub fn draft(&self) -> Option<&Transaction> {
        self.ledger.draft()
    }

    pub fn draft_mut(&mut self) -> Result<&mut Transaction> {
        self.ledger.draft_mut()
    }

    pub fn commit_edit(&mut self) -> Result<Uuid> {
        let id = self.ledger.commit_edit(&self.accounts, &self.currencies)?;
        debug!(%id, "committed edit");
        self.purge_orphaned_autocreated();
        self.notify();
        Ok(id)
    }

    pub fn cancel_edit(&mut self) -> Result<()> {
        self.ledger.cancel_edit(&self.accounts, &self.currencies)?;
        self.purge_orphaned_autocreated();
        self.notify();
        Ok(())
    }

    pub fn set_transaction_text(
        &mut self,
        id: Uuid,
        field: TextField,
        text: impl Into<String>,
    ) -> Result<()> {
        self.ledger.set_text(id, field, text)?;
        self.notify();
        Ok(())
    }

    pub fn can_move_rows(&self, ids: &[Uuid], to_index: usize) -> bool {
        self.ledger.can_move_rows(ids, to_index)
    }

    pub fn move_rows(&mut self, ids: &[Uuid], to_index: usize) -> Result<()> {
        self.ledger
            .move_rows(ids, to_index, &self.accounts, &self.currencies)?;
        self.notify();
        Ok(())
    }

    pub fn toggle_reconciled(
        &mut self,
        txn_id: Uuid,
        split_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool> {
        let reconciled = self
            .ledger
            .toggle_reconciled(txn_id, split_id, date, &self.accounts)?;
        self.notify();
        Ok(reconciled)
    }

    /// Toggles a batch of splits as one command: every target is validated
    /// before the first flag flips.
    pub fn toggle_reconciled_bulk(
        &mut self,
        targets: &[(Uuid, Uuid)],
        date: NaiveDate,
    ) -> Result<()> {
        for &(txn_id, split_id) in targets {
            let txn = self
                .ledger
                .transaction(txn_id)
                .ok_or(CoreError::TransactionNotFound(txn_id))?;
            let split = txn
                .split(split_id)
                .ok_or(CoreError::SplitNotFound(split_id))?;
            let account = self
                .accounts
                .get(split.account_id)
                .ok_or(CoreError::AccountNotFound(split.account_id))?;
            if !account.allows_reconciliation() {
                return Err(CoreError::NotReconcilable(account.name.clone()));
            }
        }
        for &(txn_id, split_id) in targets {
            self.ledger
                .toggle_reconciled(txn_id, split_id, date, &self.accounts)?;
        }
        self.notify();
        Ok(())
    }

    pub fn can_reconcile(&self, txn_id: Uuid, today: NaiveDate) -> bool {
        self.ledger.can_reconcile(txn_id, today)
    }

    // --- Transaction and balance queries

    pub fn transactions(&self) -> &[Transaction] {
        self.ledger.transactions()
    }

    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.ledger.transaction(id)
    }

    pub fn is_multi_currency(&self, txn_id: Uuid) -> Result<bool> {
        self.ledger.is_multi_currency(txn_id)
    }

    /// Balance precondition check for a transaction being prepared or
    /// edited, before it is allowed to commit.
    pub fn is_balanced(&self, txn: &Transaction) -> Result<bool> {
        Ledger::is_balanced(txn, &self.currencies)
    }

    pub fn entries(&self, account_id: Uuid) -> &[Entry] {
        self.ledger.entries(account_id)
    }

    pub fn visible_entries(&self, account_id: Uuid, filter: EntryFilter) -> Vec<&Entry> {
        self.ledger.visible_entries(account_id, filter)
    }

    pub fn balance_at_row(&self, account_id: Uuid, row: usize) -> Option<&Amount> {
        self.ledger.balance_at_row(account_id, row)
    }

    pub fn is_balance_negative_at_row(&self, account_id: Uuid, row: usize) -> bool {
        self.ledger.is_balance_negative_at_row(account_id, row)
    }

    pub fn totals(&self, account_id: Uuid, filter: EntryFilter) -> Result<TotalsReport> {
        self.ledger
            .totals(account_id, filter, &self.accounts, &self.currencies)
    }

    /// Ends the document's lifecycle. Observers are dropped with it.
    pub fn close(self) {
        debug!("closing document");
    }
}
