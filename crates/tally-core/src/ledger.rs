//! The balance engine.
//!
//! Keeps committed transactions in a stable (date, position) order and
//! maintains, per account, the entry list with running balances. Mutations
//! recompute balances from the earliest affected row forward, never the
//! whole ledger. All commands validate before touching any state.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use tally_domain::{Amount, CurrencyCode, CurrencyRegistry, Transaction};

use crate::accounts::AccountRegistry;
use crate::error::{CoreError, Result};
use crate::report::{EntryFilter, TotalsReport};

/// Ordering key of a committed transaction: date first, manual position
/// second. Positions are unique within a date.
pub type OrderKey = (NaiveDate, i64);

/// One row of an account's register: a split projected into the account's
/// default currency, with the running balance after it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Entry {
    pub txn_id: Uuid,
    pub split_id: Uuid,
    pub date: NaiveDate,
    pub position: i64,
    /// The split amount as entered, possibly in a foreign currency.
    pub amount: Amount,
    /// The amount in the account's default currency at the entry date.
    pub normalized: Amount,
    /// Running balance after this entry, in the account's default currency.
    pub balance: Amount,
    pub reconciled: bool,
}

#[derive(Debug, Clone)]
struct EditSession {
    original: Transaction,
    draft: Transaction,
}

/// Which free-text field of a transaction to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Description,
    Payee,
    Checkno,
    Notes,
}

/// Ordered committed transactions plus per-account running balances.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    transactions: Vec<Transaction>,
    entries: HashMap<Uuid, Vec<Entry>>,
    edit: Option<EditSession>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Commit and removal

    /// Validates and commits a transaction. The position is assigned at the
    /// end of the transaction's date group unless a position was restored
    /// from a snapshot.
    pub fn commit(
        &mut self,
        txn: Transaction,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<Uuid> {
        self.check_commit(&txn, accounts, currencies)?;
        self.insert_committed(txn, accounts, currencies)
    }

    /// Inserts an already-validated transaction. Also the restore path for
    /// cancelled edits, which must never re-fail validation.
    fn insert_committed(
        &mut self,
        mut txn: Transaction,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<Uuid> {
        if txn.position <= 0 || self.key_taken(txn.order_key()) {
            txn.position = self.next_position(txn.date);
        }
        let id = txn.id;
        let key = txn.order_key();
        let affected = txn.affected_accounts();
        let index = self
            .transactions
            .partition_point(|t| t.order_key() < key);
        self.transactions.insert(index, txn);
        self.refresh_from(accounts, currencies, &affected, key)?;
        Ok(id)
    }

    /// Removes a committed transaction and shrinks balances from its row
    /// forward.
    pub fn remove(
        &mut self,
        id: Uuid,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<Transaction> {
        let index = self
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or(CoreError::TransactionNotFound(id))?;
        let txn = self.transactions.remove(index);
        self.refresh_from(accounts, currencies, &txn.affected_accounts(), txn.order_key())?;
        Ok(txn)
    }

    // --- Balance validation

    /// The converted sum of the splits in the first split's currency, as of
    /// the transaction date.
    pub fn balance_offset(txn: &Transaction, currencies: &CurrencyRegistry) -> Result<Amount> {
        let reference = match txn.splits.first() {
            Some(split) => split.amount.currency.clone(),
            None => return Ok(Amount::zero(CurrencyCode::default())),
        };
        let mut sum = Amount::zero(reference.clone());
        for split in &txn.splits {
            let converted = currencies.convert(&split.amount, &reference, txn.date)?;
            sum = sum.checked_add(&converted)?;
        }
        Ok(sum)
    }

    /// True iff the splits convert-and-sum to zero as of the transaction
    /// date. A single-currency transaction must sum to exactly zero; a
    /// multi-currency one may be off by one minor unit of rounding slack.
    pub fn is_balanced(txn: &Transaction, currencies: &CurrencyRegistry) -> Result<bool> {
        let offset = Self::balance_offset(txn, currencies)?;
        if txn.is_multi_currency() {
            Ok(offset.value.abs() <= 1)
        } else {
            Ok(offset.is_zero())
        }
    }

    fn check_commit(
        &self,
        txn: &Transaction,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<()> {
        // Normalizations are validated up front so that the entry refresh
        // below cannot fail halfway through.
        for split in &txn.splits {
            let account = accounts
                .get(split.account_id)
                .ok_or(CoreError::AccountNotFound(split.account_id))?;
            account.normalize_amount(&split.amount, currencies, txn.date)?;
        }
        if !Self::is_balanced(txn, currencies)? {
            let offset = Self::balance_offset(txn, currencies)?;
            return Err(CoreError::UnbalancedTransaction(format!(
                "off by {} {}",
                offset.value, offset.currency
            )));
        }
        Ok(())
    }

    // --- Edit sessions

    /// Re-enters draft state for one committed transaction. Its entries
    /// leave the balance computation until the edit is committed or
    /// cancelled.
    pub fn begin_edit(
        &mut self,
        id: Uuid,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<()> {
        if self.edit.is_some() {
            return Err(CoreError::InvalidOperation(
                "an edit is already in progress".into(),
            ));
        }
        let original = self.remove(id, accounts, currencies)?;
        self.edit = Some(EditSession {
            draft: original.clone(),
            original,
        });
        Ok(())
    }

    pub fn draft(&self) -> Option<&Transaction> {
        self.edit.as_ref().map(|edit| &edit.draft)
    }

    pub fn draft_mut(&mut self) -> Result<&mut Transaction> {
        self.edit
            .as_mut()
            .map(|edit| &mut edit.draft)
            .ok_or_else(|| CoreError::InvalidOperation("no edit in progress".into()))
    }

    /// Validates the draft and re-inserts it. On failure the draft stays
    /// open so the caller can fix it and retry.
    pub fn commit_edit(
        &mut self,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<Uuid> {
        let (draft_check, same_date_position) = match &self.edit {
            Some(edit) => (
                edit.draft.clone(),
                (edit.draft.date == edit.original.date).then_some(edit.original.position),
            ),
            None => {
                return Err(CoreError::InvalidOperation("no edit in progress".into()));
            }
        };
        self.check_commit(&draft_check, accounts, currencies)?;
        let mut draft = draft_check;
        draft.position = same_date_position.unwrap_or(0);
        self.edit = None;
        self.insert_committed(draft, accounts, currencies)
    }

    /// Rolls the transaction back to its last committed values.
    pub fn cancel_edit(
        &mut self,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<()> {
        let edit = self
            .edit
            .take()
            .ok_or_else(|| CoreError::InvalidOperation("no edit in progress".into()))?;
        self.insert_committed(edit.original, accounts, currencies)?;
        Ok(())
    }

    // --- Free-text fields

    /// Updates one free-text field of a committed transaction. No cross
    /// field invariants apply and balances are untouched, so this does not
    /// re-enter draft state.
    pub fn set_text(&mut self, id: Uuid, field: TextField, text: impl Into<String>) -> Result<()> {
        let txn = self
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(CoreError::TransactionNotFound(id))?;
        let text = text.into();
        match field {
            TextField::Description => txn.description = text,
            TextField::Payee => txn.payee = text,
            TextField::Checkno => txn.checkno = text,
            TextField::Notes => txn.notes = text,
        }
        Ok(())
    }

    // --- Manual reordering

    /// True iff the listed transactions can be moved to `to_index` within
    /// their date group: they all exist, share one date, none carries a
    /// reconciled split, and no edit is open on that date.
    pub fn can_move_rows(&self, ids: &[Uuid], to_index: usize) -> bool {
        if ids.is_empty() {
            return false;
        }
        let mut date = None;
        for id in ids {
            let Some(txn) = self.transaction(*id) else {
                return false;
            };
            if txn.has_reconciled_split() {
                return false;
            }
            match date {
                None => date = Some(txn.date),
                Some(d) if d != txn.date => return false,
                _ => {}
            }
        }
        let date = match date {
            Some(d) => d,
            None => return false,
        };
        if let Some(edit) = &self.edit {
            if edit.original.date == date {
                return false;
            }
        }
        let group_len = self
            .transactions
            .iter()
            .filter(|t| t.date == date)
            .count();
        to_index <= group_len
    }

    /// Moves the listed same-date transactions so the block lands before
    /// the row currently at `to_index` in the date group. Cross-date moves
    /// are rejected with no mutation.
    pub fn move_rows(
        &mut self,
        ids: &[Uuid],
        to_index: usize,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<()> {
        if !self.can_move_rows(ids, to_index) {
            return Err(CoreError::InvalidMove(
                "rows must share one date, be unreconciled, and stay in range".into(),
            ));
        }
        let date = self
            .transaction(ids[0])
            .map(|t| t.date)
            .ok_or(CoreError::TransactionNotFound(ids[0]))?;
        let start = self
            .transactions
            .partition_point(|t| t.order_key() < (date, i64::MIN));
        let end = self
            .transactions
            .partition_point(|t| t.order_key() <= (date, i64::MAX));
        let group: Vec<Transaction> = self.transactions.drain(start..end).collect();

        // Rows above the target that are being moved shift the target up.
        let moved_before = group
            .iter()
            .take(to_index)
            .filter(|t| ids.contains(&t.id))
            .count();
        let insert_at = to_index - moved_before;

        let mut moved = Vec::new();
        let mut remaining = Vec::new();
        for txn in group {
            if ids.contains(&txn.id) {
                moved.push(txn);
            } else {
                remaining.push(txn);
            }
        }
        remaining.splice(insert_at..insert_at, moved);
        let mut affected = Vec::new();
        for (offset, txn) in remaining.iter_mut().enumerate() {
            txn.position = offset as i64 + 1;
            for account_id in txn.affected_accounts() {
                if !affected.contains(&account_id) {
                    affected.push(account_id);
                }
            }
        }
        self.transactions.splice(start..start, remaining);
        self.refresh_from(accounts, currencies, &affected, (date, 0))
    }

    // --- Reconciliation

    /// Flips a split's reconciled flag, stamping or clearing the supplied
    /// reconciliation date. Returns the new state.
    pub fn toggle_reconciled(
        &mut self,
        txn_id: Uuid,
        split_id: Uuid,
        date: NaiveDate,
        accounts: &AccountRegistry,
    ) -> Result<bool> {
        let (account_id, reconciled) = {
            let txn = self
                .transactions
                .iter_mut()
                .find(|t| t.id == txn_id)
                .ok_or(CoreError::TransactionNotFound(txn_id))?;
            let split = txn
                .split_mut(split_id)
                .ok_or(CoreError::SplitNotFound(split_id))?;
            let account = accounts
                .get(split.account_id)
                .ok_or(CoreError::AccountNotFound(split.account_id))?;
            if !account.allows_reconciliation() {
                return Err(CoreError::NotReconcilable(account.name.clone()));
            }
            split.reconciled = !split.reconciled;
            split.reconciliation_date = split.reconciled.then_some(date);
            (split.account_id, split.reconciled)
        };
        if let Some(entries) = self.entries.get_mut(&account_id) {
            if let Some(entry) = entries.iter_mut().find(|e| e.split_id == split_id) {
                entry.reconciled = reconciled;
            }
        }
        Ok(reconciled)
    }

    /// Whether the transaction is eligible for reconciliation: committed
    /// and not dated in the future. No locked periods exist in this core.
    pub fn can_reconcile(&self, txn_id: Uuid, today: NaiveDate) -> bool {
        match self.transaction(txn_id) {
            Some(txn) => txn.date <= today,
            None => false,
        }
    }

    // --- Queries

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    pub fn row_of(&self, id: Uuid) -> Option<usize> {
        self.transactions.iter().position(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn is_multi_currency(&self, txn_id: Uuid) -> Result<bool> {
        self.transaction(txn_id)
            .map(|t| t.is_multi_currency())
            .ok_or(CoreError::TransactionNotFound(txn_id))
    }

    /// The account's register rows in ledger order.
    pub fn entries(&self, account_id: Uuid) -> &[Entry] {
        self.entries
            .get(&account_id)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Running balance after the given row, in the account's default
    /// currency.
    pub fn balance_at_row(&self, account_id: Uuid, row: usize) -> Option<&Amount> {
        self.entries(account_id).get(row).map(|entry| &entry.balance)
    }

    /// Whether the balance right after the given row is below zero.
    pub fn is_balance_negative_at_row(&self, account_id: Uuid, row: usize) -> bool {
        self.balance_at_row(account_id, row)
            .map(|balance| balance.is_negative())
            .unwrap_or(false)
    }

    /// The register rows currently visible under `filter`, in ledger order.
    pub fn visible_entries(&self, account_id: Uuid, filter: EntryFilter) -> Vec<&Entry> {
        self.entries(account_id)
            .iter()
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    /// Totals over the visible rows of an account register. Debits collect
    /// the positive normalized amounts, credits the negative ones.
    pub fn totals(
        &self,
        account_id: Uuid,
        filter: EntryFilter,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<TotalsReport> {
        let account = accounts
            .get(account_id)
            .ok_or(CoreError::AccountNotFound(account_id))?;
        let exponent = currencies.exponent_of(&account.currency)?;
        let entries = self.entries(account_id);
        let mut shown = 0;
        let mut debits = 0;
        let mut credits = 0;
        for entry in entries.iter().filter(|entry| filter.matches(entry)) {
            shown += 1;
            if entry.normalized.value >= 0 {
                debits += entry.normalized.value;
            } else {
                credits -= entry.normalized.value;
            }
        }
        let currency = account.currency.clone();
        Ok(TotalsReport {
            shown,
            total: entries.len(),
            debits: Amount::new(debits, currency.clone()),
            credits: Amount::new(credits, currency.clone()),
            net: Amount::new(debits - credits, currency),
            exponent,
        })
    }

    /// Every account referenced by committed splits or by the open edit
    /// session. Used for autocreated-account purging.
    pub fn referenced_accounts(&self) -> HashSet<Uuid> {
        let mut referenced = HashSet::new();
        for txn in &self.transactions {
            for split in &txn.splits {
                referenced.insert(split.account_id);
            }
        }
        if let Some(edit) = &self.edit {
            for split in edit.original.splits.iter().chain(edit.draft.splits.iter()) {
                referenced.insert(split.account_id);
            }
        }
        referenced
    }

    // --- Account reassignment and rebuilds

    /// Rewrites every split on `from` to reference `to`. Validates every
    /// moved amount against the target account's currency first.
    pub fn reassign_account(
        &mut self,
        from: Uuid,
        to: Uuid,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<()> {
        if let Some(edit) = &self.edit {
            let in_session = edit
                .original
                .splits
                .iter()
                .chain(edit.draft.splits.iter())
                .any(|split| split.account_id == from);
            if in_session {
                return Err(CoreError::InvalidOperation(
                    "account is referenced by an open edit".into(),
                ));
            }
        }
        let target = accounts.get(to).ok_or(CoreError::AccountNotFound(to))?;
        for txn in &self.transactions {
            for split in txn.splits_for_account(from) {
                target.normalize_amount(&split.amount, currencies, txn.date)?;
            }
        }
        for txn in &mut self.transactions {
            for split in &mut txn.splits {
                if split.account_id == from {
                    split.account_id = to;
                }
            }
        }
        self.entries.remove(&from);
        self.refresh_from(accounts, currencies, &[to], (NaiveDate::MIN, i64::MIN))
    }

    /// Full rebuild of every account's entries, used after exchange-rate
    /// changes. Runs synchronously to completion.
    pub fn rebuild(
        &mut self,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
    ) -> Result<()> {
        let mut affected = Vec::new();
        for txn in &self.transactions {
            for account_id in txn.affected_accounts() {
                if !affected.contains(&account_id) {
                    affected.push(account_id);
                }
            }
        }
        self.entries.clear();
        debug!(accounts = affected.len(), "rebuilding all running balances");
        self.refresh_from(accounts, currencies, &affected, (NaiveDate::MIN, i64::MIN))
    }

    // --- Internals

    fn key_taken(&self, key: OrderKey) -> bool {
        self.transactions.iter().any(|t| t.order_key() == key)
    }

    fn next_position(&self, date: NaiveDate) -> i64 {
        let mut max = 0;
        for txn in &self.transactions {
            if txn.date == date {
                max = max.max(txn.position);
            }
        }
        if let Some(edit) = &self.edit {
            if edit.original.date == date {
                max = max.max(edit.original.position);
            }
        }
        max + 1
    }

    /// Regenerates the affected accounts' entries from `from_key` forward.
    /// Earlier rows are untouched; the suffix is rebuilt by scanning the
    /// ordered transaction sequence from the matching row.
    ///
    /// Conversions here were validated when their transactions were
    /// committed, and rates are append-only, so this cannot fail after a
    /// state change has already been applied.
    fn refresh_from(
        &mut self,
        accounts: &AccountRegistry,
        currencies: &CurrencyRegistry,
        affected: &[Uuid],
        from_key: OrderKey,
    ) -> Result<()> {
        let transactions = &self.transactions;
        let entries_map = &mut self.entries;
        let start = transactions.partition_point(|t| t.order_key() < from_key);
        for &account_id in affected {
            let account = match accounts.get(account_id) {
                Some(account) => account,
                None => {
                    entries_map.remove(&account_id);
                    continue;
                }
            };
            let entries = entries_map.entry(account_id).or_default();
            let cut = entries.partition_point(|e| (e.date, e.position) < from_key);
            entries.truncate(cut);
            let mut running = entries.last().map(|e| e.balance.value).unwrap_or(0);
            for txn in &transactions[start..] {
                for split in txn.splits.iter().filter(|s| s.account_id == account_id) {
                    let normalized =
                        account.normalize_amount(&split.amount, currencies, txn.date)?;
                    running += normalized.value;
                    entries.push(Entry {
                        txn_id: txn.id,
                        split_id: split.id,
                        date: txn.date,
                        position: txn.position,
                        amount: split.amount.clone(),
                        normalized,
                        balance: Amount::new(running, account.currency.clone()),
                        reconciled: split.reconciled,
                    });
                }
            }
            if entries.is_empty() {
                entries_map.remove(&account_id);
            }
        }
        Ok(())
    }
}
