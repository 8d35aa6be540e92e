use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use tally_core::{ChangeObserver, CoreError, Document, TextField};
use tally_domain::{AccountType, Amount, CurrencyCode, Transaction};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn usd(minor: i64) -> Amount {
    Amount::new(minor, CurrencyCode::new("USD"))
}

fn transfer(on: NaiveDate, from: Uuid, to: Uuid, amount: Amount) -> Transaction {
    let mut txn = Transaction::new(on);
    txn.add_split(to, amount.clone());
    txn.add_split(from, amount.negated());
    txn
}

fn document() -> Document {
    let mut doc = Document::new();
    doc.register_currency("USD", 2).unwrap();
    doc
}

struct CountingObserver(Arc<AtomicUsize>);

impl ChangeObserver for CountingObserver {
    fn document_changed(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn duplicate_account_names_are_rejected_case_insensitively() {
    let mut doc = document();
    doc.create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let err = doc
        .create_account("  CHECKING ", CurrencyCode::new("USD"), AccountType::Asset)
        .expect_err("collation keys collide");
    assert!(matches!(err, CoreError::DuplicateAccountName(_)));
    assert_eq!(doc.accounts().count(), 1);
}

#[test]
fn rename_to_a_taken_name_fails_and_keeps_the_original() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    doc.create_account("Savings", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();

    let err = doc
        .rename_account(checking, "savings")
        .expect_err("name is taken");
    assert!(matches!(err, CoreError::DuplicateAccountName(_)));
    assert_eq!(doc.account(checking).unwrap().name, "Checking");

    doc.rename_account(checking, "Main Checking").unwrap();
    assert_eq!(doc.find_account("main checking").unwrap().id, checking);
}

#[test]
fn unknown_currencies_are_rejected_at_account_creation() {
    let mut doc = document();
    let err = doc
        .create_account("Cash", CurrencyCode::new("XXX"), AccountType::Asset)
        .expect_err("XXX was never registered");
    assert!(matches!(err, CoreError::UnknownCurrency(_)));
}

#[test]
fn autocreated_accounts_are_purged_once_orphaned() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let groceries = doc
        .find_or_create_account("Groceries", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    assert!(doc.account(groceries).unwrap().autocreated);

    let id = doc
        .add_transaction(transfer(date(2025, 2, 1), checking, groceries, usd(2_000)))
        .unwrap();
    assert!(doc.find_account("Groceries").is_some());

    doc.remove_transaction(id).unwrap();
    assert!(doc.find_account("Groceries").is_none(), "orphan is purged");
    assert!(doc.account(checking).is_some(), "explicit accounts stay");
}

#[test]
fn find_or_create_reuses_explicit_accounts() {
    let mut doc = document();
    let rent = doc
        .create_account("Rent", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    let found = doc
        .find_or_create_account("rent", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    assert_eq!(found, rent);
    assert!(!doc.account(rent).unwrap().autocreated);
}

#[test]
fn deleting_a_referenced_account_needs_a_reassignment_target() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let savings = doc
        .create_account("Savings", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let rent = doc
        .create_account("Rent", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    let id = doc
        .add_transaction(transfer(date(2025, 2, 1), checking, rent, usd(5_000)))
        .unwrap();

    let err = doc
        .delete_account(checking, None)
        .expect_err("still referenced");
    assert!(matches!(err, CoreError::InvalidOperation(_)));
    assert!(doc.account(checking).is_some());

    doc.delete_account(checking, Some(savings)).unwrap();
    assert!(doc.account(checking).is_none());
    assert_eq!(doc.balance_at_row(savings, 0).unwrap().value, -5_000);
    let moved = doc.transaction(id).unwrap();
    assert!(moved.splits.iter().all(|s| s.account_id != checking));
}

#[test]
fn observers_get_one_signal_per_successful_mutation() {
    let mut doc = Document::new();
    let count = Arc::new(AtomicUsize::new(0));
    doc.add_observer(Box::new(CountingObserver(count.clone())));

    doc.register_currency("USD", 2).unwrap();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let rent = doc
        .create_account("Rent", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    doc.add_transaction(transfer(date(2025, 2, 1), checking, rent, usd(5_000)))
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 4);

    // Rejected commands signal nothing.
    let _ = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .expect_err("duplicate");
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[test]
fn toggle_reconciled_stamps_the_supplied_date() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let rent = doc
        .create_account("Rent", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    let id = doc
        .add_transaction(transfer(date(2025, 2, 1), checking, rent, usd(5_000)))
        .unwrap();
    let split_id = doc.transaction(id).unwrap().splits[1].id;

    let statement_date = date(2025, 2, 28);
    assert!(doc.toggle_reconciled(id, split_id, statement_date).unwrap());
    let split = doc.transaction(id).unwrap().split(split_id).unwrap();
    assert!(split.reconciled);
    assert_eq!(split.reconciliation_date, Some(statement_date));

    assert!(!doc.toggle_reconciled(id, split_id, statement_date).unwrap());
    let split = doc.transaction(id).unwrap().split(split_id).unwrap();
    assert!(!split.reconciled);
    assert_eq!(split.reconciliation_date, None);
}

#[test]
fn splits_on_autocreated_accounts_are_not_reconcilable() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let placeholder = doc
        .find_or_create_account("Imported", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    let id = doc
        .add_transaction(transfer(date(2025, 2, 1), checking, placeholder, usd(700)))
        .unwrap();
    let split_id = doc
        .transaction(id)
        .unwrap()
        .splits
        .iter()
        .find(|s| s.account_id == placeholder)
        .unwrap()
        .id;

    let err = doc
        .toggle_reconciled(id, split_id, date(2025, 2, 28))
        .expect_err("placeholder accounts refuse reconciliation");
    assert!(matches!(err, CoreError::NotReconcilable(_)));
}

#[test]
fn bulk_reconciliation_is_all_or_nothing() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let placeholder = doc
        .find_or_create_account("Imported", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    let id = doc
        .add_transaction(transfer(date(2025, 2, 1), checking, placeholder, usd(700)))
        .unwrap();
    let txn = doc.transaction(id).unwrap();
    let good = txn
        .splits
        .iter()
        .find(|s| s.account_id == checking)
        .unwrap()
        .id;
    let bad = txn
        .splits
        .iter()
        .find(|s| s.account_id == placeholder)
        .unwrap()
        .id;

    let err = doc
        .toggle_reconciled_bulk(&[(id, good), (id, bad)], date(2025, 2, 28))
        .expect_err("one target is not reconcilable");
    assert!(matches!(err, CoreError::NotReconcilable(_)));
    let txn = doc.transaction(id).unwrap();
    assert!(
        txn.splits.iter().all(|s| !s.reconciled),
        "nothing was applied"
    );

    doc.toggle_reconciled_bulk(&[(id, good)], date(2025, 2, 28))
        .unwrap();
    assert!(doc.transaction(id).unwrap().split(good).unwrap().reconciled);
}

#[test]
fn future_entries_are_not_eligible_for_reconciliation() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let rent = doc
        .create_account("Rent", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    let id = doc
        .add_transaction(transfer(date(2025, 3, 15), checking, rent, usd(100)))
        .unwrap();

    assert!(!doc.can_reconcile(id, date(2025, 3, 14)));
    assert!(doc.can_reconcile(id, date(2025, 3, 15)));
    assert!(doc.can_reconcile(id, date(2025, 4, 1)));
}

#[test]
fn free_text_fields_update_without_rebalancing() {
    let mut doc = document();
    let checking = doc
        .create_account("Checking", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let rent = doc
        .create_account("Rent", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();
    let id = doc
        .add_transaction(transfer(date(2025, 3, 1), checking, rent, usd(95_000)))
        .unwrap();

    doc.set_transaction_text(id, TextField::Description, "March rent")
        .unwrap();
    doc.set_transaction_text(id, TextField::Payee, "Landlord").unwrap();
    doc.set_transaction_text(id, TextField::Checkno, "1042").unwrap();
    doc.set_transaction_text(id, TextField::Notes, "paid late").unwrap();

    let txn = doc.transaction(id).unwrap();
    assert_eq!(txn.description, "March rent");
    assert_eq!(txn.payee, "Landlord");
    assert_eq!(txn.checkno, "1042");
    assert_eq!(txn.notes, "paid late");
    assert_eq!(doc.balance_at_row(checking, 0).unwrap().value, -95_000);
}

#[test]
fn account_type_names_match_the_query_surface() {
    let mut doc = document();
    let asset = doc
        .create_account("A", CurrencyCode::new("USD"), AccountType::Asset)
        .unwrap();
    let liability = doc
        .create_account("L", CurrencyCode::new("USD"), AccountType::Liability)
        .unwrap();
    let income = doc
        .create_account("I", CurrencyCode::new("USD"), AccountType::Income)
        .unwrap();
    let expense = doc
        .create_account("E", CurrencyCode::new("USD"), AccountType::Expense)
        .unwrap();

    assert_eq!(doc.account_type_name(asset).unwrap(), "asset");
    assert_eq!(doc.account_type_name(liability).unwrap(), "liability");
    assert_eq!(doc.account_type_name(income).unwrap(), "income");
    assert_eq!(doc.account_type_name(expense).unwrap(), "expense");
}

#[test]
fn duplicate_currency_registration_is_rejected() {
    let mut doc = document();
    let err = doc.register_currency("usd", 2).expect_err("USD exists");
    assert!(matches!(err, CoreError::DuplicateCurrency(_)));
}
