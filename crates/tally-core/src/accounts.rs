//! Account registry: the document-owned index of accounts.
//!
//! Uniqueness is case-insensitive, enforced through the collation-key index.
//! Validation always happens before any mutation so a rejected command
//! leaves the registry untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use tally_domain::{collation_key, Account, AccountType, CurrencyCode};

use crate::error::{CoreError, Result};

/// Owns the canonical [`Account`] instances of one document.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: BTreeMap<Uuid, Account>,
    by_key: HashMap<String, Uuid>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account, rejecting case-insensitive name collisions.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        currency: CurrencyCode,
        account_type: AccountType,
    ) -> Result<Uuid> {
        self.insert(Account::new(name, currency, account_type))
    }

    /// Inserts a fully-built account (used for creation and for restoring
    /// snapshots). Rejects name collisions.
    pub fn insert(&mut self, account: Account) -> Result<Uuid> {
        if self.by_key.contains_key(&account.name_key) {
            return Err(CoreError::DuplicateAccountName(account.name.clone()));
        }
        let id = account.id;
        self.by_key.insert(account.name_key.clone(), id);
        self.accounts.insert(id, account);
        Ok(id)
    }

    /// Finds an account by name, or creates it marked as autocreated.
    /// Reusing an existing account never fails; this is the entry/import
    /// path for unknown account names.
    pub fn find_or_autocreate(
        &mut self,
        name: &str,
        currency: CurrencyCode,
        account_type: AccountType,
    ) -> Uuid {
        if let Some(account) = self.find_by_name(name) {
            return account.id;
        }
        let account = Account::new(name, currency, account_type).autocreated();
        let id = account.id;
        self.by_key.insert(account.name_key.clone(), id);
        self.accounts.insert(id, account);
        id
    }

    /// Renames an account. On a duplicate name the original is unchanged.
    pub fn rename(&mut self, id: Uuid, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        let new_key = collation_key(&new_name);
        let account = self
            .accounts
            .get(&id)
            .ok_or(CoreError::AccountNotFound(id))?;
        if let Some(&holder) = self.by_key.get(&new_key) {
            if holder != id {
                return Err(CoreError::DuplicateAccountName(new_name));
            }
        }
        let old_key = account.name_key.clone();
        // Name and key move together; the index follows in the same step.
        let account = self
            .accounts
            .get_mut(&id)
            .ok_or(CoreError::AccountNotFound(id))?;
        account.set_name(new_name);
        self.by_key.remove(&old_key);
        self.by_key.insert(account.name_key.clone(), id);
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Account> {
        let account = self
            .accounts
            .remove(&id)
            .ok_or(CoreError::AccountNotFound(id))?;
        self.by_key.remove(&account.name_key);
        Ok(account)
    }

    pub fn get(&self, id: Uuid) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Account> {
        self.accounts.get_mut(&id)
    }

    /// Case-insensitive lookup through the collation-key index.
    pub fn find_by_name(&self, name: &str) -> Option<&Account> {
        let id = self.by_key.get(&collation_key(name))?;
        self.accounts.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Silently drops autocreated accounts that no split references any
    /// longer. Returns the purged accounts.
    pub fn purge_autocreated(&mut self, referenced: &HashSet<Uuid>) -> Vec<Account> {
        let orphaned: Vec<Uuid> = self
            .accounts
            .values()
            .filter(|account| account.autocreated && !referenced.contains(&account.id))
            .map(|account| account.id)
            .collect();
        let mut purged = Vec::with_capacity(orphaned.len());
        for id in orphaned {
            if let Some(account) = self.accounts.remove(&id) {
                self.by_key.remove(&account.name_key);
                purged.push(account);
            }
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD")
    }

    #[test]
    fn create_rejects_case_insensitive_duplicates() {
        let mut registry = AccountRegistry::new();
        registry
            .create("Checking", usd(), AccountType::Asset)
            .expect("first create succeeds");
        let err = registry
            .create("  CHECKING ", usd(), AccountType::Asset)
            .expect_err("collation key collides");
        assert!(matches!(err, CoreError::DuplicateAccountName(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rename_to_taken_name_leaves_original_unchanged() {
        let mut registry = AccountRegistry::new();
        let checking = registry.create("Checking", usd(), AccountType::Asset).unwrap();
        registry.create("Savings", usd(), AccountType::Asset).unwrap();

        let err = registry
            .rename(checking, "savings")
            .expect_err("name is taken");
        assert!(matches!(err, CoreError::DuplicateAccountName(_)));
        assert_eq!(registry.get(checking).unwrap().name, "Checking");
        assert_eq!(registry.get(checking).unwrap().name_key, "checking");
    }

    #[test]
    fn rename_updates_the_collation_index() {
        let mut registry = AccountRegistry::new();
        let id = registry.create("Cash", usd(), AccountType::Asset).unwrap();
        registry.rename(id, "Wallet").expect("rename succeeds");

        assert!(registry.find_by_name("cash").is_none());
        assert_eq!(registry.find_by_name("WALLET").unwrap().id, id);
    }

    #[test]
    fn rename_to_same_name_with_new_casing_is_allowed() {
        let mut registry = AccountRegistry::new();
        let id = registry.create("checking", usd(), AccountType::Asset).unwrap();
        registry.rename(id, "Checking").expect("same key, same holder");
        assert_eq!(registry.get(id).unwrap().name, "Checking");
    }

    #[test]
    fn find_or_autocreate_reuses_existing_accounts() {
        let mut registry = AccountRegistry::new();
        let explicit = registry.create("Rent", usd(), AccountType::Expense).unwrap();
        let found = registry.find_or_autocreate("rent", usd(), AccountType::Expense);
        assert_eq!(found, explicit);
        assert!(!registry.get(found).unwrap().autocreated);

        let created = registry.find_or_autocreate("Utilities", usd(), AccountType::Expense);
        assert!(registry.get(created).unwrap().autocreated);
    }

    #[test]
    fn purge_drops_only_unreferenced_autocreated_accounts() {
        let mut registry = AccountRegistry::new();
        let explicit = registry.create("Rent", usd(), AccountType::Expense).unwrap();
        let used = registry.find_or_autocreate("Groceries", usd(), AccountType::Expense);
        let orphan = registry.find_or_autocreate("Typo", usd(), AccountType::Expense);

        let mut referenced = HashSet::new();
        referenced.insert(used);
        let purged = registry.purge_autocreated(&referenced);

        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, orphan);
        assert!(registry.get(explicit).is_some());
        assert!(registry.get(used).is_some());
        assert!(registry.find_by_name("Typo").is_none());
    }
}
