//! Ledger document: accounts, holdings and trade history, persisted as JSON.

use crate::types::{Account, AccountId, Holding, Symbol, TransactionRecord};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Everything the ledger stores. Statement groups operate on a clone of this
/// and only a validated, persisted clone replaces the live copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerState {
    pub accounts: Vec<Account>,
    pub holdings: Vec<Holding>,
    pub history: Vec<TransactionRecord>,
    /// Id assigned to the next history record
    #[serde(default = "first_id")]
    pub next_id: u64,
}

fn first_id() -> u64 {
    1
}

impl LedgerState {
    pub fn new() -> Self {
        Self {
            next_id: first_id(),
            ..Default::default()
        }
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn account_mut(&mut self, id: AccountId) -> Result<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(Error::AccountNotFound(id))
    }

    /// Shares of `symbol` held by `id`; zero when no holding row exists.
    pub fn holding_quantity(&self, id: AccountId, symbol: &Symbol) -> i64 {
        self.holdings
            .iter()
            .find(|h| h.account == id && &h.symbol == symbol)
            .map(|h| h.quantity)
            .unwrap_or(0)
    }

    pub fn holdings_of(&self, id: AccountId) -> Vec<Holding> {
        self.holdings
            .iter()
            .filter(|h| h.account == id)
            .cloned()
            .collect()
    }

    /// History of one account and symbol, oldest first.
    pub fn history_of(&self, id: AccountId, symbol: &Symbol) -> Vec<TransactionRecord> {
        let mut records: Vec<_> = self
            .history
            .iter()
            .filter(|r| r.account == id && &r.symbol == symbol)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Add `delta` shares to a holding, inserting or deleting the row so that a
    /// row exists exactly when the quantity is positive.
    pub fn adjust_holding(&mut self, id: AccountId, symbol: &Symbol, delta: i64) -> Result<i64> {
        match self
            .holdings
            .iter()
            .position(|h| h.account == id && &h.symbol == symbol)
        {
            Some(idx) => {
                let current = self.holdings[idx].quantity;
                let quantity = current.checked_add(delta).ok_or_else(|| {
                    Error::Constraint(format!(
                        "holding {} of {} cannot change by {}",
                        symbol, id, delta
                    ))
                })?;
                if quantity < 0 {
                    return Err(Error::Constraint(format!(
                        "holding {} of {} would become {}",
                        symbol, id, quantity
                    )));
                }
                if quantity == 0 {
                    self.holdings.remove(idx);
                } else {
                    self.holdings[idx].quantity = quantity;
                }
                Ok(quantity)
            }
            None if delta > 0 => {
                self.holdings.push(Holding {
                    account: id,
                    symbol: symbol.clone(),
                    quantity: delta,
                });
                Ok(delta)
            }
            None if delta == 0 => Ok(0),
            None => Err(Error::Constraint(format!(
                "no holding of {} for {}",
                symbol, id
            ))),
        }
    }

    /// Append a history record and return a copy of it.
    pub fn append_record(
        &mut self,
        id: AccountId,
        symbol: &Symbol,
        price: Decimal,
        quantity: i64,
    ) -> TransactionRecord {
        let record = TransactionRecord {
            id: self.next_id,
            account: id,
            symbol: symbol.clone(),
            price,
            quantity,
            executed_at: Utc::now(),
        };
        self.next_id += 1;
        self.history.push(record.clone());
        record
    }

    /// Remove an account together with its holdings and history.
    pub fn remove_account(&mut self, id: AccountId) -> bool {
        let before = self.accounts.len();
        self.accounts.retain(|a| a.id != id);
        self.holdings.retain(|h| h.account != id);
        self.history.retain(|r| r.account != id);
        self.accounts.len() != before
    }

    /// Check the constraints a relational schema would enforce.
    pub fn validate(&self) -> Result<()> {
        if let Some(account) = self.accounts.iter().find(|a| a.cash < Decimal::ZERO) {
            return Err(Error::Constraint(format!(
                "cash of {} is negative ({})",
                account.id, account.cash
            )));
        }
        if let Some(holding) = self.holdings.iter().find(|h| h.quantity <= 0) {
            return Err(Error::Constraint(format!(
                "holding {} of {} has quantity {}",
                holding.symbol, holding.account, holding.quantity
            )));
        }
        if let Some(holding) = self
            .holdings
            .iter()
            .find(|h| self.account(h.account).is_none())
        {
            return Err(Error::Constraint(format!(
                "holding {} references unknown account {}",
                holding.symbol, holding.account
            )));
        }
        Ok(())
    }

    /// Load from a specific path. A missing or empty file is an empty ledger.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Write to `path` through a temporary file and rename, so readers see
    /// either the old or the new document.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
