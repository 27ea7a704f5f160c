//! Account ledger: cash, holdings and trade history with atomic statement groups.

mod executor;
mod store;

pub use executor::TradeOutcome;
pub use store::LedgerState;

use crate::types::{Account, AccountId, Holding, Symbol, TransactionRecord};
use crate::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Number of trades shown in an account report.
pub const REPORT_HISTORY_LEN: usize = 5;

/// How a statement group ends.
#[derive(Debug)]
pub enum Completion<T> {
    /// Keep the changes made to the draft.
    Commit(T),
    /// Discard the draft; the ledger is left exactly as it was.
    Rollback(T),
}

/// Shared ledger handle.
///
/// All mutations go through [`Ledger::transaction`]: the closure edits a
/// private copy of the state, which replaces the live state only after it
/// validates and (for file-backed ledgers) is written to disk.
///
/// Methods are synchronous. A file-backed commit writes and syncs the file
/// while holding the state lock, so async callers should run writes through
/// `tokio::task::spawn_blocking`.
#[derive(Debug)]
pub struct Ledger {
    /// Backing file; `None` for in-memory ledgers
    path: Option<PathBuf>,
    state: Mutex<LedgerState>,
}

/// Administrative view of a single account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountReport {
    pub account: Account,
    pub holdings: Vec<Holding>,
    /// Most recent trades, oldest first
    pub recent_trades: Vec<TransactionRecord>,
}

impl Ledger {
    /// Open a file-backed ledger, creating an empty one if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = LedgerState::load_from_path(&path)?;
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Create an in-memory ledger (no persistence).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(LedgerState::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // The live state is only ever replaced wholesale, so a poisoned lock
        // still guards a consistent document.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a statement group.
    ///
    /// Errors from the closure, constraint violations and write failures all
    /// leave the ledger untouched.
    pub fn transaction<T>(
        &self,
        op: impl FnOnce(&mut LedgerState) -> Result<Completion<T>>,
    ) -> Result<T> {
        let mut live = self.lock();
        let mut draft = live.clone();

        match op(&mut draft)? {
            Completion::Rollback(value) => Ok(value),
            Completion::Commit(value) => {
                draft.validate()?;
                if let Some(path) = &self.path {
                    draft.save_to_path(path)?;
                }
                *live = draft;
                Ok(value)
            }
        }
    }

    /// Run a read-only query against a consistent snapshot.
    pub fn read<T>(&self, query: impl FnOnce(&LedgerState) -> T) -> T {
        query(&self.lock())
    }

    /// Create the account on first contact. Returns the account and whether it
    /// was created by this call.
    pub fn ensure_account(
        &self,
        id: AccountId,
        starting_cash: Decimal,
        handle: Option<&str>,
    ) -> Result<(Account, bool)> {
        if let Some(account) = self.account(id) {
            return Ok((account, false));
        }

        self.transaction(|state| {
            if let Some(account) = state.account(id) {
                return Ok(Completion::Rollback((account.clone(), false)));
            }
            let account = Account::new(id, starting_cash, handle.map(str::to_string));
            state.accounts.push(account.clone());
            tracing::info!("Created account {} with {}", id, starting_cash);
            Ok(Completion::Commit((account, true)))
        })
    }

    /// Store the platform handle if it differs from the recorded one.
    pub fn sync_handle(&self, id: AccountId, handle: Option<&str>) -> Result<()> {
        let current = self.read(|state| state.account(id).map(|a| a.handle.clone()));
        match current {
            Some(existing) if existing.as_deref() != handle => self.transaction(|state| {
                state.account_mut(id)?.handle = handle.map(str::to_string);
                Ok(Completion::Commit(()))
            }),
            _ => Ok(()),
        }
    }

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.read(|state| state.account(id).cloned())
    }

    pub fn cash(&self, id: AccountId) -> Option<Decimal> {
        self.read(|state| state.account(id).map(|a| a.cash))
    }

    /// Shares of `symbol` held by `id`, zero if none.
    pub fn holding(&self, id: AccountId, symbol: &Symbol) -> i64 {
        self.read(|state| state.holding_quantity(id, symbol))
    }

    pub fn holdings(&self, id: AccountId) -> Vec<Holding> {
        self.read(|state| state.holdings_of(id))
    }

    /// Trade history of one account and symbol, oldest first.
    pub fn history(&self, id: AccountId, symbol: &Symbol) -> Vec<TransactionRecord> {
        self.read(|state| state.history_of(id, symbol))
    }

    /// Account roster for the administrative console.
    pub fn accounts(&self) -> Vec<Account> {
        self.read(|state| state.accounts.clone())
    }

    /// Ids of every known account except `excluded`.
    pub fn account_ids_except(&self, excluded: Option<AccountId>) -> Vec<AccountId> {
        self.read(|state| {
            state
                .accounts
                .iter()
                .map(|a| a.id)
                .filter(|id| Some(*id) != excluded)
                .collect()
        })
    }

    pub fn report(&self, id: AccountId) -> Option<AccountReport> {
        self.read(|state| {
            let account = state.account(id)?.clone();
            let mut trades: Vec<_> = state
                .history
                .iter()
                .filter(|r| r.account == id)
                .cloned()
                .collect();
            trades.sort_by_key(|r| r.id);
            let skip = trades.len().saturating_sub(REPORT_HISTORY_LEN);
            Some(AccountReport {
                account,
                holdings: state.holdings_of(id),
                recent_trades: trades.split_off(skip),
            })
        })
    }

    /// Delete an account with all its holdings and history in one group.
    pub fn purge(&self, id: AccountId) -> Result<bool> {
        self.transaction(|state| {
            if state.remove_account(id) {
                tracing::info!("Purged account {}", id);
                Ok(Completion::Commit(true))
            } else {
                Ok(Completion::Rollback(false))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use rust_decimal_macros::dec;
    use std::fs;
    use tempfile::tempdir;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    #[test]
    fn test_ensure_account_once() {
        let ledger = Ledger::in_memory();

        let (account, created) = ledger
            .ensure_account(AccountId(1), dec!(10000.00), Some("alice"))
            .unwrap();
        assert!(created);
        assert_eq!(account.cash, dec!(10000.00));
        assert_eq!(account.handle.as_deref(), Some("alice"));

        let (_, created) = ledger
            .ensure_account(AccountId(1), dec!(50.00), None)
            .unwrap();
        assert!(!created);
        assert_eq!(ledger.accounts().len(), 1);
        assert_eq!(ledger.cash(AccountId(1)), Some(dec!(10000.00)));
    }

    #[test]
    fn test_sync_handle() {
        let ledger = Ledger::in_memory();
        ledger
            .ensure_account(AccountId(1), dec!(100), Some("other"))
            .unwrap();

        ledger.sync_handle(AccountId(1), Some("test")).unwrap();
        assert_eq!(
            ledger.account(AccountId(1)).unwrap().handle.as_deref(),
            Some("test")
        );

        ledger.sync_handle(AccountId(1), None).unwrap();
        assert!(ledger.account(AccountId(1)).unwrap().handle.is_none());

        // Unknown accounts are left alone.
        ledger.sync_handle(AccountId(2), Some("ghost")).unwrap();
        assert!(ledger.account(AccountId(2)).is_none());
    }

    #[test]
    fn test_failed_group_leaves_state() {
        let ledger = Ledger::in_memory();
        ledger.ensure_account(AccountId(1), dec!(100), None).unwrap();
        let before = ledger.read(|s| s.clone());

        let result: Result<()> = ledger.transaction(|state| {
            state.account_mut(AccountId(1))?.cash -= dec!(40);
            state.adjust_holding(AccountId(1), &sym("AAPL"), 1)?;
            Err(Error::InvalidOperation("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(ledger.read(|s| s.clone()), before);
    }

    #[test]
    fn test_constraint_violation_rolls_back() {
        let ledger = Ledger::in_memory();
        ledger.ensure_account(AccountId(1), dec!(100), None).unwrap();
        let before = ledger.read(|s| s.clone());

        let result = ledger.transaction(|state| {
            state.account_mut(AccountId(1))?.cash -= dec!(100.01);
            Ok(Completion::Commit(()))
        });

        assert!(matches!(result, Err(Error::Constraint(_))));
        assert_eq!(ledger.read(|s| s.clone()), before);
    }

    #[test]
    fn test_write_failure_rolls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = Ledger::open(&path).unwrap();
        ledger.ensure_account(AccountId(1), dec!(100), None).unwrap();
        let before = ledger.read(|s| s.clone());

        // Replace the file's directory entry with a directory so the rename fails.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let result = ledger.transaction(|state| {
            state.account_mut(AccountId(1))?.cash -= dec!(10);
            Ok(Completion::Commit(()))
        });

        assert!(result.is_err());
        assert_eq!(ledger.read(|s| s.clone()), before);
    }

    #[test]
    fn test_reopen_sees_committed_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.ensure_account(AccountId(1), dec!(100), None).unwrap();
        }

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.cash(AccountId(1)), Some(dec!(100)));
    }

    #[test]
    fn test_report_keeps_last_five() {
        let ledger = Ledger::in_memory();
        ledger.ensure_account(AccountId(1), dec!(1000), None).unwrap();
        ledger
            .transaction(|state| {
                for i in 0..7 {
                    state.append_record(AccountId(1), &sym("IBM"), Decimal::from(i), 1);
                }
                state.adjust_holding(AccountId(1), &sym("IBM"), 7)?;
                Ok(Completion::Commit(()))
            })
            .unwrap();

        let report = ledger.report(AccountId(1)).unwrap();
        assert_eq!(report.holdings.len(), 1);
        let ids: Vec<_> = report.recent_trades.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6, 7]);
        assert!(ledger.report(AccountId(2)).is_none());
    }

    #[test]
    fn test_purge_and_roster() {
        let ledger = Ledger::in_memory();
        ledger.ensure_account(AccountId(1), dec!(10), None).unwrap();
        ledger.ensure_account(AccountId(2), dec!(10), None).unwrap();

        assert_eq!(
            ledger.account_ids_except(Some(AccountId(1))),
            vec![AccountId(2)]
        );
        assert!(ledger.purge(AccountId(1)).unwrap());
        assert!(!ledger.purge(AccountId(1)).unwrap());
        assert_eq!(ledger.account_ids_except(None), vec![AccountId(2)]);
    }
}
