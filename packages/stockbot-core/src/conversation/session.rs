//! Session store keyed by account, with per-account serialization.

use super::state::{ConversationState, Session};
use crate::types::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// Holds at most one session per account.
///
/// Sessions idle for longer than the TTL are treated as absent. Each account
/// also gets an async lock so that one account's inputs are handled one at a
/// time while other accounts proceed.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<AccountId, Session>>,
    locks: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<AccountId, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for exclusive use of `account`'s conversation.
    pub async fn lock_account(&self, account: AccountId) -> AccountTurn<'_> {
        let lock = self.locks().entry(account).or_default().clone();
        AccountTurn {
            store: self,
            account,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drop expired sessions, then the lock of `account` if it has no session
    /// and nobody else holds or waits for it.
    fn release(&self, account: AccountId) {
        self.evict_expired();
        if self.sessions().contains_key(&account) {
            return;
        }
        let mut locks = self.locks();
        if locks
            .get(&account)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&account);
        }
    }

    /// Remove every expired session and return how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at.elapsed() <= self.ttl);
        before - sessions.len()
    }

    /// Accounts that currently have a lock entry.
    pub fn tracked_accounts(&self) -> usize {
        self.locks().len()
    }

    /// Current session, if one exists and has not expired.
    pub fn get(&self, account: AccountId) -> Option<Session> {
        let mut sessions = self.sessions();
        let expired = sessions
            .get(&account)
            .map(|s| s.updated_at.elapsed() > self.ttl)?;
        if expired {
            tracing::debug!("Session of account {} expired", account);
            sessions.remove(&account);
            return None;
        }
        sessions.get(&account).cloned()
    }

    pub fn state(&self, account: AccountId) -> ConversationState {
        self.get(account)
            .map(|s| s.state)
            .unwrap_or(ConversationState::Idle)
    }

    /// Store `session`, replacing any previous one. Storing `Idle` clears.
    pub fn set(&self, account: AccountId, session: Session) {
        if session.state == ConversationState::Idle {
            self.clear(account);
            return;
        }
        self.sessions().insert(account, session);
    }

    pub fn clear(&self, account: AccountId) -> Option<Session> {
        self.sessions().remove(&account)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions()
            .values()
            .filter(|s| s.updated_at.elapsed() <= self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive turn on one account's conversation. Dropping it releases the
/// account and prunes its lock entry once idle.
#[derive(Debug)]
pub struct AccountTurn<'a> {
    store: &'a SessionStore,
    account: AccountId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AccountTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.store.release(self.account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::state::FlowKind;

    fn awaiting(flow: FlowKind) -> Session {
        Session::new(ConversationState::AwaitingSymbol { flow }, Some(7))
    }

    #[tokio::test]
    async fn test_set_replace_clear() {
        let store = SessionStore::new(Duration::from_secs(60));
        let account = AccountId(1);

        assert_eq!(store.state(account), ConversationState::Idle);

        store.set(account, awaiting(FlowKind::Buy));
        store.set(account, awaiting(FlowKind::Sell));
        assert_eq!(
            store.state(account),
            ConversationState::AwaitingSymbol {
                flow: FlowKind::Sell
            }
        );
        assert_eq!(store.len(), 1);

        store.set(account, Session::new(ConversationState::Idle, None));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_is_absent() {
        let store = SessionStore::new(Duration::from_secs(60));
        let account = AccountId(1);
        store.set(account, awaiting(FlowKind::Quote));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.get(account).is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.get(account).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_lock_entries_are_pruned() {
        let store = SessionStore::new(Duration::from_secs(60));
        let account = AccountId(1);

        drop(store.lock_account(account).await);
        assert_eq!(store.tracked_accounts(), 0);

        {
            let _turn = store.lock_account(account).await;
            store.set(account, awaiting(FlowKind::Buy));
        }
        assert_eq!(store.tracked_accounts(), 1);

        {
            let _turn = store.lock_account(account).await;
            store.clear(account);
        }
        assert_eq!(store.tracked_accounts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_sessions_not_counted() {
        let store = SessionStore::new(Duration::from_secs(60));
        {
            let _turn = store.lock_account(AccountId(1)).await;
            store.set(AccountId(1), awaiting(FlowKind::Sell));
        }
        store.set(AccountId(2), awaiting(FlowKind::Quote));
        assert_eq!(store.len(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.len(), 0);

        // The next turn on any account sweeps expired sessions and idle locks.
        drop(store.lock_account(AccountId(3)).await);
        assert_eq!(store.evict_expired(), 0);
        drop(store.lock_account(AccountId(1)).await);
        assert_eq!(store.tracked_accounts(), 0);
    }

    #[tokio::test]
    async fn test_account_lock_is_exclusive() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let guard = store.lock_account(AccountId(1)).await;

        // A different account is not blocked.
        let other = store.lock_account(AccountId(2)).await;
        drop(other);

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _guard = store.lock_account(AccountId(1)).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }
}
