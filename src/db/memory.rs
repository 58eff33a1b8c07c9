//! In-memory store
//!
//! A single `MemState` behind an async mutex. `exec_tx` runs the work on a
//! clone of the state and swaps it in only when the work succeeds, which
//! gives all-or-nothing commits. Transactions are fully serialized, so the
//! lock ordering of TransferTx is irrelevant here; the PostgreSQL store is
//! where it matters.
//!
//! Constraints of the PostgreSQL schema that the business logic relies on are
//! enforced: primary keys, `users.email` and `accounts(owner, currency)`
//! uniqueness, and foreign keys to `users` and `accounts`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::{Account, Entry, Session, Transfer, User, VerifyEmail};
use super::queries::{
    CreateAccountParams, CreateEntryParams, CreateSessionParams, CreateTransferParams,
    CreateUserParams, CreateVerifyEmailParams, ListParams, Queries, UpdateUserParams,
    UpdateVerifyEmailParams,
};
use super::store::TxExecutor;

/// Lifetime of a verify-email code, matching the column default
pub const VERIFY_EMAIL_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Default)]
struct MemState {
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
    users: HashMap<String, User>,
    sessions: HashMap<Uuid, Session>,
    verify_emails: BTreeMap<i64, VerifyEmail>,
    next_account_id: i64,
    next_entry_id: i64,
    next_transfer_id: i64,
    next_verify_email_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// [`Queries`] over a borrowed in-memory state
pub struct MemQueries<'a> {
    state: &'a mut MemState,
}

impl MemQueries<'_> {
    fn require_user(&self, username: &str, constraint: &str) -> StoreResult<()> {
        if self.state.users.contains_key(username) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation(constraint.to_string()))
        }
    }

    fn require_account(&self, id: i64, constraint: &str) -> StoreResult<()> {
        if self.state.accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation(constraint.to_string()))
        }
    }
}

#[async_trait]
impl Queries for MemQueries<'_> {
    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account> {
        self.require_user(&arg.owner, "accounts_owner_fkey")?;
        let duplicate = self
            .state
            .accounts
            .values()
            .any(|a| a.owner == arg.owner && a.currency == arg.currency);
        if duplicate {
            return Err(StoreError::UniqueViolation(
                "owner_currency_key".to_string(),
            ));
        }

        let account = Account {
            id: next_id(&mut self.state.next_account_id),
            owner: arg.owner,
            balance: arg.balance,
            currency: arg.currency,
            created_at: Utc::now(),
        };
        self.state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> StoreResult<Account> {
        self.state
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_accounts(&mut self, owner: &str, page: ListParams) -> StoreResult<Vec<Account>> {
        Ok(self
            .state
            .accounts
            .values()
            .filter(|a| a.owner == owner)
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn add_account_balance(&mut self, id: i64, amount: i64) -> StoreResult<Account> {
        let account = self
            .state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::OutOfRange(format!("balance of account {}", id)))?;
        Ok(account.clone())
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry> {
        self.require_account(arg.account_id, "entries_account_id_fkey")?;
        let entry = Entry {
            id: next_id(&mut self.state.next_entry_id),
            account_id: arg.account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.state.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry> {
        self.state
            .entries
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer> {
        self.require_account(arg.from_account_id, "transfers_from_account_id_fkey")?;
        self.require_account(arg.to_account_id, "transfers_to_account_id_fkey")?;
        let transfer = Transfer {
            id: next_id(&mut self.state.next_transfer_id),
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.state.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer> {
        self.state
            .transfers
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_user(&mut self, arg: CreateUserParams) -> StoreResult<User> {
        if self.state.users.contains_key(&arg.username) {
            return Err(StoreError::UniqueViolation("users_pkey".to_string()));
        }
        if self.state.users.values().any(|u| u.email == arg.email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }

        let now = Utc::now();
        let user = User {
            username: arg.username,
            hashed_password: arg.hashed_password,
            full_name: arg.full_name,
            email: arg.email,
            // zero time until the password is first changed
            password_changed_at: chrono::DateTime::<Utc>::UNIX_EPOCH,
            is_email_verified: false,
            created_at: now,
        };
        self.state.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&mut self, username: &str) -> StoreResult<User> {
        self.state
            .users
            .get(username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&mut self, arg: UpdateUserParams) -> StoreResult<User> {
        if let Some(email) = &arg.email {
            let taken = self
                .state
                .users
                .values()
                .any(|u| &u.email == email && u.username != arg.username);
            if taken {
                return Err(StoreError::UniqueViolation("users_email_key".to_string()));
            }
        }

        let user = self
            .state
            .users
            .get_mut(&arg.username)
            .ok_or(StoreError::NotFound)?;
        if let Some(hashed_password) = arg.hashed_password {
            user.hashed_password = hashed_password;
        }
        if let Some(changed_at) = arg.password_changed_at {
            user.password_changed_at = changed_at;
        }
        if let Some(full_name) = arg.full_name {
            user.full_name = full_name;
        }
        if let Some(email) = arg.email {
            user.email = email;
        }
        if let Some(verified) = arg.is_email_verified {
            user.is_email_verified = verified;
        }
        Ok(user.clone())
    }

    async fn create_session(&mut self, arg: CreateSessionParams) -> StoreResult<Session> {
        self.require_user(&arg.username, "sessions_username_fkey")?;
        if self.state.sessions.contains_key(&arg.id) {
            return Err(StoreError::UniqueViolation("sessions_pkey".to_string()));
        }

        let session = Session {
            id: arg.id,
            username: arg.username,
            refresh_token: arg.refresh_token,
            user_agent: arg.user_agent,
            client_ip: arg.client_ip,
            is_blocked: arg.is_blocked,
            expired_at: arg.expired_at,
            created_at: Utc::now(),
        };
        self.state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&mut self, id: Uuid) -> StoreResult<Session> {
        self.state
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn block_session(&mut self, id: Uuid) -> StoreResult<Session> {
        let session = self
            .state
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        session.is_blocked = true;
        Ok(session.clone())
    }

    async fn create_verify_email(
        &mut self,
        arg: CreateVerifyEmailParams,
    ) -> StoreResult<VerifyEmail> {
        self.require_user(&arg.username, "verify_emails_username_fkey")?;
        let now = Utc::now();
        let record = VerifyEmail {
            id: next_id(&mut self.state.next_verify_email_id),
            username: arg.username,
            email: arg.email,
            secret_code: arg.secret_code,
            is_used: false,
            created_at: now,
            expired_at: now + Duration::minutes(VERIFY_EMAIL_TTL_MINUTES),
        };
        self.state.verify_emails.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_verify_email(
        &mut self,
        arg: UpdateVerifyEmailParams,
    ) -> StoreResult<VerifyEmail> {
        let now = Utc::now();
        let record = self
            .state
            .verify_emails
            .get_mut(&arg.email_id)
            .filter(|r| r.secret_code == arg.secret_code && !r.is_used && r.expired_at > now)
            .ok_or(StoreError::NotFound)?;
        record.is_used = true;
        Ok(record.clone())
    }
}

/// In-process [`TxExecutor`]
#[derive(Default)]
pub struct MemStore {
    state: Mutex<MemState>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdates a verify-email record's expiry
    #[cfg(test)]
    pub(crate) async fn expire_verify_email(&self, id: i64, at: chrono::DateTime<Utc>) {
        if let Some(record) = self.state.lock().await.verify_emails.get_mut(&id) {
            record.expired_at = at;
        }
    }
}

#[async_trait]
impl TxExecutor for MemStore {
    async fn exec_tx<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, StoreResult<T>> + Send + 'static,
    {
        let mut guard = self.state.lock().await;
        let mut scratch = guard.clone();
        let result = {
            let mut q = MemQueries {
                state: &mut scratch,
            };
            work(&mut q).await
        };
        if result.is_ok() {
            *guard = scratch;
        }
        result
    }

    async fn exec<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, StoreResult<T>> + Send + 'static,
    {
        let mut guard = self.state.lock().await;
        let mut q = MemQueries { state: &mut *guard };
        work(&mut q).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::store::Store;
    use crate::db::tx_transfer::TransferTxParams;

    #[tokio::test]
    async fn test_exec_tx_rolls_back_on_error() {
        let store = MemStore::new();
        let user = seed_user(&store).await;
        let owner = user.username.clone();

        let err = store
            .exec_tx(move |q| {
                Box::pin(async move {
                    q.create_account(CreateAccountParams {
                        owner,
                        balance: 10,
                        currency: "USD".to_string(),
                    })
                    .await?;
                    Err::<(), _>(StoreError::InvalidArgument("boom".into()))
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let accounts = store
            .list_accounts(&user.username, ListParams { limit: 10, offset: 0 })
            .await
            .unwrap();
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn test_account_owner_currency_unique() {
        let store = MemStore::new();
        let user = seed_user(&store).await;
        seed_account(&store, &user.username, "USD", 0).await;

        let err = store
            .create_account(CreateAccountParams {
                owner: user.username.clone(),
                balance: 0,
                currency: "USD".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // other currency is fine
        seed_account(&store, &user.username, "EUR", 0).await;
    }

    #[tokio::test]
    async fn test_list_accounts_paginates_by_owner() {
        let store = MemStore::new();
        let user = seed_user(&store).await;
        let other = seed_user(&store).await;
        for currency in ["USD", "EUR", "TWD"] {
            seed_account(&store, &user.username, currency, 0).await;
        }
        seed_account(&store, &other.username, "USD", 0).await;

        let first = store
            .list_accounts(&user.username, ListParams { limit: 2, offset: 0 })
            .await
            .unwrap();
        let rest = store
            .list_accounts(&user.username, ListParams { limit: 2, offset: 2 })
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(rest.len(), 1);
        assert!(first.iter().chain(&rest).all(|a| a.owner == user.username));
    }

    #[tokio::test]
    async fn test_balance_overflow_is_an_error_and_rolls_back() {
        let store = MemStore::new();
        let alice = seed_user(&store).await;
        let bob = seed_user(&store).await;
        let from = seed_account(&store, &alice.username, "USD", 0).await;
        let to = seed_account(&store, &bob.username, "USD", 1).await;

        let err = store
            .transfer_tx(TransferTxParams::new(from.id, to.id, i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange(_)));

        // neither balance nor ledger rows were committed
        assert_eq!(store.get_account(from.id).await.unwrap().balance, 0);
        assert_eq!(store.get_account(to.id).await.unwrap().balance, 1);
        assert!(store.get_transfer(1).await.unwrap_err().is_not_found());
        assert!(store.get_entry(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_block_session() {
        let store = MemStore::new();
        let user = seed_user(&store).await;
        let id = Uuid::new_v4();
        store
            .create_session(CreateSessionParams {
                id,
                username: user.username,
                refresh_token: "token".to_string(),
                user_agent: "test".to_string(),
                client_ip: "127.0.0.1".to_string(),
                is_blocked: false,
                expired_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        let blocked = store.block_session(id).await.unwrap();
        assert!(blocked.is_blocked);
        assert!(store.get_session(id).await.unwrap().is_blocked);
        assert!(store.block_session(Uuid::new_v4()).await.unwrap_err().is_not_found());
    }
}
