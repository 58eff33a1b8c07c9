//! Transactional executor and the business-level store
//!
//! [`TxExecutor`] is the unit of work: `exec_tx` hands the caller a
//! transaction-bound [`Queries`], commits when the work returns `Ok` and
//! rolls back otherwise. [`Store`] is the object-safe surface the rest of the
//! crate depends on; every `TxExecutor` gets it through the blanket impl, so
//! the business transactions are written once for PostgreSQL and the
//! in-memory store alike.

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::{Account, Entry, Session, Transfer, User, VerifyEmail};
use super::queries::{
    CreateAccountParams, CreateSessionParams, CreateVerifyEmailParams, ListParams, Queries,
};
use super::tx_create_user::{self, CreateUserTxParams, CreateUserTxResult};
use super::tx_transfer::{self, TransferTxParams, TransferTxResult};
use super::tx_verify_email::{self, VerifyEmailTxParams, VerifyEmailTxResult};

/// Unit of work executor.
///
/// Callers must not call `exec_tx` from inside another `exec_tx` work
/// closure: nested transactions are not supported.
#[async_trait]
pub trait TxExecutor: Send + Sync {
    /// Run `work` inside one database transaction.
    ///
    /// On `Err` the transaction is rolled back and the original error is
    /// returned; a rollback failure is reported as [`StoreError::Rollback`]
    /// carrying both errors.
    async fn exec_tx<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, StoreResult<T>> + Send + 'static;

    /// Run `work` on a single connection in autocommit mode.
    async fn exec<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, StoreResult<T>> + Send + 'static;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn transfer_tx(&self, arg: TransferTxParams) -> StoreResult<TransferTxResult>;

    async fn create_user_tx(&self, arg: CreateUserTxParams) -> StoreResult<CreateUserTxResult>;

    async fn verify_email_tx(&self, arg: VerifyEmailTxParams) -> StoreResult<VerifyEmailTxResult>;

    async fn create_account(&self, arg: CreateAccountParams) -> StoreResult<Account>;

    async fn get_account(&self, id: i64) -> StoreResult<Account>;

    async fn list_accounts(&self, owner: &str, page: ListParams) -> StoreResult<Vec<Account>>;

    async fn get_entry(&self, id: i64) -> StoreResult<Entry>;

    async fn get_transfer(&self, id: i64) -> StoreResult<Transfer>;

    async fn get_user(&self, username: &str) -> StoreResult<User>;

    async fn create_session(&self, arg: CreateSessionParams) -> StoreResult<Session>;

    async fn get_session(&self, id: Uuid) -> StoreResult<Session>;

    async fn block_session(&self, id: Uuid) -> StoreResult<Session>;

    async fn create_verify_email(&self, arg: CreateVerifyEmailParams) -> StoreResult<VerifyEmail>;
}

#[async_trait]
impl<E: TxExecutor> Store for E {
    async fn transfer_tx(&self, arg: TransferTxParams) -> StoreResult<TransferTxResult> {
        arg.validate()?;
        self.exec_tx(move |q| Box::pin(tx_transfer::transfer(q, arg)))
            .await
    }

    async fn create_user_tx(&self, arg: CreateUserTxParams) -> StoreResult<CreateUserTxResult> {
        self.exec_tx(move |q| Box::pin(tx_create_user::create_user(q, arg)))
            .await
    }

    async fn verify_email_tx(&self, arg: VerifyEmailTxParams) -> StoreResult<VerifyEmailTxResult> {
        self.exec_tx(move |q| Box::pin(tx_verify_email::verify_email(q, arg)))
            .await
    }

    async fn create_account(&self, arg: CreateAccountParams) -> StoreResult<Account> {
        self.exec(move |q| Box::pin(async move { q.create_account(arg).await }))
            .await
    }

    async fn get_account(&self, id: i64) -> StoreResult<Account> {
        self.exec(move |q| Box::pin(async move { q.get_account(id).await }))
            .await
    }

    async fn list_accounts(&self, owner: &str, page: ListParams) -> StoreResult<Vec<Account>> {
        let owner = owner.to_owned();
        self.exec(move |q| Box::pin(async move { q.list_accounts(&owner, page).await }))
            .await
    }

    async fn get_entry(&self, id: i64) -> StoreResult<Entry> {
        self.exec(move |q| Box::pin(async move { q.get_entry(id).await }))
            .await
    }

    async fn get_transfer(&self, id: i64) -> StoreResult<Transfer> {
        self.exec(move |q| Box::pin(async move { q.get_transfer(id).await }))
            .await
    }

    async fn get_user(&self, username: &str) -> StoreResult<User> {
        let username = username.to_owned();
        self.exec(move |q| Box::pin(async move { q.get_user(&username).await }))
            .await
    }

    async fn create_session(&self, arg: CreateSessionParams) -> StoreResult<Session> {
        self.exec(move |q| Box::pin(async move { q.create_session(arg).await }))
            .await
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Session> {
        self.exec(move |q| Box::pin(async move { q.get_session(id).await }))
            .await
    }

    async fn block_session(&self, id: Uuid) -> StoreResult<Session> {
        self.exec(move |q| Box::pin(async move { q.block_session(id).await }))
            .await
    }

    async fn create_verify_email(&self, arg: CreateVerifyEmailParams) -> StoreResult<VerifyEmail> {
        self.exec(move |q| Box::pin(async move { q.create_verify_email(arg).await }))
            .await
    }
}

/// Shorthand used by tests and callers that only need a
/// `StoreError::InvalidArgument`.
pub(crate) fn invalid(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidArgument(msg.into())
}
