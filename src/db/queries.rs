//! Query capability
//!
//! Point CRUD operations against the bank tables. Every method returns the
//! affected row or [`StoreError::NotFound`](super::StoreError::NotFound).
//! Implementations know nothing about transactions: the executor decides
//! whether a `Queries` is bound to a transaction or to a plain connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::StoreResult;
use super::models::{Account, Entry, Session, Transfer, User, VerifyEmail};

#[derive(Debug, Clone)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateEntryParams {
    pub account_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateTransferParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
}

/// Partial user update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub username: String,
    pub hashed_password: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub is_email_verified: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateVerifyEmailParams {
    pub username: String,
    pub email: String,
    pub secret_code: String,
}

/// Marks a verify-email record used. Matches only an unused, unexpired
/// record with the given id and secret code.
#[derive(Debug, Clone)]
pub struct UpdateVerifyEmailParams {
    pub email_id: i64,
    pub secret_code: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait Queries: Send {
    // === Accounts ===

    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account>;

    async fn get_account(&mut self, id: i64) -> StoreResult<Account>;

    async fn list_accounts(&mut self, owner: &str, page: ListParams) -> StoreResult<Vec<Account>>;

    /// Single-statement `balance = balance + amount`; the row stays locked
    /// until the enclosing transaction ends.
    async fn add_account_balance(&mut self, id: i64, amount: i64) -> StoreResult<Account>;

    // === Ledger ===

    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry>;

    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry>;

    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer>;

    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer>;

    // === Users ===

    async fn create_user(&mut self, arg: CreateUserParams) -> StoreResult<User>;

    async fn get_user(&mut self, username: &str) -> StoreResult<User>;

    async fn update_user(&mut self, arg: UpdateUserParams) -> StoreResult<User>;

    // === Sessions ===

    async fn create_session(&mut self, arg: CreateSessionParams) -> StoreResult<Session>;

    async fn get_session(&mut self, id: Uuid) -> StoreResult<Session>;

    async fn block_session(&mut self, id: Uuid) -> StoreResult<Session>;

    // === Email verification ===

    async fn create_verify_email(&mut self, arg: CreateVerifyEmailParams)
    -> StoreResult<VerifyEmail>;

    async fn update_verify_email(&mut self, arg: UpdateVerifyEmailParams)
    -> StoreResult<VerifyEmail>;
}
