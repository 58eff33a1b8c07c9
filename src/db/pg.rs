//! PostgreSQL store
//!
//! [`PgQueries`] runs the query capability against any `PgConnection`, so
//! the same code serves a transaction (`exec_tx`) or a pooled connection in
//! autocommit mode (`exec`). Cancellation is future drop: an `exec_tx`
//! future dropped before commit drops its `sqlx::Transaction`, which rolls
//! back.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::PgConnection;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::{Account, Entry, Session, Transfer, User, VerifyEmail};
use super::queries::{
    CreateAccountParams, CreateEntryParams, CreateSessionParams, CreateTransferParams,
    CreateUserParams, CreateVerifyEmailParams, ListParams, Queries, UpdateUserParams,
    UpdateVerifyEmailParams,
};
use super::store::TxExecutor;

/// [`Queries`] bound to one connection or transaction
pub struct PgQueries<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgQueries<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Queries for PgQueries<'_> {
    async fn create_account(&mut self, arg: CreateAccountParams) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts (owner, balance, currency)
               VALUES ($1, $2, $3)
               RETURNING id, owner, balance, currency, created_at"#,
        )
        .bind(&arg.owner)
        .bind(arg.balance)
        .bind(&arg.currency)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"SELECT id, owner, balance, currency, created_at
               FROM accounts WHERE id = $1 LIMIT 1"#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(account)
    }

    async fn list_accounts(&mut self, owner: &str, page: ListParams) -> StoreResult<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(
            r#"SELECT id, owner, balance, currency, created_at
               FROM accounts WHERE owner = $1
               ORDER BY id
               LIMIT $2 OFFSET $3"#,
        )
        .bind(owner)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(accounts)
    }

    async fn add_account_balance(&mut self, id: i64, amount: i64) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"UPDATE accounts SET balance = balance + $2
               WHERE id = $1
               RETURNING id, owner, balance, currency, created_at"#,
        )
        .bind(id)
        .bind(amount)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(account)
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> StoreResult<Entry> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"INSERT INTO entries (account_id, amount)
               VALUES ($1, $2)
               RETURNING id, account_id, amount, created_at"#,
        )
        .bind(arg.account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> StoreResult<Entry> {
        let entry = sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries WHERE id = $1 LIMIT 1",
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(entry)
    }

    async fn create_transfer(&mut self, arg: CreateTransferParams) -> StoreResult<Transfer> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"INSERT INTO transfers (from_account_id, to_account_id, amount)
               VALUES ($1, $2, $3)
               RETURNING id, from_account_id, to_account_id, amount, created_at"#,
        )
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> StoreResult<Transfer> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"SELECT id, from_account_id, to_account_id, amount, created_at
               FROM transfers WHERE id = $1 LIMIT 1"#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(transfer)
    }

    async fn create_user(&mut self, arg: CreateUserParams) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (username, hashed_password, full_name, email)
               VALUES ($1, $2, $3, $4)
               RETURNING username, hashed_password, full_name, email,
                         password_changed_at, is_email_verified, created_at"#,
        )
        .bind(&arg.username)
        .bind(&arg.hashed_password)
        .bind(&arg.full_name)
        .bind(&arg.email)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(user)
    }

    async fn get_user(&mut self, username: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT username, hashed_password, full_name, email,
                      password_changed_at, is_email_verified, created_at
               FROM users WHERE username = $1 LIMIT 1"#,
        )
        .bind(username)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(user)
    }

    async fn update_user(&mut self, arg: UpdateUserParams) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"UPDATE users SET
                 hashed_password = COALESCE($2, hashed_password),
                 password_changed_at = COALESCE($3, password_changed_at),
                 full_name = COALESCE($4, full_name),
                 email = COALESCE($5, email),
                 is_email_verified = COALESCE($6, is_email_verified)
               WHERE username = $1
               RETURNING username, hashed_password, full_name, email,
                         password_changed_at, is_email_verified, created_at"#,
        )
        .bind(&arg.username)
        .bind(arg.hashed_password)
        .bind(arg.password_changed_at)
        .bind(arg.full_name)
        .bind(arg.email)
        .bind(arg.is_email_verified)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(user)
    }

    async fn create_session(&mut self, arg: CreateSessionParams) -> StoreResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"INSERT INTO sessions
                 (id, username, refresh_token, user_agent, client_ip, is_blocked, expired_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, username, refresh_token, user_agent, client_ip,
                         is_blocked, expired_at, created_at"#,
        )
        .bind(arg.id)
        .bind(&arg.username)
        .bind(&arg.refresh_token)
        .bind(&arg.user_agent)
        .bind(&arg.client_ip)
        .bind(arg.is_blocked)
        .bind(arg.expired_at)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(session)
    }

    async fn get_session(&mut self, id: Uuid) -> StoreResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"SELECT id, username, refresh_token, user_agent, client_ip,
                      is_blocked, expired_at, created_at
               FROM sessions WHERE id = $1 LIMIT 1"#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(session)
    }

    async fn block_session(&mut self, id: Uuid) -> StoreResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"UPDATE sessions SET is_blocked = TRUE
               WHERE id = $1
               RETURNING id, username, refresh_token, user_agent, client_ip,
                         is_blocked, expired_at, created_at"#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(session)
    }

    async fn create_verify_email(
        &mut self,
        arg: CreateVerifyEmailParams,
    ) -> StoreResult<VerifyEmail> {
        let record = sqlx::query_as::<_, VerifyEmail>(
            r#"INSERT INTO verify_emails (username, email, secret_code)
               VALUES ($1, $2, $3)
               RETURNING id, username, email, secret_code, is_used, created_at, expired_at"#,
        )
        .bind(&arg.username)
        .bind(&arg.email)
        .bind(&arg.secret_code)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(record)
    }

    async fn update_verify_email(
        &mut self,
        arg: UpdateVerifyEmailParams,
    ) -> StoreResult<VerifyEmail> {
        let record = sqlx::query_as::<_, VerifyEmail>(
            r#"UPDATE verify_emails SET is_used = TRUE
               WHERE id = $1
                 AND secret_code = $2
                 AND is_used = FALSE
                 AND expired_at > now()
               RETURNING id, username, email, secret_code, is_used, created_at, expired_at"#,
        )
        .bind(arg.email_id)
        .bind(&arg.secret_code)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(record)
    }
}

/// PostgreSQL-backed [`TxExecutor`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    tx_timeout: Option<Duration>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx_timeout: None,
        }
    }

    /// Abort transactions that run longer than `timeout`
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl PgStore {
    async fn run_tx<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, StoreResult<T>>,
    {
        let mut tx = self.pool.begin().await?;
        let result = {
            let mut q = PgQueries::new(&mut *tx);
            work(&mut q).await
        };

        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb_err) = tx.rollback().await {
                    tracing::error!(error = %err, rollback_error = %rb_err, "rollback failed");
                    return Err(StoreError::Rollback {
                        source: Box::new(err),
                        rollback: rb_err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl TxExecutor for PgStore {
    async fn exec_tx<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, StoreResult<T>> + Send + 'static,
    {
        match self.tx_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_tx(work))
                .await
                .map_err(|_| {
                    tracing::warn!(
                        timeout_ms = limit.as_millis() as u64,
                        "transaction deadline exceeded"
                    );
                    StoreError::DeadlineExceeded
                })?,
            None => self.run_tx(work).await,
        }
    }

    async fn exec<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, StoreResult<T>> + Send + 'static,
    {
        let mut conn = self.pool.acquire().await?;
        let mut q = PgQueries::new(&mut *conn);
        work(&mut q).await
    }
}
