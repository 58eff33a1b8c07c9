//! Relational store
//!
//! - [`queries`] - the query capability (point CRUD, no transaction awareness)
//! - [`store`] - transactional executor and the business transactions on top
//! - [`pg`] - PostgreSQL implementation
//! - [`memory`] - in-process implementation used by tests and local runs
//! - [`schema`] - PostgreSQL DDL

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod queries;
pub mod schema;
pub mod store;
pub mod tx_create_user;
pub mod tx_transfer;
pub mod tx_verify_email;

pub use error::{CallbackError, StoreError, StoreResult};
pub use memory::MemStore;
pub use models::{Account, Entry, Session, Transfer, User, VerifyEmail};
pub use pg::PgStore;
pub use queries::Queries;
pub use store::{Store, TxExecutor};
pub use tx_create_user::{AfterCreate, after_create, CreateUserTxParams, CreateUserTxResult};
pub use tx_transfer::{TransferTxParams, TransferTxResult};
pub use tx_verify_email::{VerifyEmailTxParams, VerifyEmailTxResult};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create missing tables; see [`schema`]
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        schema::init_schema(&self.pool).await
    }
}
