//! Simple Bank - banking backend
//!
//! Accounts with money transfers, users with email verification, and
//! token-based sessions.
//!
//! # Modules
//!
//! - [`db`] - Transactional store (TransferTx, CreateUserTx, VerifyEmailTx)
//! - [`worker`] - Async task queue: distributor, broker, processor
//! - [`token`] - Signed bearer tokens (JWT, HS256)
//! - [`auth`] - Password hashing and refresh-session lifecycle
//! - [`mail`] - Outbound email
//! - [`gateway`] - HTTP API (axum)
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod auth;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod mail;
pub mod shutdown;
pub mod token;
pub mod worker;

pub use db::{MemStore, PgStore, Store, StoreError};
pub use shutdown::ShutdownSignal;
pub use token::{JwtMaker, Maker, Payload};
