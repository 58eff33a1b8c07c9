//! PostgreSQL schema for the store and the task broker

use sqlx::PgPool;

/// Create every table and index that does not exist yet
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in [
        ("users", CREATE_USERS_TABLE),
        ("verify_emails", CREATE_VERIFY_EMAILS_TABLE),
        ("accounts", CREATE_ACCOUNTS_TABLE),
        ("entries", CREATE_ENTRIES_TABLE),
        ("transfers", CREATE_TRANSFERS_TABLE),
        ("sessions", CREATE_SESSIONS_TABLE),
        ("tasks", CREATE_TASKS_TABLE),
    ] {
        sqlx::raw_sql(ddl).execute(pool).await.inspect_err(|e| {
            tracing::error!(table = name, error = %e, "failed to create table");
        })?;
    }

    tracing::info!("PostgreSQL schema ready");
    Ok(())
}

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username            VARCHAR PRIMARY KEY,
    hashed_password     VARCHAR NOT NULL,
    full_name           VARCHAR NOT NULL,
    email               VARCHAR UNIQUE NOT NULL,
    is_email_verified   BOOLEAN NOT NULL DEFAULT FALSE,
    password_changed_at TIMESTAMPTZ NOT NULL DEFAULT '0001-01-01 00:00:00Z',
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

pub const CREATE_VERIFY_EMAILS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS verify_emails (
    id          BIGSERIAL PRIMARY KEY,
    username    VARCHAR NOT NULL REFERENCES users (username),
    email       VARCHAR NOT NULL,
    secret_code VARCHAR NOT NULL,
    is_used     BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    expired_at  TIMESTAMPTZ NOT NULL DEFAULT (now() + interval '15 minutes')
);
"#;

pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id         BIGSERIAL PRIMARY KEY,
    owner      VARCHAR NOT NULL REFERENCES users (username),
    balance    BIGINT NOT NULL,
    currency   VARCHAR NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT owner_currency_key UNIQUE (owner, currency)
);
CREATE INDEX IF NOT EXISTS accounts_owner_idx ON accounts (owner);
"#;

/// `amount` is signed: negative debits, positive credits
pub const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id         BIGSERIAL PRIMARY KEY,
    account_id BIGINT NOT NULL REFERENCES accounts (id),
    amount     BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS entries_account_id_idx ON entries (account_id);
"#;

pub const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id              BIGSERIAL PRIMARY KEY,
    from_account_id BIGINT NOT NULL REFERENCES accounts (id),
    to_account_id   BIGINT NOT NULL REFERENCES accounts (id),
    amount          BIGINT NOT NULL CHECK (amount > 0),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS transfers_from_idx ON transfers (from_account_id);
CREATE INDEX IF NOT EXISTS transfers_to_idx ON transfers (to_account_id);
CREATE INDEX IF NOT EXISTS transfers_from_to_idx ON transfers (from_account_id, to_account_id);
"#;

pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id            UUID PRIMARY KEY,
    username      VARCHAR NOT NULL REFERENCES users (username),
    refresh_token VARCHAR NOT NULL,
    user_agent    VARCHAR NOT NULL,
    client_ip     VARCHAR NOT NULL,
    is_blocked    BOOLEAN NOT NULL DEFAULT FALSE,
    expired_at    TIMESTAMPTZ NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

/// Task broker storage. `state` is `pending` or `active` (leased).
pub const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id         UUID PRIMARY KEY,
    queue      VARCHAR NOT NULL,
    type_name  VARCHAR NOT NULL,
    payload    BYTEA NOT NULL,
    max_retry  INTEGER NOT NULL,
    retried    INTEGER NOT NULL DEFAULT 0,
    process_at TIMESTAMPTZ NOT NULL,
    state      VARCHAR NOT NULL DEFAULT 'pending',
    leased_at  TIMESTAMPTZ,
    last_error VARCHAR,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS tasks_due_idx ON tasks (queue, state, process_at);
"#;
