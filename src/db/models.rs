//! Row types for the bank schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Supported account currencies
pub mod currency {
    pub const USD: &str = "USD";
    pub const EUR: &str = "EUR";
    pub const TWD: &str = "TWD";

    pub fn is_supported(currency: &str) -> bool {
        matches!(currency, USD | EUR | TWD)
    }
}

/// Bank account. `balance` is in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry: signed balance delta on one account. Never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    /// Negative for debits, positive for credits
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Money moved between two accounts. `amount` is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    pub password_changed_at: DateTime<Utc>,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Refresh session. `id` equals the refresh token payload id.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VerifyEmail {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub secret_code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_currencies() {
        assert!(currency::is_supported("USD"));
        assert!(currency::is_supported("EUR"));
        assert!(currency::is_supported("TWD"));
        assert!(!currency::is_supported("usd"));
        assert!(!currency::is_supported("BTC"));
    }
}
