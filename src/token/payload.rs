use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::TokenError;

/// Claims carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Payload {
    /// Unique token id; for refresh tokens this is also the session id
    pub id: Uuid,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(username: &str, duration: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            issued_at,
            expired_at: issued_at + duration,
        }
    }

    pub fn valid(&self) -> Result<(), TokenError> {
        if Utc::now() > self.expired_at {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}
