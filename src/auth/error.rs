//! Authentication and session errors

use thiserror::Error;

use crate::db::StoreError;
use crate::token::TokenError;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown user or wrong password. Deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("session not found")]
    SessionNotFound,

    #[error("blocked session")]
    SessionBlocked,

    #[error("incorrect session user")]
    SessionMismatch,

    #[error("mismatched session token")]
    SessionTokenMismatch,

    #[error("expired session")]
    SessionExpired,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Caller presented a valid token but is not allowed to use it
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::SessionBlocked
                | AuthError::SessionMismatch
                | AuthError::SessionTokenMismatch
                | AuthError::SessionExpired
        )
    }

    /// Caller failed to prove who they are
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthError::InvalidCredentials | AuthError::Token(_))
    }
}
