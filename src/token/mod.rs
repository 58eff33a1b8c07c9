//! Signed bearer tokens
//!
//! A [`Maker`] issues and verifies tokens carrying a [`Payload`]. The only
//! implementation is [`JwtMaker`] (HS256). Access and refresh tokens are the
//! same shape; they differ only in lifetime and in how the caller uses them.

pub mod error;
pub mod jwt_maker;
pub mod payload;

pub use error::TokenError;
pub use jwt_maker::JwtMaker;
pub use payload::Payload;

use chrono::Duration;

pub trait Maker: Send + Sync {
    /// Issue a token for `username` valid for `duration`
    fn create_token(&self, username: &str, duration: Duration)
    -> Result<(String, Payload), TokenError>;

    /// Check signature and expiry and return the embedded payload
    fn verify_token(&self, token: &str) -> Result<Payload, TokenError>;
}
