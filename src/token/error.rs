use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token is invalid")]
    Invalid,

    #[error("token has expired")]
    Expired,

    #[error("invalid key size: must be at least {min} bytes, got {actual}")]
    InvalidKeySize { min: usize, actual: usize },

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}
