use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use std::sync::OnceLock;

use super::error::AuthError;

/// Hash a password into a PHC string (argon2id, random salt)
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
        .to_string();
    Ok(hash)
}

/// `InvalidCredentials` on mismatch; a malformed stored hash is an internal error
pub fn check_password(password: &str, hashed_password: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hashed_password)
        .map_err(|e| AuthError::PasswordHash(format!("invalid hash format: {}", e)))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Stand-in hash verified when the username does not exist, so an unknown
/// user and a wrong password cost the same argon2 work.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("unknown-user-placeholder").ok())
        .as_deref()
}

/// Burns one password verification and returns `InvalidCredentials`
pub fn reject_unknown_user(password: &str) -> AuthError {
    if let Some(hash) = dummy_hash() {
        let _ = check_password(password, hash);
    }
    AuthError::InvalidCredentials
}
