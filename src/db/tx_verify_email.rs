//! Email verification transaction
//!
//! Consumes a verify-email record and flags the owning user verified, in
//! one transaction. The record update only matches an unused, unexpired row,
//! so a repeated call with the same code returns `NotFound` and changes
//! nothing.

use super::error::StoreResult;
use super::models::{User, VerifyEmail};
use super::queries::{Queries, UpdateUserParams, UpdateVerifyEmailParams};

#[derive(Debug, Clone)]
pub struct VerifyEmailTxParams {
    pub email_id: i64,
    pub secret_code: String,
}

#[derive(Debug, Clone)]
pub struct VerifyEmailTxResult {
    pub user: User,
    pub verify_email: VerifyEmail,
}

pub(crate) async fn verify_email(
    q: &mut dyn Queries,
    arg: VerifyEmailTxParams,
) -> StoreResult<VerifyEmailTxResult> {
    let verify_email = q
        .update_verify_email(UpdateVerifyEmailParams {
            email_id: arg.email_id,
            secret_code: arg.secret_code,
        })
        .await?;

    let user = q
        .update_user(UpdateUserParams {
            username: verify_email.username.clone(),
            is_email_verified: Some(true),
            ..Default::default()
        })
        .await?;

    tracing::info!(
        username = %user.username,
        email_id = verify_email.id,
        "email verified"
    );

    Ok(VerifyEmailTxResult { user, verify_email })
}
