//! Login, access-token renewal and session revocation
//!
//! Login issues a short-lived access token and a long-lived refresh token
//! and persists a [`Session`] keyed by the refresh token's payload id.
//! Renewal trusts a refresh token only while its session exists, is not
//! blocked, belongs to the same user, stores the exact same token and has
//! not expired.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::error::AuthError;
use super::password::{check_password, reject_unknown_user};
use crate::db::queries::CreateSessionParams;
use crate::db::{Session, Store, StoreError, User};
use crate::token::{Maker, Payload};

#[derive(Debug, Clone)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub client_ip: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub session_id: Uuid,
    pub access_token: String,
    pub access_payload: Payload,
    pub refresh_token: String,
    pub refresh_payload: Payload,
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct RenewResult {
    pub access_token: String,
    pub access_payload: Payload,
}

pub struct SessionService {
    store: Arc<dyn Store>,
    maker: Arc<dyn Maker>,
    access_token_duration: Duration,
    refresh_token_duration: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn Store>,
        maker: Arc<dyn Maker>,
        access_token_duration: Duration,
        refresh_token_duration: Duration,
    ) -> Self {
        Self {
            store,
            maker,
            access_token_duration,
            refresh_token_duration,
        }
    }

    pub async fn login(&self, params: LoginParams) -> Result<LoginResult, AuthError> {
        let user = match self.store.get_user(&params.username).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(reject_unknown_user(&params.password)),
            Err(e) => return Err(e.into()),
        };

        check_password(&params.password, &user.hashed_password)?;

        let (access_token, access_payload) = self
            .maker
            .create_token(&user.username, self.access_token_duration)?;
        let (refresh_token, refresh_payload) = self
            .maker
            .create_token(&user.username, self.refresh_token_duration)?;

        let session = self
            .store
            .create_session(CreateSessionParams {
                id: refresh_payload.id,
                username: user.username.clone(),
                refresh_token: refresh_token.clone(),
                user_agent: params.user_agent,
                client_ip: params.client_ip,
                is_blocked: false,
                expired_at: refresh_payload.expired_at,
            })
            .await?;

        tracing::info!(
            username = %user.username,
            session_id = %session.id,
            "user logged in"
        );

        Ok(LoginResult {
            session_id: session.id,
            access_token,
            access_payload,
            refresh_token,
            refresh_payload,
            user,
        })
    }

    pub async fn renew_access_token(&self, refresh_token: &str) -> Result<RenewResult, AuthError> {
        let refresh_payload = self.maker.verify_token(refresh_token)?;

        let session = match self.store.get_session(refresh_payload.id).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(AuthError::SessionNotFound),
            Err(e) => return Err(e.into()),
        };
        check_session(&session, &refresh_payload, refresh_token)?;

        let (access_token, access_payload) = self
            .maker
            .create_token(&refresh_payload.username, self.access_token_duration)?;

        tracing::debug!(session_id = %session.id, "access token renewed");

        Ok(RenewResult {
            access_token,
            access_payload,
        })
    }

    /// Revoke a session; later renewals with its refresh token fail.
    ///
    /// Library API for operators revoking a leaked refresh token; no HTTP
    /// route exposes it.
    pub async fn block_session(&self, id: Uuid) -> Result<Session, AuthError> {
        let session = match self.store.block_session(id).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(AuthError::SessionNotFound),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(session_id = %id, username = %session.username, "session blocked");
        Ok(session)
    }
}

fn check_session(session: &Session, payload: &Payload, refresh_token: &str) -> Result<(), AuthError> {
    if session.is_blocked {
        return Err(AuthError::SessionBlocked);
    }
    if session.username != payload.username {
        return Err(AuthError::SessionMismatch);
    }
    if session.refresh_token != refresh_token {
        return Err(AuthError::SessionTokenMismatch);
    }
    if Utc::now() > session.expired_at {
        return Err(AuthError::SessionExpired);
    }
    Ok(())
}
