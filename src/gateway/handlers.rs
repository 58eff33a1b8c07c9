//! HTTP handlers
//!
//! Handlers validate input, call the store or session service, and map
//! results to [`ApiResponse`]. Business rules live below this layer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{ConnectInfo, Path, Query, State},
    http::{Extensions, HeaderMap, StatusCode, header},
};
use validator::Validate;

use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ApiResult, CreateAccountRequest, CreateTransferRequest,
    CreateUserRequest, CreateUserResponse, HealthResponse, ListAccountsQuery, LoginUserRequest,
    LoginUserResponse,
    RenewAccessTokenRequest, RenewAccessTokenResponse, UserResponse, VerifyEmailQuery,
    VerifyEmailResponse, created, error_codes, ok,
};
use crate::auth::{LoginParams, hash_password};
use crate::db::queries::{CreateAccountParams, CreateUserParams};
use crate::db::{
    Account, CallbackError, CreateUserTxParams, TransferTxParams, TransferTxResult, User,
    VerifyEmailTxParams, after_create,
};
use crate::token::Payload;
use crate::worker::{Queue, SendVerifyEmailPayload, TaskOptions};

/// Delay before the verification task becomes visible. The task is enqueued
/// before the user row commits, so workers must not pick it up immediately.
const VERIFY_EMAIL_TASK_DELAY: Duration = Duration::from_secs(10);
const VERIFY_EMAIL_MAX_RETRY: i32 = 10;

// ============================================================================
// Users
// ============================================================================

/// Register a new user and schedule the verification email
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<CreateUserResponse>),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username or email already exists")
    ),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<CreateUserResponse> {
    req.validate()?;

    let hashed_password = hash_password(&req.password)?;
    let params = CreateUserParams {
        username: req.username,
        hashed_password,
        full_name: req.full_name,
        email: req.email,
    };

    let distributor = state.distributor.clone();
    let callback = after_create(move |user: User| async move {
        let opts = TaskOptions::default()
            .max_retry(VERIFY_EMAIL_MAX_RETRY)
            .process_in(VERIFY_EMAIL_TASK_DELAY)
            .queue(Queue::Critical);
        distributor
            .distribute_send_verify_email(
                SendVerifyEmailPayload {
                    username: user.username,
                },
                opts,
            )
            .await
            .map(|_| ())
            .map_err(|e| Box::new(e) as CallbackError)
    });

    let result = state
        .store
        .create_user_tx(CreateUserTxParams::new(params, callback))
        .await?;

    created(CreateUserResponse {
        user: result.user.into(),
    })
}

/// Log in and open a refresh session
#[utoipa::path(
    post,
    path = "/v1/users/login",
    request_body = LoginUserRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<LoginUserResponse>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Users"
)]
pub async fn login_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(req): Json<LoginUserRequest>,
) -> ApiResult<LoginUserResponse> {
    req.validate()?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let result = state
        .sessions
        .login(LoginParams {
            username: req.username,
            password: req.password,
            user_agent,
            client_ip: client_ip(&headers, &extensions),
        })
        .await?;

    ok(LoginUserResponse {
        session_id: result.session_id,
        access_token: result.access_token,
        access_token_expired_at: result.access_payload.expired_at,
        refresh_token: result.refresh_token,
        refresh_token_expired_at: result.refresh_payload.expired_at,
        user: UserResponse::from(result.user),
    })
}

/// First `X-Forwarded-For` hop, else the peer address
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/v1/tokens/renew_access",
    request_body = RenewAccessTokenRequest,
    responses(
        (status = 200, description = "Access token renewed", body = ApiResponse<RenewAccessTokenResponse>),
        (status = 401, description = "Invalid token or rejected session"),
        (status = 404, description = "Session not found")
    ),
    tag = "Users"
)]
pub async fn renew_access_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RenewAccessTokenRequest>,
) -> ApiResult<RenewAccessTokenResponse> {
    req.validate()?;

    let result = state.sessions.renew_access_token(&req.refresh_token).await?;

    ok(RenewAccessTokenResponse {
        access_token: result.access_token,
        access_token_expired_at: result.access_payload.expired_at,
    })
}

/// Consume an email verification code
#[utoipa::path(
    get,
    path = "/v1/verify_email",
    params(VerifyEmailQuery),
    responses(
        (status = 200, description = "Email verified", body = ApiResponse<VerifyEmailResponse>),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Unknown, used or expired code")
    ),
    tag = "Users"
)]
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> ApiResult<VerifyEmailResponse> {
    query.validate()?;

    let result = state
        .store
        .verify_email_tx(VerifyEmailTxParams {
            email_id: query.email_id,
            secret_code: query.secret_code,
        })
        .await?;

    ok(VerifyEmailResponse {
        is_verified: result.user.is_email_verified,
    })
}

// ============================================================================
// Accounts & transfers (bearer auth)
// ============================================================================

/// Open an account for the authenticated user
#[utoipa::path(
    post,
    path = "/v1/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<Account>),
        (status = 400, description = "Unsupported currency"),
        (status = 401, description = "Authentication failed"),
        (status = 409, description = "Owner already has an account in this currency")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    Json(req): Json<CreateAccountRequest>,
) -> ApiResult<Account> {
    req.validate()?;

    let account = state
        .store
        .create_account(CreateAccountParams {
            owner: payload.username,
            balance: 0,
            currency: req.currency,
        })
        .await?;

    tracing::info!(account_id = account.id, owner = %account.owner, currency = %account.currency, "account created");
    created(account)
}

/// Fetch one of the authenticated user's accounts
#[utoipa::path(
    get,
    path = "/v1/accounts/{id}",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = ApiResponse<Account>),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Account belongs to another user"),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    Path(id): Path<i64>,
) -> ApiResult<Account> {
    if id < 1 {
        return ApiError::bad_request("id must be positive").into_err();
    }

    let account = state.store.get_account(id).await?;
    if account.owner != payload.username {
        return ApiError::forbidden("account doesn't belong to the authenticated user").into_err();
    }
    ok(account)
}

/// List the authenticated user's accounts, one page at a time
#[utoipa::path(
    get,
    path = "/v1/accounts",
    params(ListAccountsQuery),
    responses(
        (status = 200, description = "Accounts owned by the caller", body = ApiResponse<Vec<Account>>),
        (status = 400, description = "Invalid paging"),
        (status = 401, description = "Authentication failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    Query(query): Query<ListAccountsQuery>,
) -> ApiResult<Vec<Account>> {
    query.validate()?;

    let accounts = state
        .store
        .list_accounts(&payload.username, query.to_list_params())
        .await?;
    ok(accounts)
}

/// Move money from one of the caller's accounts to another account
#[utoipa::path(
    post,
    path = "/v1/transfers",
    request_body = CreateTransferRequest,
    responses(
        (status = 200, description = "Transfer completed", body = ApiResponse<TransferTxResult>),
        (status = 400, description = "Invalid input or currency mismatch"),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Source account belongs to another user"),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Transfers"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    Json(req): Json<CreateTransferRequest>,
) -> ApiResult<TransferTxResult> {
    req.validate()?;

    let from = valid_account(&state, req.from_account_id, &req.currency).await?;
    if from.owner != payload.username {
        return ApiError::forbidden("from account doesn't belong to the authenticated user")
            .into_err();
    }
    valid_account(&state, req.to_account_id, &req.currency).await?;

    let result = state
        .store
        .transfer_tx(TransferTxParams::new(
            req.from_account_id,
            req.to_account_id,
            req.amount,
        ))
        .await?;
    ok(result)
}

async fn valid_account(state: &AppState, id: i64, currency: &str) -> Result<Account, ApiError> {
    let account = state.store.get_account(id).await?;
    if account.currency != currency {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            error_codes::CURRENCY_MISMATCH,
            format!(
                "account [{}] currency mismatch: {} vs {}",
                id, account.currency, currency
            ),
        ));
    }
    Ok(account)
}

// ============================================================================
// System
// ============================================================================

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {status: "ok"}}
/// - Unhealthy: 503 Service Unavailable, no internal details
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = ApiResponse<HealthResponse>),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let healthy = match state.pg_db {
        Some(ref db) => match db.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "database ping failed");
                false
            }
        },
        None => true,
    };

    if healthy {
        (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                status: "ok".to_string(),
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        )
    }
}
