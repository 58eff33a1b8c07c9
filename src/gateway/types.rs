//! API boundary types
//!
//! - `ApiResponse<T>`: unified response wrapper
//! - `ApiError`: error response with HTTP status and `error_codes` code
//! - Request DTOs (validated with `validator`) and response DTOs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::auth::AuthError;
use crate::db::models::currency;
use crate::db::queries::ListParams;
use crate::db::{StoreError, User};
use crate::token::TokenError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const CURRENCY_MISMATCH: i32 = 1002;
    pub const ALREADY_EXISTS: i32 = 1003;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const SESSION_REJECTED: i32 = 2003;
    pub const FORBIDDEN: i32 = 2004;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

// ============================================================================
// Errors
// ============================================================================

/// Error half of every handler result
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

pub fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error_codes::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::not_found("record not found"),
            StoreError::UniqueViolation(constraint) => ApiError::new(
                StatusCode::CONFLICT,
                error_codes::ALREADY_EXISTS,
                format!("already exists: {}", constraint),
            ),
            StoreError::ForeignKeyViolation(constraint) => {
                ApiError::forbidden(format!("referenced record missing: {}", constraint))
            }
            StoreError::InvalidArgument(msg) => ApiError::bad_request(msg),
            StoreError::OutOfRange(msg) => ApiError::bad_request(format!("out of range: {}", msg)),
            StoreError::DeadlineExceeded => ApiError::service_unavailable("transaction timed out"),
            other => {
                tracing::error!(error = %other, "store failure");
                ApiError::internal("internal error")
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid | TokenError::Expired => ApiError::unauthorized(e.to_string()),
            other => {
                tracing::error!(error = %other, "token failure");
                ApiError::internal("internal error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if e.is_unauthorized() {
            return ApiError::new(
                StatusCode::UNAUTHORIZED,
                error_codes::SESSION_REJECTED,
                e.to_string(),
            );
        }
        match e {
            AuthError::InvalidCredentials => ApiError::unauthorized(e.to_string()),
            AuthError::Token(e) => e.into(),
            AuthError::SessionNotFound => ApiError::not_found(e.to_string()),
            AuthError::Store(e) => e.into(),
            other => {
                tracing::error!(error = %other, "auth failure");
                ApiError::internal("internal error")
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

// ============================================================================
// Field validators
// ============================================================================

fn validate_username(value: &str) -> Result<(), ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("username")
            .with_message("must contain only lowercase letters, digits, or underscore".into()))
    }
}

fn validate_full_name(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_alphabetic() || c == ' ') {
        Ok(())
    } else {
        Err(ValidationError::new("full_name").with_message("must contain only letters or spaces".into()))
    }
}

fn validate_currency(value: &str) -> Result<(), ValidationError> {
    if currency::is_supported(value) {
        Ok(())
    } else {
        Err(ValidationError::new("currency").with_message("unsupported currency".into()))
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[schema(example = "alice")]
    #[validate(length(min = 3, max = 100), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 6, max = 100))]
    pub password: String,
    #[schema(example = "Alice Liddell")]
    #[validate(length(min = 3, max = 100), custom(function = "validate_full_name"))]
    pub full_name: String,
    #[schema(example = "alice@example.com")]
    #[validate(length(min = 3, max = 200), email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginUserRequest {
    #[validate(length(min = 3, max = 100), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 6, max = 100))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RenewAccessTokenRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyEmailQuery {
    #[validate(range(min = 1))]
    pub email_id: i64,
    #[validate(length(min = 32, max = 128))]
    pub secret_code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAccountRequest {
    #[schema(example = "USD")]
    #[validate(custom(function = "validate_currency"))]
    pub currency: String,
}

/// One page of the caller's accounts
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAccountsQuery {
    /// 1-based page number
    #[validate(range(min = 1))]
    pub page_id: i32,
    #[validate(range(min = 5, max = 10))]
    pub page_size: i32,
}

impl ListAccountsQuery {
    pub fn to_list_params(&self) -> ListParams {
        let limit = i64::from(self.page_size);
        ListParams {
            limit,
            offset: (i64::from(self.page_id) - 1) * limit,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTransferRequest {
    #[validate(range(min = 1))]
    pub from_account_id: i64,
    #[validate(range(min = 1))]
    pub to_account_id: i64,
    /// Minor currency units
    #[validate(range(min = 1))]
    pub amount: i64,
    #[schema(example = "USD")]
    #[validate(custom(function = "validate_currency"))]
    pub currency: String,
}

// ============================================================================
// Responses
// ============================================================================

/// Public view of a user; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub is_email_verified: bool,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            is_email_verified: user.is_email_verified,
            password_changed_at: user.password_changed_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateUserResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginUserResponse {
    pub session_id: Uuid,
    pub access_token: String,
    pub access_token_expired_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expired_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RenewAccessTokenResponse {
    pub access_token: String,
    pub access_token_expired_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyEmailResponse {
    pub is_verified: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}
