//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::db::{Account, Entry, Transfer, TransferTxResult};
use crate::gateway::types::{
    CreateAccountRequest, CreateTransferRequest, CreateUserRequest, CreateUserResponse,
    HealthResponse, LoginUserRequest, LoginUserResponse, RenewAccessTokenRequest,
    RenewAccessTokenResponse, UserResponse, VerifyEmailResponse,
};

/// Bearer access token issued by `/v1/users/login`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token: Authorization: Bearer {access_token}"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Simple Bank API",
        version = "1.0.0",
        description = "Accounts, transfers, users and token sessions.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_user,
        crate::gateway::handlers::login_user,
        crate::gateway::handlers::renew_access_token,
        crate::gateway::handlers::verify_email,
        crate::gateway::handlers::create_account,
        crate::gateway::handlers::list_accounts,
        crate::gateway::handlers::get_account,
        crate::gateway::handlers::create_transfer,
    ),
    components(
        schemas(
            HealthResponse,
            CreateUserRequest,
            CreateUserResponse,
            UserResponse,
            LoginUserRequest,
            LoginUserResponse,
            RenewAccessTokenRequest,
            RenewAccessTokenResponse,
            VerifyEmailResponse,
            CreateAccountRequest,
            CreateTransferRequest,
            Account,
            Entry,
            Transfer,
            TransferTxResult,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Users", description = "Registration, login, token renewal and email verification"),
        (name = "Accounts", description = "Account management (auth required)"),
        (name = "Transfers", description = "Money transfers (auth required)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
