use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use super::state::AppState;
use super::types::{ApiResponse, error_codes};

/// Verifies `Authorization: Bearer <access token>` and injects the token
/// [`Payload`](crate::token::Payload) into request extensions.
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                error_codes::MISSING_AUTH,
                "authorization header is not provided",
            )),
        ))?;

    let mut fields = auth_header.split_whitespace();
    let token = match (fields.next(), fields.next(), fields.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => token,
        _ => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error(
                    error_codes::AUTH_FAILED,
                    "invalid authorization header format",
                )),
            ));
        }
    };

    match state.maker.verify_token(token) {
        Ok(payload) => {
            request.extensions_mut().insert(payload);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "bearer token rejected");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error(error_codes::AUTH_FAILED, e.to_string())),
            ))
        }
    }
}

/// Logs every request with its status and latency; server errors at error level.
pub async fn request_logger(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if status.is_server_error() {
        tracing::error!(%method, %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        tracing::info!(%method, %path, status = status.as_u16(), elapsed_ms, "request served");
    }
    response
}
