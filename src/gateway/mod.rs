//! HTTP gateway
//!
//! Thin axum layer over the store, session service and task distributor.
//! Public routes handle registration, login, token renewal and email
//! verification; account and transfer routes require a bearer access token.

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;
pub mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

/// Build the complete router
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/users", post(handlers::create_user))
        .route("/users/login", post(handlers::login_user))
        .route("/tokens/renew_access", post(handlers::renew_access_token))
        .route("/verify_email", get(handlers::verify_email));

    let private_routes = Router::new()
        .route(
            "/accounts",
            post(handlers::create_account).get(handlers::list_accounts),
        )
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/transfers", post(handlers::create_transfer))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::jwt_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", public_routes.merge(private_routes))
        .with_state(state)
        // stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(from_fn(middleware::request_logger))
}

/// Serve the gateway until `shutdown` resolves
pub async fn run_server<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %listener.local_addr()?, "gateway listening");
    tracing::info!("API docs at /docs");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{SessionService, hash_password};
    use crate::db::memory::test_support::{seed_account, seed_user};
    use crate::db::queries::{CreateUserParams, CreateVerifyEmailParams};
    use crate::db::{CreateUserTxParams, MemStore, Store};
    use crate::gateway::types::error_codes;
    use crate::token::{JwtMaker, Maker};
    use crate::worker::{BrokerDistributor, MemoryBroker, Queue};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const SECRET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

    struct TestApp {
        app: Router,
        store: Arc<MemStore>,
        maker: Arc<JwtMaker>,
        broker: Arc<MemoryBroker>,
        sessions: Arc<SessionService>,
    }

    fn test_app() -> TestApp {
        let store = Arc::new(MemStore::new());
        let maker = Arc::new(JwtMaker::new(SECRET).unwrap());
        let broker = Arc::new(MemoryBroker::new());
        let sessions = Arc::new(SessionService::new(
            store.clone(),
            maker.clone(),
            Duration::minutes(15),
            Duration::hours(24),
        ));
        let state = AppState::new(
            store.clone(),
            maker.clone(),
            sessions.clone(),
            Arc::new(BrokerDistributor::new(broker.clone())),
        );
        TestApp {
            app: router(Arc::new(state)),
            store,
            maker,
            broker,
            sessions,
        }
    }

    impl TestApp {
        fn bearer(&self, username: &str) -> String {
            let (token, _) = self
                .maker
                .create_token(username, Duration::minutes(15))
                .unwrap();
            format!("Bearer {}", token)
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }
    }

    fn post_json(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let t = test_app();
        let (status, body) = t.send(get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_user_schedules_verify_email() {
        let t = test_app();
        let before = Utc::now();
        let (status, body) = t
            .send(post_json(
                "/v1/users",
                None,
                json!({
                    "username": "alice",
                    "password": "secret123",
                    "full_name": "Alice Liddell",
                    "email": "alice@example.com"
                }),
            ))
            .await;

        assert_eq!(status, StatusCode::CREATED);
        let user = &body["data"]["user"];
        assert_eq!(user["username"], "alice");
        assert_eq!(user["is_email_verified"], false);
        assert!(user.get("hashed_password").is_none());

        let tasks = t.broker.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].type_name, "task:send_verify_email");
        assert_eq!(tasks[0].queue, Queue::Critical);
        assert_eq!(tasks[0].max_retry, 10);
        assert!(tasks[0].process_at >= before + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_create_user_rejects_invalid_input() {
        let t = test_app();
        let (status, body) = t
            .send(post_json(
                "/v1/users",
                None,
                json!({
                    "username": "Alice!",
                    "password": "secret123",
                    "full_name": "Alice Liddell",
                    "email": "alice@example.com"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], error_codes::INVALID_PARAMETER);
        assert!(t.broker.is_empty());
    }

    #[tokio::test]
    async fn test_create_user_duplicate_conflict() {
        let t = test_app();
        let request = || {
            post_json(
                "/v1/users",
                None,
                json!({
                    "username": "alice",
                    "password": "secret123",
                    "full_name": "Alice Liddell",
                    "email": "alice@example.com"
                }),
            )
        };
        assert_eq!(t.send(request()).await.0, StatusCode::CREATED);
        let (status, body) = t.send(request()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], error_codes::ALREADY_EXISTS);
    }

    #[tokio::test]
    async fn test_login_and_renew_access_token() {
        let t = test_app();
        t.store
            .create_user_tx(CreateUserTxParams::without_callback(CreateUserParams {
                username: "alice".to_string(),
                hashed_password: hash_password("secret123").unwrap(),
                full_name: "Alice Liddell".to_string(),
                email: "alice@example.com".to_string(),
            }))
            .await
            .unwrap();

        let (status, body) = t
            .send(post_json(
                "/v1/users/login",
                None,
                json!({"username": "alice", "password": "wrong-password"}),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], error_codes::AUTH_FAILED);

        let (status, body) = t
            .send(post_json(
                "/v1/users/login",
                None,
                json!({"username": "alice", "password": "secret123"}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["user"]["username"], "alice");
        assert!(data["user"].get("hashed_password").is_none());
        let refresh_token = data["refresh_token"].as_str().unwrap().to_string();
        let session_id: uuid::Uuid = data["session_id"].as_str().unwrap().parse().unwrap();

        let (status, body) = t
            .send(post_json(
                "/v1/tokens/renew_access",
                None,
                json!({"refresh_token": refresh_token}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let access = body["data"]["access_token"].as_str().unwrap();
        assert_eq!(t.maker.verify_token(access).unwrap().username, "alice");

        t.sessions.block_session(session_id).await.unwrap();
        let (status, body) = t
            .send(post_json(
                "/v1/tokens/renew_access",
                None,
                json!({"refresh_token": refresh_token}),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], error_codes::SESSION_REJECTED);
    }

    #[tokio::test]
    async fn test_verify_email() {
        let t = test_app();
        let user = seed_user(&t.store).await;
        let code = "a".repeat(32);
        let record = t
            .store
            .create_verify_email(CreateVerifyEmailParams {
                username: user.username.clone(),
                email: user.email.clone(),
                secret_code: code.clone(),
            })
            .await
            .unwrap();

        let uri = format!(
            "/v1/verify_email?email_id={}&secret_code={}",
            record.id, code
        );
        let (status, body) = t.send(get(&uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_verified"], true);

        let (status, _) = t.send(get(&uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(t.store.get_user(&user.username).await.unwrap().is_email_verified);

        let (status, _) = t
            .send(get("/v1/verify_email?email_id=0&secret_code=short", None))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_private_routes_require_bearer() {
        let t = test_app();
        let (status, body) = t
            .send(post_json("/v1/accounts", None, json!({"currency": "USD"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], error_codes::MISSING_AUTH);

        let (status, body) = t
            .send(post_json(
                "/v1/accounts",
                Some("Token abc"),
                json!({"currency": "USD"}),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], error_codes::AUTH_FAILED);

        let (expired, _) = t.maker.create_token("alice", Duration::minutes(-1)).unwrap();
        let (status, _) = t
            .send(get("/v1/accounts/1", Some(&format!("Bearer {}", expired))))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_and_get_account() {
        let t = test_app();
        let alice = seed_user(&t.store).await;
        let bob = seed_user(&t.store).await;
        let auth = t.bearer(&alice.username);

        let (status, body) = t
            .send(post_json("/v1/accounts", Some(&auth), json!({"currency": "EUR"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["owner"], alice.username.as_str());
        assert_eq!(body["data"]["balance"], 0);
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, _) = t
            .send(post_json("/v1/accounts", Some(&auth), json!({"currency": "EUR"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = t
            .send(post_json("/v1/accounts", Some(&auth), json!({"currency": "GBP"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/v1/accounts/{}", id);
        let (status, body) = t.send(get(&uri, Some(&auth))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["currency"], "EUR");

        let (status, _) = t.send(get(&uri, Some(&t.bearer(&bob.username)))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = t.send(get("/v1/accounts/9999", Some(&auth))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_accounts_only_returns_own() {
        let t = test_app();
        let alice = seed_user(&t.store).await;
        let bob = seed_user(&t.store).await;
        for currency in ["USD", "EUR", "TWD"] {
            seed_account(&t.store, &alice.username, currency, 0).await;
        }
        seed_account(&t.store, &bob.username, "USD", 0).await;
        let auth = t.bearer(&alice.username);

        let (status, body) = t
            .send(get("/v1/accounts?page_id=1&page_size=5", Some(&auth)))
            .await;
        assert_eq!(status, StatusCode::OK);
        let accounts = body["data"].as_array().unwrap();
        assert_eq!(accounts.len(), 3);
        assert!(accounts.iter().all(|a| a["owner"] == alice.username.as_str()));

        let (status, body) = t
            .send(get("/v1/accounts?page_id=2&page_size=5", Some(&auth)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());

        let (status, body) = t
            .send(get("/v1/accounts?page_id=1&page_size=20", Some(&auth)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], error_codes::INVALID_PARAMETER);

        let (status, _) = t
            .send(get("/v1/accounts?page_id=0&page_size=5", Some(&auth)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = t
            .send(get("/v1/accounts?page_id=1&page_size=5", None))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_transfer_balance_overflow_is_bad_request() {
        let t = test_app();
        let alice = seed_user(&t.store).await;
        let bob = seed_user(&t.store).await;
        let from = seed_account(&t.store, &alice.username, "USD", 0).await;
        let to = seed_account(&t.store, &bob.username, "USD", 1).await;

        let (status, _) = t
            .send(post_json(
                "/v1/transfers",
                Some(&t.bearer(&alice.username)),
                json!({
                    "from_account_id": from.id,
                    "to_account_id": to.id,
                    "amount": i64::MAX,
                    "currency": "USD"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(t.store.get_account(to.id).await.unwrap().balance, 1);
    }

    #[tokio::test]
    async fn test_create_transfer() {
        let t = test_app();
        let alice = seed_user(&t.store).await;
        let bob = seed_user(&t.store).await;
        let from = seed_account(&t.store, &alice.username, "USD", 100).await;
        let to = seed_account(&t.store, &bob.username, "USD", 50).await;
        let bob_eur = seed_account(&t.store, &bob.username, "EUR", 50).await;
        let auth = t.bearer(&alice.username);

        let (status, body) = t
            .send(post_json(
                "/v1/transfers",
                Some(&auth),
                json!({
                    "from_account_id": from.id,
                    "to_account_id": to.id,
                    "amount": 30,
                    "currency": "USD"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["transfer"]["amount"], 30);
        assert_eq!(data["from_account"]["balance"], 70);
        assert_eq!(data["to_account"]["balance"], 80);
        assert_eq!(data["from_entry"]["amount"], -30);
        assert_eq!(data["to_entry"]["amount"], 30);

        // currency mismatch on the destination
        let (status, body) = t
            .send(post_json(
                "/v1/transfers",
                Some(&auth),
                json!({
                    "from_account_id": from.id,
                    "to_account_id": bob_eur.id,
                    "amount": 10,
                    "currency": "USD"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], error_codes::CURRENCY_MISMATCH);

        // source account owned by someone else
        let (status, _) = t
            .send(post_json(
                "/v1/transfers",
                Some(&auth),
                json!({
                    "from_account_id": to.id,
                    "to_account_id": from.id,
                    "amount": 10,
                    "currency": "USD"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = t
            .send(post_json(
                "/v1/transfers",
                Some(&auth),
                json!({
                    "from_account_id": from.id,
                    "to_account_id": to.id,
                    "amount": 0,
                    "currency": "USD"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(t.store.get_account(from.id).await.unwrap().balance, 70);
        assert_eq!(t.store.get_account(to.id).await.unwrap().balance, 80);
    }
}
