//! End-to-end flow over the HTTP router with the in-memory store and broker:
//! sign up, verify email through the task processor, log in, move money,
//! renew and revoke sessions.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Duration;
use serde_json::{Value, json};
use tower::ServiceExt;

use simple_bank::auth::SessionService;
use simple_bank::db::queries::CreateAccountParams;
use simple_bank::db::{MemStore, Store};
use simple_bank::gateway::{self, AppState};
use simple_bank::mail::{Email, EmailSender, MailError};
use simple_bank::shutdown::ShutdownSignal;
use simple_bank::token::JwtMaker;
use simple_bank::worker::{
    BrokerDistributor, MemoryBroker, ProcessorConfig, Queue, SendVerifyEmailPayload,
    TaskDistributor, TaskOptions, TaskProcessor,
};

const SECRET: &str = "integration-test-secret-key-0123456789";

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl EmailSender for Outbox {
    async fn send_email(&self, email: &Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

struct Bank {
    app: Router,
    store: Arc<MemStore>,
    broker: Arc<MemoryBroker>,
    distributor: Arc<BrokerDistributor>,
    processor: TaskProcessor,
    outbox: Arc<Outbox>,
}

fn bank() -> Bank {
    let store = Arc::new(MemStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let maker = Arc::new(JwtMaker::new(SECRET).unwrap());
    let outbox = Arc::new(Outbox::default());
    let distributor = Arc::new(BrokerDistributor::new(broker.clone()));
    let sessions = Arc::new(SessionService::new(
        store.clone(),
        maker.clone(),
        Duration::minutes(15),
        Duration::hours(24),
    ));

    let processor = TaskProcessor::new(
        broker.clone(),
        store.clone(),
        outbox.clone(),
        ProcessorConfig {
            verify_url: "/v1/verify_email".to_string(),
            ..ProcessorConfig::default()
        },
        Arc::new(ShutdownSignal::new()),
    );

    let state = AppState::new(store.clone(), maker, sessions, distributor.clone());
    Bank {
        app: gateway::router(Arc::new(state)),
        store,
        broker,
        distributor,
        processor,
        outbox,
    }
}

impl Bank {
    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "bank-flow-test");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.call(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.call(builder.body(Body::empty()).unwrap()).await
    }

    async fn sign_up(&self, username: &str) {
        let (status, _) = self
            .post(
                "/v1/users",
                None,
                json!({
                    "username": username,
                    "password": "secret123",
                    "full_name": "Test User",
                    "email": format!("{}@example.com", username)
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    /// Returns (access_token, refresh_token)
    async fn login(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/v1/users/login",
                None,
                json!({"username": username, "password": "secret123"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        (
            body["data"]["access_token"].as_str().unwrap().to_string(),
            body["data"]["refresh_token"].as_str().unwrap().to_string(),
        )
    }
}

fn verify_link(email: &Email) -> String {
    let start = email.content.find("href=\"").unwrap() + "href=\"".len();
    let end = start + email.content[start..].find('"').unwrap();
    email.content[start..end].to_string()
}

#[tokio::test]
async fn sign_up_and_verify_email() {
    let bank = bank();
    bank.sign_up("alice").await;

    // scheduled with a delay, nothing due yet
    assert_eq!(bank.broker.len(), 1);
    assert!(!bank.processor.process_next().await.unwrap());

    bank.distributor
        .distribute_send_verify_email(
            SendVerifyEmailPayload {
                username: "alice".to_string(),
            },
            TaskOptions::default().queue(Queue::Critical),
        )
        .await
        .unwrap();
    assert!(bank.processor.process_next().await.unwrap());

    let sent = bank.outbox.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["alice@example.com".to_string()]);
    assert_eq!(sent[0].subject, "Welcome to Simple Bank");

    let link = verify_link(&sent[0]);
    let (status, body) = bank.get(&link, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_verified"], true);
    assert!(bank.store.get_user("alice").await.unwrap().is_email_verified);

    // the code is single use
    let (status, _) = bank.get(&link, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(bank.store.get_user("alice").await.unwrap().is_email_verified);
}

#[tokio::test]
async fn login_open_accounts_and_transfer() {
    let bank = bank();
    bank.sign_up("alice").await;
    bank.sign_up("bob").await;
    let (alice_token, _) = bank.login("alice").await;
    let (bob_token, _) = bank.login("bob").await;

    let funded = bank
        .store
        .create_account(CreateAccountParams {
            owner: "alice".to_string(),
            balance: 1_000,
            currency: "TWD".to_string(),
        })
        .await
        .unwrap();

    let (status, body) = bank
        .post("/v1/accounts", Some(&bob_token), json!({"currency": "TWD"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let bob_account = body["data"]["id"].as_i64().unwrap();

    let (status, body) = bank
        .post(
            "/v1/transfers",
            Some(&alice_token),
            json!({
                "from_account_id": funded.id,
                "to_account_id": bob_account,
                "amount": 250,
                "currency": "TWD"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["from_account"]["balance"], 750);
    assert_eq!(body["data"]["to_account"]["balance"], 250);

    // bob cannot spend from alice's account
    let (status, _) = bank
        .post(
            "/v1/transfers",
            Some(&bob_token),
            json!({
                "from_account_id": funded.id,
                "to_account_id": bob_account,
                "amount": 1,
                "currency": "TWD"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = bank
        .get(&format!("/v1/accounts/{}", bob_account), Some(&bob_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], 250);
}

#[tokio::test]
async fn renew_access_token_until_session_blocked() {
    let bank = bank();
    bank.sign_up("carol").await;
    let (_, refresh_token) = bank.login("carol").await;

    let (status, body) = bank
        .post(
            "/v1/tokens/renew_access",
            None,
            json!({"refresh_token": refresh_token}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access_token = body["data"]["access_token"].as_str().unwrap().to_string();

    let (status, _) = bank
        .post("/v1/accounts", Some(&access_token), json!({"currency": "USD"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let maker = JwtMaker::new(SECRET).unwrap();
    let session_id = simple_bank::token::Maker::verify_token(&maker, &refresh_token)
        .unwrap()
        .id;
    bank.store.block_session(session_id).await.unwrap();

    let (status, _) = bank
        .post(
            "/v1/tokens/renew_access",
            None,
            json!({"refresh_token": refresh_token}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
