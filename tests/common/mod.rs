#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use course_pay::adapters::webhook;
use course_pay::domain::account::{Product, Role};
use course_pay::domain::gateway::{
    CreateSession, GatewayClient, GatewayError, GatewaySession, RemoteStatus,
};
use course_pay::domain::id::{GatewaySessionId, ProductId, UserId};
use course_pay::domain::money::{CommissionPolicy, Currency, MoneyAmount};
use course_pay::infra::memory::InMemoryStore;
use course_pay::{AppState, Settings};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const CLIENT: UserId = UserId::new(1);
pub const PROVIDER: UserId = UserId::new(2);
pub const ADMIN: UserId = UserId::new(3);
pub const OTHER_CLIENT: UserId = UserId::new(4);
pub const COURSE: i64 = 10;
pub const COURSE_TITLE: &str = "Nutrition basics";

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const RETURN_URL: &str = "http://localhost:3000/return";

pub fn course() -> ProductId {
    ProductId::new(COURSE)
}

pub fn amount(value: &str) -> MoneyAmount {
    MoneyAmount::new(value.parse::<Decimal>().unwrap()).unwrap()
}

/// Store with one client, one provider, an admin and a 100.00 course.
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert_account(CLIENT, Role::Client).await;
    store.insert_account(OTHER_CLIENT, Role::Client).await;
    store.insert_account(PROVIDER, Role::Nutri).await;
    store.insert_account(ADMIN, Role::Admin).await;
    store
        .insert_product(Product {
            id: course(),
            provider: PROVIDER,
            title: COURSE_TITLE.to_string(),
            net_price: amount("100.00"),
        })
        .await;
    store
}

// ── Fake gateway ───────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeState {
    created: Vec<CreateSession>,
    statuses: HashMap<String, RemoteStatus>,
    fail_create: bool,
    fail_status: bool,
}

/// In-process gateway: sessions are numbered, statuses are set by the test.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    pub fn fail_status(&self, fail: bool) {
        self.state.lock().unwrap().fail_status = fail;
    }

    pub fn set_status(&self, session: &GatewaySessionId, status: RemoteStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(session.as_str().to_string(), status);
    }

    pub fn created(&self) -> Vec<CreateSession> {
        self.state.lock().unwrap().created.clone()
    }
}

impl GatewayClient for FakeGateway {
    fn create_session<'a>(
        &'a self,
        request: &'a CreateSession,
    ) -> BoxFuture<'a, Result<GatewaySession, GatewayError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.fail_create {
                return Err(GatewayError::Transport("connection refused".into()));
            }
            state.created.push(request.clone());
            let id = format!("gw-{}", state.created.len());
            state.statuses.insert(id.clone(), RemoteStatus::Pending);
            Ok(GatewaySession {
                id: GatewaySessionId::new(id.clone()).unwrap(),
                confirmation_url: format!("https://checkout.test/{id}"),
            })
        })
    }

    fn fetch_status<'a>(
        &'a self,
        id: &'a GatewaySessionId,
    ) -> BoxFuture<'a, Result<RemoteStatus, GatewayError>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.fail_status {
                return Err(GatewayError::Transport("timed out".into()));
            }
            Ok(state
                .statuses
                .get(id.as_str())
                .copied()
                .unwrap_or(RemoteStatus::Pending))
        })
    }
}

// ── App harness ────────────────────────────────────────────────────────────

pub struct TestApp {
    pub state: AppState,
    pub store: InMemoryStore,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = seeded_store().await;
        let gateway = Arc::new(FakeGateway::new());
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            gateway.clone(),
            Settings {
                jwt_secret: JWT_SECRET,
                webhook_secret: WEBHOOK_SECRET,
                return_url: RETURN_URL,
                commission: CommissionPolicy::one_third(),
                currency: Currency::Rub,
            },
        );
        Self {
            state,
            store,
            gateway,
        }
    }

    pub fn router(&self) -> Router {
        course_pay::router(self.state.clone())
    }

    pub fn token(&self, user: UserId, role: Role) -> String {
        self.state
            .auth
            .issue(user, role, chrono::Duration::hours(1))
            .unwrap()
    }

    pub async fn call(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
        self.call(
            Request::get(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn send_json(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.call(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn webhook(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::post("/api/webhook/yookassa")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            request = request.header(webhook::SIGNATURE_HEADER, sig);
        }
        self.call(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn signed_webhook(
        &self,
        event: &str,
        gateway_id: &str,
    ) -> (StatusCode, serde_json::Value) {
        let body = webhook_body(event, gateway_id);
        let sig = webhook::sign(WEBHOOK_SECRET.as_bytes(), body.as_bytes()).unwrap();
        self.webhook(&body, Some(&sig)).await
    }
}

pub fn webhook_body(event: &str, gateway_id: &str) -> String {
    serde_json::json!({
        "type": "notification",
        "event": event,
        "object": { "id": gateway_id, "status": "succeeded" }
    })
    .to_string()
}
