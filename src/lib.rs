pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    adapters::{auth::JwtVerifier, http, webhook, ws},
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post, put},
    },
    domain::{
        gateway::GatewayClient,
        money::{CommissionPolicy, Currency},
        store::{ChatStore, LedgerStore},
    },
    services::{
        chat::ChatService, dispatcher::PushDispatcher, ledger::PaymentLedger,
        reconciler::ReturnReconciler, registry::ConnectionRegistry,
    },
    std::{sync::Arc, time::Duration},
    tower_http::timeout::TimeoutLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<PaymentLedger>,
    pub reconciler: Arc<ReturnReconciler>,
    pub gateway: Arc<dyn GatewayClient>,
    pub registry: Arc<ConnectionRegistry>,
    pub chat: Arc<ChatService>,
    pub auth: Arc<JwtVerifier>,
    pub webhook_secret: Arc<str>,
    pub return_url: Arc<str>,
}

/// Values the state needs beyond its collaborators.
pub struct Settings<'a> {
    pub jwt_secret: &'a str,
    pub webhook_secret: &'a str,
    pub return_url: &'a str,
    pub commission: CommissionPolicy,
    pub currency: Currency,
}

impl AppState {
    /// Wires services around one registry so every push reaches the same map.
    pub fn new(
        ledger_store: Arc<dyn LedgerStore>,
        chat_store: Arc<dyn ChatStore>,
        gateway: Arc<dyn GatewayClient>,
        settings: Settings<'_>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = PushDispatcher::new(Arc::clone(&registry));
        let ledger = Arc::new(PaymentLedger::new(
            ledger_store,
            dispatcher.clone(),
            settings.commission,
            settings.currency,
        ));
        let reconciler = Arc::new(ReturnReconciler::new(
            Arc::clone(&ledger),
            Arc::clone(&gateway),
        ));

        Self {
            ledger,
            reconciler,
            gateway,
            registry,
            chat: Arc::new(ChatService::new(chat_store, dispatcher)),
            auth: Arc::new(JwtVerifier::new(settings.jwt_secret)),
            webhook_secret: settings.webhook_secret.into(),
            return_url: settings.return_url.into(),
        }
    }
}

/// REST calls that reach the gateway get the gateway budget plus headroom.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/payments/create", post(http::create_payment))
        .route("/payments/return", get(http::payment_return))
        .route("/webhook/yookassa", post(webhook::yookassa_webhook))
        .route("/enrolled", get(http::list_enrollments))
        .route("/notifications", get(http::list_notifications))
        .route("/start-chat", post(http::start_chat))
        .route("/messages", post(http::send_message))
        .route("/messages/read", put(http::mark_read))
        .route("/admin/payout", post(http::admin_payout))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/ws", get(ws::push_socket))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}
