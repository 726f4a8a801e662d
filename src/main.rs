use {
    course_pay::{
        AppState, Settings,
        adapters::yookassa::YooKassaClient,
        config::AppConfig,
        infra::postgres::PgStore,
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::signal,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    if config.gateway.shop_id.is_none() || config.gateway.secret_key.is_none() {
        tracing::warn!("SHOP_ID / SECRET_KEY not set, checkout will fail until configured");
    }
    let gateway = YooKassaClient::new(&config.gateway).expect("failed to build gateway client");

    let store = Arc::new(PgStore::new(pool));
    let state = AppState::new(
        store.clone(),
        store,
        Arc::new(gateway),
        Settings {
            jwt_secret: &config.jwt_secret,
            webhook_secret: &config.webhook_secret,
            return_url: &config.return_url,
            commission: config.commission,
            currency: config.currency,
        },
    );

    let app = course_pay::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("failed to bind");
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
