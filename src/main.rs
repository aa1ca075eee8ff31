use {
    gateway_orchestrator::{AppState, config::Config, infra, services::{payment_service::PaymentService, webhook_router::WebhookRouter}, transport::http, adapters::{ProviderEventLogger, registry::ProviderRegistry}, domain::provider::ProviderName},
    sqlx::postgres::PgPoolOptions,
    std::time::Instant,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    let pool = if config.db_enabled() {
        infra::db::connect(&config).await.expect("failed to connect to the configured database")
    } else {
        tracing::warn!("DB_* is not fully configured; starting in graceful-degradation mode");
        PgPoolOptions::new()
            .max_connections(config.db_pool_size)
            .connect_lazy("postgres://localhost:5432/postgres")
            .expect("failed to build lazy pool")
    };

    let event_logger = ProviderEventLogger::new(pool.clone());
    let registry = ProviderRegistry::from_config(&config, event_logger);
    let default_provider =
        ProviderName::try_from(config.default_provider.as_str()).expect("PROVIDER must name a known provider");

    let payment_service = PaymentService::new(pool.clone(), registry, default_provider, config.db_enabled());
    let webhook_router = WebhookRouter::new(
        pool.clone(),
        payment_service.clone(),
        config.stripe_webhook_secret.clone(),
        config.paypal_base_url.clone(),
        config.paypal_client_id.clone(),
        config.paypal_client_secret.clone(),
        config.paypal_webhook_id.clone(),
    );

    let state = AppState { config, pool, payment_service, webhook_router, started_at: Instant::now() };

    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.expect("failed to bind listener");
    tracing::info!("gateway_orchestrator listening on 0.0.0.0:8000");
    axum::serve(listener, app).await.expect("server error");
}
