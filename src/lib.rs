pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod transport;

use {
    config::Config,
    services::{payment_service::PaymentService, webhook_router::WebhookRouter},
    std::time::Instant,
};

/// Shared handle threaded through every handler via axum's `State` extractor.
/// Each field is cheaply `Clone` (an `Arc`-backed pool, or plain config data),
/// so cloning `AppState` per request is the intended usage.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: sqlx::PgPool,
    pub payment_service: PaymentService,
    pub webhook_router: WebhookRouter,
    pub started_at: Instant,
}
