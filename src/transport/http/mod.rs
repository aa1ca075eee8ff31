pub mod auth;
pub mod health;
pub mod payments;
pub mod webhooks;

use {
    crate::AppState,
    axum::{
        Router, middleware,
        routing::{get, post},
    },
    tower_http::{cors::CorsLayer, trace::TraceLayer},
};

/// Bearer-gated routes are built first, then merged with the public surface
/// so `route_layer` only wraps the handlers that actually need it — spec §6.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/payments", post(payments::create_payment).get(payments::list_payments))
        .route("/api/payments/redirect", get(payments::redirect_info))
        .route("/api/payments/pending", get(payments::list_pending))
        .route("/api/payments/refund", post(payments::refund_payment))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer_token));

    let public = Router::new()
        .route("/health", get(health::liveness))
        .route("/health/metrics", get(health::metrics))
        .route("/api/payments/tbk/return", get(payments::tbk_return_get).post(payments::tbk_return_post))
        .route("/api/payments/stripe/webhook", post(webhooks::stripe_webhook))
        .route("/api/payments/paypal/webhook", post(webhooks::paypal_webhook));

    protected
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
