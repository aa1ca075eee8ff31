pub mod api_errors;
pub mod paypal;
pub mod registry;
pub mod stripe;
pub mod webpay;

use crate::domain::provider::ProviderName;
use crate::domain::provider_event::{EventDirection, EventOperation, NewProviderEvent};
use crate::infra::postgres::provider_event_repo;
use std::time::Instant;

/// Headers every adapter MUST scrub before a `ProviderEvent` is persisted —
/// spec §4.2 / §9: "every outbound logger MUST replace values of
/// `Authorization`, `Tbk-Api-Key-Secret`, and any `*_secret` headers."
pub fn mask_headers(headers: &reqwest::header::HeaderMap) -> serde_json::Value {
    let mut masked = serde_json::Map::new();
    for (name, value) in headers.iter() {
        let key = name.as_str().to_ascii_lowercase();
        let is_secret = key == "authorization"
            || key == "tbk-api-key-secret"
            || key.ends_with("-secret")
            || key.ends_with("_secret");
        let shown = if is_secret { "***".to_string() } else { value.to_str().unwrap_or("").to_string() };
        masked.insert(name.as_str().to_string(), serde_json::Value::String(shown));
    }
    serde_json::Value::Object(masked)
}

/// The "shared persistent event-log writer" every adapter is stateful through
/// — everything else about an adapter is stateless per request.
#[derive(Clone)]
pub struct ProviderEventLogger {
    pool: sqlx::PgPool,
}

impl ProviderEventLogger {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn log(
        &self,
        payment_id: Option<i64>,
        provider: ProviderName,
        operation: EventOperation,
        request_url: &str,
        request_headers: serde_json::Value,
        request_body: serde_json::Value,
        response_status: Option<i32>,
        response_headers: serde_json::Value,
        response_body: serde_json::Value,
        error_message: Option<String>,
        started_at: Instant,
    ) {
        let event = NewProviderEvent {
            payment_id,
            provider,
            direction: EventDirection::Outbound,
            operation,
            request_url: request_url.to_string(),
            request_headers,
            request_body,
            response_status,
            response_headers,
            response_body,
            error_message,
            latency_ms: started_at.elapsed().as_millis() as i64,
        };
        let _ = provider_event_repo::insert(&self.pool, &event).await;
    }
}
