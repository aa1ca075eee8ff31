use crate::domain::{error::GatewayError, provider_event::NewProviderEvent};

/// Append-only — never updated, never deleted. Write failures here are
/// logged and never fail the primary state transition, per §7's propagation
/// policy for secondary bookkeeping.
pub async fn insert(pool: &sqlx::PgPool, event: &NewProviderEvent) -> Result<(), GatewayError> {
    let result = sqlx::query(
        r#"
        INSERT INTO provider_event_log
            (payment_id, provider, direction, operation, request_url, request_headers, request_body,
             response_status, response_headers, response_body, error_message, latency_ms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(event.payment_id)
    .bind(event.provider.as_str())
    .bind(if matches!(event.direction, crate::domain::provider_event::EventDirection::Outbound) {
        "OUTBOUND"
    } else {
        "INBOUND"
    })
    .bind(event.operation.as_str())
    .bind(&event.request_url)
    .bind(&event.request_headers)
    .bind(&event.request_body)
    .bind(event.response_status)
    .bind(&event.response_headers)
    .bind(&event.response_body)
    .bind(&event.error_message)
    .bind(event.latency_ms)
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(error = %err, "failed to persist provider event log entry");
    }
    Ok(())
}
