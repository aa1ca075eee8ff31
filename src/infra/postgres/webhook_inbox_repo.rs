use crate::domain::{error::GatewayError, webhook_inbox::NewWebhookInboxEntry};

/// `INSERT ... ON CONFLICT DO NOTHING` keyed on `(provider, event_id)`.
/// Returns `true` if this call won the race and should run side effects —
/// spec §5: "the loser still returns 200."
pub async fn try_insert(pool: &sqlx::PgPool, entry: &NewWebhookInboxEntry) -> Result<bool, GatewayError> {
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO webhook_inbox (provider, event_id, verification_status, headers, payload, related_payment_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (provider, event_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(entry.provider.as_str())
    .bind(&entry.event_id)
    .bind(entry.verification_status.as_str())
    .bind(&entry.headers)
    .bind(&entry.payload)
    .bind(entry.related_payment_id)
    .fetch_optional(pool)
    .await?;
    Ok(inserted.is_some())
}
