use crate::domain::{
    dispute::{Dispute, DisputeStatus, NewDispute},
    error::GatewayError,
    money::{Currency, Money},
    provider::ProviderName,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(FromRow)]
struct DisputeRow {
    id: i64,
    payment_id: i64,
    provider: String,
    provider_dispute_id: String,
    status: String,
    amount: Option<Decimal>,
    currency: Option<String>,
    reason: Option<String>,
    payload: serde_json::Value,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DisputeRow> for Dispute {
    type Error = GatewayError;

    fn try_from(r: DisputeRow) -> Result<Self, Self::Error> {
        let amount = match (r.amount, r.currency) {
            (Some(a), Some(c)) => Some(Money::new(a, Currency::try_from(c.as_str())?)?),
            _ => None,
        };
        Ok(Dispute {
            id: r.id,
            payment_id: r.payment_id,
            provider: ProviderName::try_from(r.provider.as_str())?,
            provider_dispute_id: r.provider_dispute_id,
            status: match r.status.as_str() {
                "OPEN" => DisputeStatus::Open,
                "RESOLVED" => DisputeStatus::Resolved,
                other => return Err(GatewayError::invalid(format!("unknown dispute status: {other}"))),
            },
            amount,
            reason: r.reason,
            payload: r.payload,
            opened_at: r.opened_at,
            closed_at: r.closed_at,
        })
    }
}

/// Upsert on `(provider, provider_dispute_id)` per §4.3.
pub async fn upsert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    new: &NewDispute,
) -> Result<Dispute, GatewayError> {
    let closed_at = matches!(new.status, DisputeStatus::Resolved).then(chrono::Utc::now);
    let row: DisputeRow = sqlx::query_as(
        r#"
        INSERT INTO dispute (payment_id, provider, provider_dispute_id, status, amount, currency, reason, payload, closed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (provider, provider_dispute_id) DO UPDATE SET
            status = EXCLUDED.status,
            amount = COALESCE(EXCLUDED.amount, dispute.amount),
            currency = COALESCE(EXCLUDED.currency, dispute.currency),
            reason = COALESCE(EXCLUDED.reason, dispute.reason),
            payload = EXCLUDED.payload,
            closed_at = COALESCE(EXCLUDED.closed_at, dispute.closed_at)
        RETURNING id, payment_id, provider, provider_dispute_id, status, amount, currency, reason, payload, opened_at, closed_at
        "#,
    )
    .bind(new.payment_id)
    .bind(new.provider.as_str())
    .bind(&new.provider_dispute_id)
    .bind(new.status.as_str())
    .bind(new.amount.map(|m| m.amount()))
    .bind(new.amount.map(|m| m.currency().as_str()))
    .bind(&new.reason)
    .bind(&new.payload)
    .bind(closed_at)
    .fetch_one(&mut **tx)
    .await?;
    Dispute::try_from(row)
}
