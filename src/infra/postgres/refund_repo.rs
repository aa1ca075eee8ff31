use crate::domain::{
    error::GatewayError,
    money::{Currency, Money},
    provider::ProviderName,
    refund::{NewRefund, Refund, RefundStatus},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(FromRow)]
struct RefundRow {
    id: i64,
    payment_id: i64,
    provider: String,
    amount: Decimal,
    currency: String,
    status: String,
    provider_refund_id: Option<String>,
    reason: Option<String>,
    payload: serde_json::Value,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RefundRow> for Refund {
    type Error = GatewayError;

    fn try_from(r: RefundRow) -> Result<Self, Self::Error> {
        Ok(Refund {
            id: r.id,
            payment_id: r.payment_id,
            provider: ProviderName::try_from(r.provider.as_str())?,
            amount: Money::new(r.amount, Currency::try_from(r.currency.as_str())?)?,
            status: RefundStatus::try_from(r.status.as_str())?,
            provider_refund_id: r.provider_refund_id,
            reason: r.reason,
            payload: r.payload,
            confirmed_at: r.confirmed_at,
            created_at: r.created_at,
        })
    }
}

/// Always writes a row, even on failure — spec §4.1/§7: a FAILED refund row
/// is the audit trail when the provider call errors or times out.
pub async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    new: &NewRefund,
) -> Result<Refund, GatewayError> {
    let confirmed_at = if new.status.is_confirmed() { Some(chrono::Utc::now()) } else { None };
    let row: RefundRow = sqlx::query_as(
        r#"
        INSERT INTO refund (payment_id, provider, amount, currency, status, provider_refund_id, reason, payload, confirmed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, payment_id, provider, amount, currency, status, provider_refund_id, reason, payload, confirmed_at, created_at
        "#,
    )
    .bind(new.payment_id)
    .bind(new.provider.as_str())
    .bind(new.amount.amount())
    .bind(new.amount.currency().as_str())
    .bind(new.status.as_str())
    .bind(&new.provider_refund_id)
    .bind(&new.reason)
    .bind(&new.payload)
    .bind(confirmed_at)
    .fetch_one(&mut **tx)
    .await?;
    Refund::try_from(row)
}

pub async fn total_refunded(pool: &sqlx::PgPool, payment_id: i64) -> Result<Decimal, GatewayError> {
    let total: Option<Decimal> = sqlx::query_scalar(
        "SELECT SUM(amount) FROM refund WHERE payment_id = $1 AND status IN ('SUCCEEDED', 'COMPLETED')",
    )
    .bind(payment_id)
    .fetch_one(pool)
    .await?;
    Ok(total.unwrap_or(Decimal::ZERO))
}
