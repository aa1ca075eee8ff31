use {
    crate::domain::{
        error::GatewayError,
        id::{BuyOrder, Token},
        money::{Currency, Money},
        payment::{
            Environment, NewPayment, Payment, PaymentOrder, PaymentOrderStatus, PaymentStatus, PaymentType,
        },
        provider::ProviderName,
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::FromRow,
};

/// Mirrors the `payment` table column-for-column. Kept separate from the
/// domain `Payment` type so parsing failures (bad enum string, etc.) surface
/// as a single conversion step instead of leaking `sqlx::Row` everywhere.
#[derive(FromRow)]
struct PaymentRow {
    id: i64,
    provider: String,
    token: String,
    company_id: i64,
    buy_order: String,
    amount: Decimal,
    currency: String,
    payment_type: String,
    commerce_id: Option<String>,
    product_id: Option<String>,
    product_name: Option<String>,
    customer_rut: Option<String>,
    environment: String,
    redirect_url: Option<String>,
    return_url: String,
    success_url: Option<String>,
    failure_url: Option<String>,
    cancel_url: Option<String>,
    status: String,
    provider_metadata: serde_json::Value,
    context: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    first_authorized_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    response_code: Option<i32>,
    status_reason: Option<String>,
    authorization_code: Option<String>,
    idempotency_key: Option<String>,
}

const PAYMENT_COLUMNS: &str = "id, provider, token, company_id, buy_order, amount, currency, payment_type, \
     commerce_id, product_id, product_name, customer_rut, environment, redirect_url, return_url, \
     success_url, failure_url, cancel_url, status, provider_metadata, context, created_at, updated_at, \
     first_authorized_at, failed_at, canceled_at, refunded_at, response_code, status_reason, \
     authorization_code, idempotency_key";

impl TryFrom<PaymentRow> for Payment {
    type Error = GatewayError;

    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        let currency = Currency::try_from(r.currency.as_str())?;
        Ok(Payment {
            id: r.id,
            provider: ProviderName::try_from(r.provider.as_str())?,
            token: Token::new(r.token),
            company_id: r.company_id,
            buy_order: BuyOrder::new(r.buy_order)?,
            amount: Money::new(r.amount, currency)?,
            payment_type: PaymentType::try_from(r.payment_type.as_str())?,
            commerce_id: r.commerce_id,
            product_id: r.product_id,
            product_name: r.product_name,
            customer_rut: r.customer_rut,
            environment: Environment::try_from(r.environment.as_str())?,
            redirect_url: r.redirect_url,
            return_url: r.return_url,
            success_url: r.success_url,
            failure_url: r.failure_url,
            cancel_url: r.cancel_url,
            status: PaymentStatus::try_from(r.status.as_str())?,
            provider_metadata: r.provider_metadata,
            context: r.context,
            created_at: r.created_at,
            updated_at: r.updated_at,
            first_authorized_at: r.first_authorized_at,
            failed_at: r.failed_at,
            canceled_at: r.canceled_at,
            refunded_at: r.refunded_at,
            response_code: r.response_code,
            status_reason: r.status_reason,
            authorization_code: r.authorization_code,
            idempotency_key: r.idempotency_key,
        })
    }
}

/// Upsert per invariant 1: `(company_id, buy_order)` identifies exactly one
/// `PaymentOrder`. Called on every `Payment` save.
pub async fn upsert_payment_order(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    company_id: i64,
    buy_order: &BuyOrder,
    amount: Money,
) -> Result<i64, GatewayError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO payment_order (company_id, buy_order, amount, currency)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (company_id, buy_order) DO UPDATE SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(buy_order.as_str())
    .bind(amount.amount())
    .bind(amount.currency().as_str())
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

pub async fn mark_order_completed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_order_id: i64,
) -> Result<(), GatewayError> {
    sqlx::query("UPDATE payment_order SET status = 'COMPLETED', updated_at = now() WHERE id = $1")
        .bind(payment_order_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Marks the owning `PaymentOrder` COMPLETED via the FK on `payment`, since
/// the domain `Payment` type doesn't carry `payment_order_id` itself.
pub async fn mark_order_completed_for_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: i64,
) -> Result<(), GatewayError> {
    sqlx::query(
        "UPDATE payment_order SET status = 'COMPLETED', updated_at = now() \
         WHERE id = (SELECT payment_order_id FROM payment WHERE id = $1)",
    )
    .bind(payment_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn find_order(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    company_id: i64,
    buy_order: &BuyOrder,
) -> Result<Option<PaymentOrder>, GatewayError> {
    #[derive(FromRow)]
    struct Row {
        company_id: i64,
        buy_order: String,
        amount: Decimal,
        currency: String,
        status: String,
    }
    let row: Option<Row> = sqlx::query_as(
        "SELECT company_id, buy_order, amount, currency, status FROM payment_order WHERE company_id = $1 AND buy_order = $2",
    )
    .bind(company_id)
    .bind(buy_order.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    row.map(|r| {
        Ok(PaymentOrder {
            company_id: r.company_id,
            buy_order: BuyOrder::new(r.buy_order)?,
            amount: Money::new(r.amount, Currency::try_from(r.currency.as_str())?)?,
            status: PaymentOrderStatus::try_from(r.status.as_str())?,
        })
    })
    .transpose()
}

pub async fn insert_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_order_id: i64,
    token: &Token,
    new: &NewPayment,
) -> Result<Payment, GatewayError> {
    let row: PaymentRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO payment
            (provider, token, company_id, payment_order_id, buy_order, amount, currency, payment_type,
             commerce_id, product_id, product_name, customer_rut, environment, redirect_url, return_url,
             success_url, failure_url, cancel_url, status, provider_metadata, context, idempotency_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(new.provider.as_str())
    .bind(token.as_str())
    .bind(new.company_id)
    .bind(payment_order_id)
    .bind(new.buy_order.as_str())
    .bind(new.amount.amount())
    .bind(new.amount.currency().as_str())
    .bind(new.payment_type.as_str())
    .bind(&new.commerce_id)
    .bind(&new.product_id)
    .bind(&new.product_name)
    .bind(&new.customer_rut)
    .bind(new.environment.as_str())
    .bind(&new.redirect_url)
    .bind(&new.return_url)
    .bind(&new.success_url)
    .bind(&new.failure_url)
    .bind(&new.cancel_url)
    .bind(new.status.as_str())
    .bind(&new.provider_metadata)
    .bind(&new.context)
    .bind(&new.idempotency_key)
    .fetch_one(&mut **tx)
    .await?;
    Payment::try_from(row)
}

/// Row-level lock on `(provider, token)` per spec §5: within one Payment,
/// `save -> updateStatus` writes are serialised through this lock.
pub async fn find_by_token_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    provider: ProviderName,
    token: &Token,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment WHERE provider = $1 AND token = $2 FOR UPDATE"
    ))
    .bind(provider.as_str())
    .bind(token.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    row.map(Payment::try_from).transpose()
}

pub async fn find_by_token(
    pool: &sqlx::PgPool,
    provider: ProviderName,
    token: &Token,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRow> =
        sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE provider = $1 AND token = $2"))
            .bind(provider.as_str())
            .bind(token.as_str())
            .fetch_optional(pool)
            .await?;
    row.map(Payment::try_from).transpose()
}

pub async fn find_by_token_any_provider(
    pool: &sqlx::PgPool,
    token: &Token,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRow> =
        sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE token = $1"))
            .bind(token.as_str())
            .fetch_optional(pool)
            .await?;
    row.map(Payment::try_from).transpose()
}

pub async fn find_by_provider_metadata(
    pool: &sqlx::PgPool,
    provider: ProviderName,
    key: &str,
    value: &str,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment WHERE provider = $1 AND provider_metadata ->> $2 = $3"
    ))
    .bind(provider.as_str())
    .bind(key)
    .bind(value)
    .fetch_optional(pool)
    .await?;
    row.map(Payment::try_from).transpose()
}

pub async fn find_by_buy_order(
    pool: &sqlx::PgPool,
    provider: ProviderName,
    company_id: i64,
    buy_order: &BuyOrder,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment WHERE provider = $1 AND company_id = $2 AND buy_order = $3 \
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(provider.as_str())
    .bind(company_id)
    .bind(buy_order.as_str())
    .fetch_optional(pool)
    .await?;
    row.map(Payment::try_from).transpose()
}

pub async fn find_by_idempotency_key(
    pool: &sqlx::PgPool,
    company_id: i64,
    idempotency_key: &str,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment WHERE company_id = $1 AND idempotency_key = $2"
    ))
    .bind(company_id)
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await?;
    row.map(Payment::try_from).transpose()
}

/// Fields a transition is allowed to change. `None` means "leave as is" —
/// spec §4.4: response_code/status_reason/authorization_code update only
/// when the incoming value is non-null.
pub struct TransitionUpdate<'a> {
    pub status: PaymentStatus,
    pub response_code: Option<i32>,
    pub status_reason: Option<&'a str>,
    pub authorization_code: Option<&'a str>,
    pub provider_metadata: serde_json::Value,
    pub sets_first_authorized_at: bool,
    pub sets_failed_at: bool,
    pub sets_canceled_at: bool,
    pub sets_refunded_at: bool,
}

pub async fn apply_transition(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: i64,
    update: &TransitionUpdate<'_>,
) -> Result<Payment, GatewayError> {
    let row: PaymentRow = sqlx::query_as(&format!(
        r#"
        UPDATE payment SET
            status = $1,
            response_code = COALESCE($2, response_code),
            status_reason = COALESCE($3, status_reason),
            authorization_code = COALESCE($4, authorization_code),
            provider_metadata = $5,
            updated_at = now(),
            first_authorized_at = CASE WHEN $6 THEN now() ELSE first_authorized_at END,
            failed_at = CASE WHEN $7 THEN now() ELSE failed_at END,
            canceled_at = CASE WHEN $8 THEN now() ELSE canceled_at END,
            refunded_at = CASE WHEN $9 THEN now() ELSE refunded_at END
        WHERE id = $10
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(update.status.as_str())
    .bind(update.response_code)
    .bind(update.status_reason)
    .bind(update.authorization_code)
    .bind(&update.provider_metadata)
    .bind(update.sets_first_authorized_at)
    .bind(update.sets_failed_at)
    .bind(update.sets_canceled_at)
    .bind(update.sets_refunded_at)
    .bind(payment_id)
    .fetch_one(&mut **tx)
    .await?;
    Payment::try_from(row)
}

pub struct ListFilters<'a> {
    pub provider: Option<ProviderName>,
    pub status: Option<PaymentStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub token: Option<&'a Token>,
    pub limit: i64,
}

pub async fn list(pool: &sqlx::PgPool, filters: &ListFilters<'_>) -> Result<Vec<Payment>, GatewayError> {
    let mut sql = format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE 1=1");
    let mut idx = 1;
    if filters.provider.is_some() {
        idx += 1;
        sql.push_str(&format!(" AND provider = ${idx}"));
    }
    if filters.status.is_some() {
        idx += 1;
        sql.push_str(&format!(" AND status = ${idx}"));
    }
    if filters.start_date.is_some() {
        idx += 1;
        sql.push_str(&format!(" AND created_at >= ${idx}"));
    }
    if filters.end_date.is_some() {
        idx += 1;
        sql.push_str(&format!(" AND created_at <= ${idx}"));
    }
    if filters.token.is_some() {
        idx += 1;
        sql.push_str(&format!(" AND token = ${idx}"));
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT $1");

    let mut query = sqlx::query_as::<_, PaymentRow>(&sql).bind(filters.limit.min(500));
    if let Some(p) = filters.provider {
        query = query.bind(p.as_str());
    }
    if let Some(s) = filters.status {
        query = query.bind(s.as_str());
    }
    if let Some(d) = filters.start_date {
        query = query.bind(d);
    }
    if let Some(d) = filters.end_date {
        query = query.bind(d);
    }
    if let Some(t) = filters.token {
        query = query.bind(t.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    rows.into_iter().map(Payment::try_from).collect()
}

pub async fn list_pending(pool: &sqlx::PgPool) -> Result<Vec<Payment>, GatewayError> {
    let rows: Vec<PaymentRow> =
        sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE status = 'PENDING' ORDER BY created_at"))
            .fetch_all(pool)
            .await?;
    rows.into_iter().map(Payment::try_from).collect()
}

pub async fn status_counts(pool: &sqlx::PgPool) -> Result<Vec<(String, i64)>, GatewayError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM payment GROUP BY status")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

pub async fn pending_by_provider(pool: &sqlx::PgPool) -> Result<Vec<(String, i64)>, GatewayError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT provider, COUNT(*) FROM payment WHERE status = 'PENDING' GROUP BY provider",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn last_24h_volume(pool: &sqlx::PgPool) -> Result<(i64, Decimal), GatewayError> {
    let row: (i64, Option<Decimal>) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM payment WHERE created_at >= NOW() - INTERVAL '1 day'",
    )
    .fetch_one(pool)
    .await?;
    Ok((row.0, row.1.unwrap_or(Decimal::ZERO)))
}
