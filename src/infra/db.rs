use crate::config::Config;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Builds the bounded connection pool described in spec §5. `search_path` is
/// applied on every new physical connection via `after_connect`, mirroring
/// the original service's per-borrow `SET search_path`.
pub async fn connect(config: &Config) -> Result<sqlx::PgPool, sqlx::Error> {
    let schema = config.db_schema.clone();
    let opts = PgConnectOptions::from_str(&config.db_url())?;

    PgPoolOptions::new()
        .max_connections(config.db_pool_size)
        .acquire_timeout(Duration::from_secs(10))
        .after_connect(move |conn, _meta| {
            let schema = schema.clone();
            Box::pin(async move {
                sqlx::query(&format!("SET search_path TO {schema}, public"))
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect_with(opts)
        .await
}

/// One retry on a closed-connection error, per spec §5: "Acquisition is
/// retried once on closed-connection errors before surfacing a Transient
/// failure." Callers pass a thunk so this stays generic across query shapes.
pub async fn with_retry<F, Fut, T>(op: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match op().await {
        Err(sqlx::Error::PoolClosed) | Err(sqlx::Error::Io(_)) => op().await,
        other => other,
    }
}
