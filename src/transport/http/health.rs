use {
    crate::{AppState, infra::postgres::payment_repo},
    axum::{Json, extract::State},
    serde_json::json,
    std::collections::BTreeMap,
};

pub async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Best-effort: in graceful-degradation mode there's no pool to query, so the
/// counters are omitted rather than faked.
pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime_seconds = state.started_at.elapsed().as_secs();

    if !state.config.db_enabled() {
        return Json(json!({
            "status": "ok",
            "db_connected": false,
            "uptime_seconds": uptime_seconds,
        }));
    }

    let db_connected = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();
    let status_counts: BTreeMap<String, i64> =
        payment_repo::status_counts(&state.pool).await.unwrap_or_default().into_iter().collect();
    let pending_by_provider: BTreeMap<String, i64> =
        payment_repo::pending_by_provider(&state.pool).await.unwrap_or_default().into_iter().collect();
    let (volume_count, volume_amount) =
        payment_repo::last_24h_volume(&state.pool).await.unwrap_or_default();

    Json(json!({
        "status": "ok",
        "db_connected": db_connected,
        "uptime_seconds": uptime_seconds,
        "status_counts": status_counts,
        "pending_by_provider": pending_by_provider,
        "last_24h_volume": { "count": volume_count, "amount": volume_amount },
    }))
}
