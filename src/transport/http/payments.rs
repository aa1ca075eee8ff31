use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            error::GatewayError,
            id::Token,
            payment::{Payment, PaymentStatus, RedirectInfo},
            provider::ProviderName,
            refund::Refund,
        },
        infra::postgres::payment_repo::ListFilters,
        services::payment_service::{PaymentCreateRequest, PaymentCreateResponse},
    },
    axum::{
        Form, Json,
        extract::{Query, State},
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PaymentCreateRequest>,
) -> Result<Json<PaymentCreateResponse>, ApiError> {
    let idempotency_key = headers.get("Idempotency-Key").and_then(|v| v.to_str().ok()).map(str::to_string);
    let response = state.payment_service.create(req, idempotency_key).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub provider: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub token: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_payments(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let provider = q.provider.as_deref().map(ProviderName::try_from).transpose()?;
    let status = q.status.as_deref().map(PaymentStatus::try_from).transpose()?;
    let token = q.token.map(Token::new);
    let filters = ListFilters {
        provider,
        status,
        start_date: q.start_date,
        end_date: q.end_date,
        token: token.as_ref(),
        limit: q.limit.unwrap_or(100).clamp(1, 500),
    };
    let payments = state.payment_service.list(&filters).await?;
    Ok(Json(payments))
}

pub async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(state.payment_service.list_pending().await?))
}

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub token: String,
}

pub async fn redirect_info(
    State(state): State<AppState>,
    Query(q): Query<RedirectQuery>,
) -> Result<Json<RedirectInfo>, ApiError> {
    let token = Token::new(q.token);
    let (_, redirect) = state.payment_service.redirect(&token).await?;
    Ok(Json(redirect))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub token: String,
    pub amount: Option<Decimal>,
    pub company_id: i64,
    pub company_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub payment: Payment,
    pub refund: Refund,
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let token = Token::new(req.token);
    let (payment, refund) =
        state.payment_service.refund(&token, req.amount, req.company_id, &req.company_token).await?;
    Ok(Json(RefundResponse { payment, refund }))
}

/// Shopper-return callback — no auth, no JSON body; the provider redirects
/// the browser here with query or form params depending on method.
pub async fn tbk_return_get(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    handle_tbk_return(state, params).await
}

pub async fn tbk_return_post(State(state): State<AppState>, Form(params): Form<HashMap<String, String>>) -> Response {
    handle_tbk_return(state, params).await
}

async fn handle_tbk_return(state: AppState, params: HashMap<String, String>) -> Response {
    let format = params.get("format").cloned();
    let paypal_cancel = params.get("paypal_cancel").map(|v| v == "true").unwrap_or(false);
    let aborted = params.contains_key("TBK_TOKEN") || paypal_cancel;

    let token_str = params.get("token_ws").or_else(|| params.get("TBK_TOKEN")).cloned();
    let Some(token_str) = token_str else {
        return ApiError::from(GatewayError::invalid("missing token_ws or TBK_TOKEN")).into_response();
    };
    let token = Token::new(token_str);

    let result =
        if aborted { state.payment_service.cancel(&token, None).await } else { state.payment_service.commit(&token, None).await };

    match result {
        Ok(payment) => respond_with_redirect(payment, format.as_deref()),
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn respond_with_redirect(payment: Payment, format: Option<&str>) -> Response {
    let target_url = match payment.status {
        PaymentStatus::Authorized => payment.success_url.clone(),
        PaymentStatus::Canceled => payment.cancel_url.clone(),
        _ => payment.failure_url.clone(),
    };

    if format != Some("json") {
        if let Some(url) = target_url {
            let separator = if url.contains('?') { '&' } else { '?' };
            let location = format!(
                "{url}{separator}status={}&buy_order={}",
                url_encode(payment.status.as_str()),
                url_encode(payment.buy_order.as_str())
            );
            return (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response();
        }
    }
    Json(payment).into_response()
}

/// Minimal query-value percent-encoding — buy_order/status values only ever
/// need the reserved-character set escaped, not full RFC 3986 coverage.
fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
