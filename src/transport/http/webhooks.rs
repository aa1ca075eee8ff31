use {
    crate::{AppState, adapters::api_errors::ApiError, domain::error::GatewayError, services::webhook_router::PaypalSignatureHeaders},
    axum::{body::Bytes, extract::State, http::HeaderMap},
};

/// Always answers 200 once the signature checks out and the event is
/// inboxed — routing failures are logged inside `WebhookRouter`, not
/// surfaced here, so a flaky downstream never triggers provider retries.
pub async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<&'static str, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::invalid("missing stripe-signature header"))?;
    state.webhook_router.handle_stripe(signature, &body).await?;
    Ok("ok")
}

pub async fn paypal_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<&'static str, ApiError> {
    let header = |name: &str| -> Result<String, ApiError> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::invalid(format!("missing {name} header")).into())
    };

    let paypal_headers = PaypalSignatureHeaders {
        auth_algo: header("paypal-auth-algo")?,
        cert_url: header("paypal-cert-url")?,
        transmission_id: header("paypal-transmission-id")?,
        transmission_sig: header("paypal-transmission-sig")?,
        transmission_time: header("paypal-transmission-time")?,
    };

    state.webhook_router.handle_paypal(&paypal_headers, &body).await?;
    Ok("ok")
}
