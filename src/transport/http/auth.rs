use {
    crate::{AppState, adapters::api_errors::ApiError, domain::error::GatewayError},
    axum::{extract::State, http::header::AUTHORIZATION, middleware::Next, response::Response},
    secrecy::ExposeSecret,
    subtle::ConstantTimeEq,
};

/// Bearer-token gate for everything except `/health*`, the Webpay return
/// callback, and the webhook sinks — spec §6. Comparison is constant-time,
/// same discipline as company-token checks in `services::payment_service`.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(GatewayError::Unauthenticated.into());
    };

    let expected = state.config.api_bearer_token.expose_secret().as_bytes();
    let given = token.as_bytes();
    let matches = expected.len() == given.len() && bool::from(expected.ct_eq(given));
    if !matches {
        return Err(GatewayError::Unauthenticated.into());
    }

    Ok(next.run(req).await)
}
