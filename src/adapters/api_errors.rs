use crate::domain::error::GatewayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype so this crate can implement `IntoResponse` for `GatewayError`.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            GatewayError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            GatewayError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", "unauthenticated".to_string())
            }
            GatewayError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "forbidden".to_string()),
            GatewayError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            GatewayError::Provider(msg) => (StatusCode::BAD_GATEWAY, "provider_error", msg.clone()),
            GatewayError::Transient(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "transient", msg.clone())
            }
            GatewayError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error".to_string())
            }
            GatewayError::Serialization(err) => {
                tracing::error!(error = %err, "serialization error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error".to_string())
            }
            GatewayError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error".to_string())
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
