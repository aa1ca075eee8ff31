use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Provider-issued opaque token. Unique per `(provider, token)` pair — see
/// `Payment` invariant 5.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Merchant-scoped order identifier — the `PaymentOrder` business key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuyOrder(String);

impl BuyOrder {
    pub fn new(value: impl Into<String>) -> Result<Self, super::error::GatewayError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(super::error::GatewayError::invalid("buy_order must not be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Webhook event identifier used for `webhook_inbox` dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
