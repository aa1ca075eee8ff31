use {
    super::error::GatewayError,
    super::id::Token,
    super::money::Money,
    super::payment::{NewPayment, PaymentStatus, RedirectInfo},
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

/// Dispatch key. Polymorphism over providers is a capability set plus a
/// registry lookup, not dynamic inheritance — see `adapters::registry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Webpay,
    Stripe,
    Paypal,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webpay => "webpay",
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
        }
    }

    /// Webpay only transacts in CLP — §4.1 step 2.
    pub fn requires_clp(&self) -> bool {
        matches!(self, Self::Webpay)
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ProviderName {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "webpay" | "transbank" => Ok(Self::Webpay),
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            other => Err(GatewayError::not_found(format!("unknown provider: {other}"))),
        }
    }
}

/// What `ProviderPort::create` hands back, plus any provider_metadata the
/// adapter wants merged into the Payment row (invariant 6: monotonic merge).
pub struct CreateOutcome {
    pub redirect: RedirectInfo,
    pub token: Token,
    pub provider_metadata: serde_json::Value,
}

/// What `ProviderPort::commit` hands back. `response_code == 0` is success in
/// provider-agnostic terms — anything else maps to FAILED.
pub struct CommitOutcome {
    pub response_code: i32,
    pub authorization_code: Option<String>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub status_reason: Option<String>,
    pub provider_metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub ok: bool,
    pub amount: Option<Money>,
    pub provider_refund_id: Option<String>,
    pub status: String,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

/// `create(payment, return_url) -> (redirect, token)`,
/// `commit(token) -> outcome`, `status(token) -> Status | None`,
/// `refund(token, amount?) -> RefundOutcome`. One implementation per provider.
///
/// `create` takes a `NewPayment`, not a `Payment` — the provider round-trip
/// happens before the row is inserted, so there is no internal id yet. Any
/// provider that wants a session-scoped identifier (Webpay's `session_id`)
/// generates its own opaque one.
#[async_trait]
pub trait ProviderPort: Send + Sync {
    fn name(&self) -> ProviderName;

    async fn create(&self, payment: &NewPayment, return_url: &str) -> Result<CreateOutcome, GatewayError>;

    async fn commit(&self, token: &Token) -> Result<CommitOutcome, GatewayError>;

    /// Read-only status lookup. `None` means the provider has no opinion yet.
    async fn status(&self, token: &Token) -> Result<Option<PaymentStatus>, GatewayError>;

    async fn refund(&self, token: &Token, amount: Option<Money>) -> Result<RefundOutcome, GatewayError>;
}
