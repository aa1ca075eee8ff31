use {
    super::id::{BuyOrder, Token},
    super::money::Money,
    super::provider::ProviderName,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Credit,
    Debit,
    Prepaid,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Prepaid => "prepaid",
        }
    }
}

impl TryFrom<&str> for PaymentType {
    type Error = super::error::GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            "prepaid" => Ok(Self::Prepaid),
            other => Err(Self::Error::invalid(format!("unknown payment_type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Test,
    Live,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Live => "live",
        }
    }
}

impl TryFrom<&str> for Environment {
    type Error = super::error::GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "test" => Ok(Self::Test),
            "live" => Ok(Self::Live),
            other => Err(Self::Error::invalid(format!("unknown environment: {other}"))),
        }
    }
}

/// Status lifecycle. Initial state is always `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Failed,
    Canceled,
    Refunded,
    ToConfirm,
    Abandoned,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Authorized => "AUTHORIZED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Refunded => "REFUNDED",
            Self::ToConfirm => "TO_CONFIRM",
            Self::Abandoned => "ABANDONED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorized | Self::Failed | Self::Canceled | Self::Refunded)
    }

    /// The permitted-transitions table in full. Anything not listed here is a
    /// no-op at the call site, logged as an anomaly rather than applied.
    pub fn can_transition_to(&self, new: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, new),
            (Pending, Authorized)
                | (Pending, Failed)
                | (Pending, Canceled)
                | (Pending, ToConfirm)
                | (Pending, Abandoned)
                | (Authorized, Failed)
                | (Authorized, Refunded)
                | (Failed, Authorized)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = super::error::GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        use PaymentStatus::*;
        match s {
            "PENDING" => Ok(Pending),
            "AUTHORIZED" => Ok(Authorized),
            "FAILED" => Ok(Failed),
            "CANCELED" => Ok(Canceled),
            "REFUNDED" => Ok(Refunded),
            "TO_CONFIRM" => Ok(ToConfirm),
            "ABANDONED" => Ok(Abandoned),
            other => Err(Self::Error::invalid(format!("unknown payment status: {other}"))),
        }
    }
}

/// A decision about what a status transition does to the row, independent of
/// how the store applies it. Kept separate from `PaymentStatus` so the store
/// layer, not the domain type, owns timestamp/`PaymentOrder` side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub allowed: bool,
    pub sets_first_authorized_at: bool,
    pub sets_failed_at: bool,
    pub sets_canceled_at: bool,
    pub sets_refunded_at: bool,
    pub completes_order: bool,
}

pub fn decide_transition(from: PaymentStatus, to: PaymentStatus, first_authorized_at_set: bool) -> TransitionOutcome {
    let allowed = from.can_transition_to(&to);
    TransitionOutcome {
        allowed,
        sets_first_authorized_at: allowed && to == PaymentStatus::Authorized && !first_authorized_at_set,
        sets_failed_at: allowed && to == PaymentStatus::Failed,
        sets_canceled_at: allowed && to == PaymentStatus::Canceled,
        sets_refunded_at: allowed && to == PaymentStatus::Refunded,
        completes_order: allowed && matches!(to, PaymentStatus::Authorized | PaymentStatus::Refunded),
    }
}

/// Redirect instructions handed back to the merchant after `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectInfo {
    pub url: String,
    pub method: RedirectMethod,
    pub form_fields: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RedirectMethod {
    Get,
    Post,
}

/// Named params for constructing a fresh `Payment` row (no id yet — assigned
/// by the store on insert).
pub struct NewPaymentParams {
    pub provider: ProviderName,
    pub company_id: i64,
    pub buy_order: BuyOrder,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub commerce_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub customer_rut: Option<String>,
    pub environment: Environment,
    pub return_url: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub cancel_url: Option<String>,
    pub context: serde_json::Value,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub provider: ProviderName,
    pub company_id: i64,
    pub buy_order: BuyOrder,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub commerce_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub customer_rut: Option<String>,
    pub environment: Environment,
    pub redirect_url: Option<String>,
    pub return_url: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub cancel_url: Option<String>,
    pub status: PaymentStatus,
    pub token: Option<Token>,
    pub provider_metadata: serde_json::Value,
    pub context: serde_json::Value,
    pub idempotency_key: Option<String>,
}

impl NewPayment {
    pub fn new(p: NewPaymentParams) -> Self {
        Self {
            provider: p.provider,
            company_id: p.company_id,
            buy_order: p.buy_order,
            amount: p.amount,
            payment_type: p.payment_type,
            commerce_id: p.commerce_id,
            product_id: p.product_id,
            product_name: p.product_name,
            customer_rut: p.customer_rut,
            environment: p.environment,
            redirect_url: None,
            return_url: p.return_url,
            success_url: p.success_url,
            failure_url: p.failure_url,
            cancel_url: p.cancel_url,
            status: PaymentStatus::Pending,
            token: None,
            provider_metadata: serde_json::json!({}),
            context: p.context,
            idempotency_key: p.idempotency_key,
        }
    }
}

/// Full persisted row, as returned by the store.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: i64,
    pub provider: ProviderName,
    pub token: Token,
    pub company_id: i64,
    pub buy_order: BuyOrder,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub commerce_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub customer_rut: Option<String>,
    pub environment: Environment,
    pub redirect_url: Option<String>,
    pub return_url: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub cancel_url: Option<String>,
    pub status: PaymentStatus,
    pub provider_metadata: serde_json::Value,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub first_authorized_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub response_code: Option<i32>,
    pub status_reason: Option<String>,
    pub authorization_code: Option<String>,
    pub idempotency_key: Option<String>,
}

impl Payment {
    /// Monotonic merge per invariant 6: existing keys are kept unless the
    /// incoming map explicitly overwrites them; no key is ever dropped.
    pub fn merge_provider_metadata(current: &serde_json::Value, incoming: &serde_json::Value) -> serde_json::Value {
        let mut merged = current.as_object().cloned().unwrap_or_default();
        if let Some(incoming_obj) = incoming.as_object() {
            for (k, v) in incoming_obj {
                merged.insert(k.clone(), v.clone());
            }
        }
        serde_json::Value::Object(merged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentOrderStatus {
    Open,
    Completed,
}

impl PaymentOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Completed => "COMPLETED",
        }
    }
}

impl TryFrom<&str> for PaymentOrderStatus {
    type Error = super::error::GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "OPEN" => Ok(Self::Open),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(Self::Error::invalid(format!("unknown payment_order status: {other}"))),
        }
    }
}

/// Groups `Payment` attempts per `(company_id, buy_order)` — invariants 1 & 2.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub company_id: i64,
    pub buy_order: BuyOrder,
    pub amount: Money,
    pub status: PaymentOrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_reach_every_direct_successor() {
        use PaymentStatus::*;
        for target in [Authorized, Failed, Canceled, ToConfirm, Abandoned] {
            assert!(Pending.can_transition_to(&target), "Pending -> {target:?}");
        }
        assert!(
            !Pending.can_transition_to(&Refunded),
            "refund only reachable from Authorized, per the transition table"
        );
    }

    #[test]
    fn terminal_states_reject_backwards_transitions() {
        use PaymentStatus::*;
        assert!(!Authorized.can_transition_to(&Pending));
        assert!(!Canceled.can_transition_to(&Pending));
        assert!(!Refunded.can_transition_to(&Pending));
        assert!(!Canceled.can_transition_to(&Authorized));
        assert!(!Refunded.can_transition_to(&Authorized));
    }

    #[test]
    fn dispute_lost_and_won_edges() {
        use PaymentStatus::*;
        assert!(Authorized.can_transition_to(&Failed));
        assert!(Failed.can_transition_to(&Authorized));
        assert!(!Failed.can_transition_to(&Refunded));
    }

    #[test]
    fn refund_only_from_authorized() {
        use PaymentStatus::*;
        assert!(Authorized.can_transition_to(&Refunded));
        assert!(!Pending.can_transition_to(&Refunded));
        assert!(!Failed.can_transition_to(&Refunded));
        assert!(!Canceled.can_transition_to(&Refunded));
    }

    #[test]
    fn no_state_transitions_to_itself() {
        use PaymentStatus::*;
        for s in [Pending, Authorized, Failed, Canceled, Refunded, ToConfirm, Abandoned] {
            assert!(!s.can_transition_to(&s), "{s:?} -> {s:?} must be rejected");
        }
    }

    #[test]
    fn status_str_roundtrip() {
        use PaymentStatus::*;
        for s in [Pending, Authorized, Failed, Canceled, Refunded, ToConfirm, Abandoned] {
            assert_eq!(PaymentStatus::try_from(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn first_authorized_at_sets_only_once() {
        let outcome = decide_transition(PaymentStatus::Pending, PaymentStatus::Authorized, false);
        assert!(outcome.sets_first_authorized_at);
        let outcome = decide_transition(PaymentStatus::Failed, PaymentStatus::Authorized, true);
        assert!(!outcome.sets_first_authorized_at);
    }

    #[test]
    fn authorized_and_refunded_complete_the_order() {
        let outcome = decide_transition(PaymentStatus::Pending, PaymentStatus::Authorized, false);
        assert!(outcome.completes_order);
        let outcome = decide_transition(PaymentStatus::Authorized, PaymentStatus::Refunded, true);
        assert!(outcome.completes_order);
        let outcome = decide_transition(PaymentStatus::Pending, PaymentStatus::Canceled, false);
        assert!(!outcome.completes_order);
    }

    #[test]
    fn merge_provider_metadata_keeps_old_keys() {
        let current = serde_json::json!({"token_ws": "abc", "buy_order": "O1"});
        let incoming = serde_json::json!({"payment_intent_id": "pi_1"});
        let merged = Payment::merge_provider_metadata(&current, &incoming);
        assert_eq!(merged["token_ws"], "abc");
        assert_eq!(merged["buy_order"], "O1");
        assert_eq!(merged["payment_intent_id"], "pi_1");
    }

    #[test]
    fn merge_provider_metadata_overwrites_same_key() {
        let current = serde_json::json!({"checkout_session_id": "cs_old"});
        let incoming = serde_json::json!({"checkout_session_id": "cs_new"});
        let merged = Payment::merge_provider_metadata(&current, &incoming);
        assert_eq!(merged["checkout_session_id"], "cs_new");
    }
}
