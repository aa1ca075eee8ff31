use {super::provider::ProviderName, serde::{Deserialize, Serialize}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Success,
    Failure,
    Unknown,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Dedup surface and retry anchor — unique on `(provider, event_id)`. The
/// `INSERT ... ON CONFLICT DO NOTHING` that backs this is how two concurrent
/// deliveries of the same event are made to race safely; see §5.
pub struct NewWebhookInboxEntry {
    pub provider: ProviderName,
    pub event_id: String,
    pub verification_status: VerificationStatus,
    pub headers: serde_json::Value,
    pub payload: serde_json::Value,
    pub related_payment_id: Option<i64>,
}
