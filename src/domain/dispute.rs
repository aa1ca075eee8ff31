use {super::money::Money, super::provider::ProviderName, chrono::{DateTime, Utc}, serde::{Deserialize, Serialize}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Resolved => "RESOLVED",
        }
    }
}

pub struct NewDispute {
    pub payment_id: i64,
    pub provider: ProviderName,
    pub provider_dispute_id: String,
    pub status: DisputeStatus,
    pub amount: Option<Money>,
    pub reason: Option<String>,
    pub payload: serde_json::Value,
}

/// Upserted on `(provider, provider_dispute_id)` — see webhook router §4.3.
#[derive(Debug, Clone)]
pub struct Dispute {
    pub id: i64,
    pub payment_id: i64,
    pub provider: ProviderName,
    pub provider_dispute_id: String,
    pub status: DisputeStatus,
    pub amount: Option<Money>,
    pub reason: Option<String>,
    pub payload: serde_json::Value,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}
