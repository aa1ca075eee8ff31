use {super::provider::ProviderName, chrono::{DateTime, Utc}, serde::{Deserialize, Serialize}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventDirection {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventOperation {
    Create,
    Commit,
    Status,
    Refund,
}

impl EventOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Commit => "COMMIT",
            Self::Status => "STATUS",
            Self::Refund => "REFUND",
        }
    }
}

/// Append-only log of every outbound provider call. Headers are masked
/// before this type is ever constructed — see `adapters::mask_headers`.
pub struct NewProviderEvent {
    pub payment_id: Option<i64>,
    pub provider: ProviderName,
    pub direction: EventDirection,
    pub operation: EventOperation,
    pub request_url: String,
    pub request_headers: serde_json::Value,
    pub request_body: serde_json::Value,
    pub response_status: Option<i32>,
    pub response_headers: serde_json::Value,
    pub response_body: serde_json::Value,
    pub error_message: Option<String>,
    pub latency_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub id: i64,
    pub payment_id: Option<i64>,
    pub provider: ProviderName,
    pub operation: EventOperation,
    pub response_status: Option<i32>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}
