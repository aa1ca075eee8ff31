use {super::money::Money, super::provider::ProviderName, chrono::{DateTime, Utc}, serde::{Deserialize, Serialize}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Requested,
    Pending,
    Succeeded,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Completed)
    }
}

impl TryFrom<&str> for RefundStatus {
    type Error = super::error::GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "REQUESTED" => Ok(Self::Requested),
            "PENDING" => Ok(Self::Pending),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Self::Error::invalid(format!("unknown refund status: {other}"))),
        }
    }
}

pub struct NewRefund {
    pub payment_id: i64,
    pub provider: ProviderName,
    pub amount: Money,
    pub status: RefundStatus,
    pub provider_refund_id: Option<String>,
    pub reason: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Refund {
    pub id: i64,
    pub payment_id: i64,
    pub provider: ProviderName,
    pub amount: Money,
    pub status: RefundStatus,
    pub provider_refund_id: Option<String>,
    pub reason: Option<String>,
    pub payload: serde_json::Value,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
