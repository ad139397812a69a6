use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescueRequest {
    pub garage_id: i64,
    pub description: String,
}

/// `status` stays a raw integer: codes outside the known workflow stages are
/// relayed as-is.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    pub customer_id: i64,
    pub status: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarageRejectRequest {
    pub customer_id: i64,
    pub reject_reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCancelRequest {
    pub garage_id: i64,
    pub reject_reason: String,
}

/// Workflow stage of a rescue, in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescueStatus {
    Pending = 0,
    Accepted = 1,
    Arriving = 2,
    Arrived = 3,
    Working = 4,
    Rejected = 5,
    Done = 6,
}

impl RescueStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Accepted),
            2 => Some(Self::Arriving),
            3 => Some(Self::Arrived),
            4 => Some(Self::Working),
            5 => Some(Self::Rejected),
            6 => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Body of every relay response, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl RelayResponse {
    pub fn delivered(success_count: usize) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: format!("success: {}", success_count),
        }
    }

    pub fn failed(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub struct HelloResponse {
    pub message: &'static str,
}
