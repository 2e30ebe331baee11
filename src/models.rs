use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Review status. A NULL status foreign key is `Pending`; the other variants
/// map onto rows of the `new_companies_status` lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Approved,
    Blocked,
    Rejected,
}

impl Status {
    pub const APPROVED_ID: i64 = 1;
    pub const BLOCKED_ID: i64 = 2;
    pub const REJECTED_ID: i64 = 3;

    /// Value stored in `new_companies_status_id`; `None` means pending.
    pub fn foreign_key(&self) -> Option<i64> {
        match self {
            Status::Pending => None,
            Status::Approved => Some(Self::APPROVED_ID),
            Status::Blocked => Some(Self::BLOCKED_ID),
            Status::Rejected => Some(Self::REJECTED_ID),
        }
    }

    /// Inverse of `foreign_key`. Ids outside the lookup are treated as pending.
    pub fn from_foreign_key(fk: Option<i64>) -> Self {
        match fk {
            Some(Self::APPROVED_ID) => Status::Approved,
            Some(Self::BLOCKED_ID) => Status::Blocked,
            Some(Self::REJECTED_ID) => Status::Rejected,
            Some(other) => {
                tracing::warn!(status_id = other, "unknown status id, treating as pending");
                Status::Pending
            }
            None => Status::Pending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Approved => "Approved",
            Status::Blocked => "Blocked",
            Status::Rejected => "Rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: i64,
    pub name: String,
    pub country: Option<String>,
    pub comment: Option<String>,
    #[serde(rename = "yield")]
    pub yield_pct: Option<Decimal>,
    pub ticker: Option<String>,
    pub broker_id: Option<i64>,
    pub broker_name: Option<String>, // joined from the foundation store
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broker {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub role: String,
}

impl Identity {
    pub fn new(id: i64, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePage {
    pub items: Vec<Candidate>,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub blocked: i64,
    pub rejected: i64,
    pub with_yield: i64,
    pub average_yield: Option<Decimal>,
    pub max_yield: Option<Decimal>,
    pub added_last_week: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub summary: CompanySummary,
    pub top_countries: Vec<LabelCount>,
    pub recent: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    pub status_distribution: Vec<LabelCount>,
    pub country_distribution: Vec<LabelCount>,
    pub yield_distribution: Vec<LabelCount>,
}
