use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::Status;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_COUNTRY_LEN: usize = 100;

/// Status dimension of a listing filter. `All` adds no constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    Pending,
    Approved,
    Blocked,
    Rejected,
    All,
}

impl StatusFilter {
    /// Permissive: anything unrecognized falls back to `Pending`.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return StatusFilter::Pending;
        };
        match raw.to_ascii_lowercase().as_str() {
            "pending" | "null" => StatusFilter::Pending,
            "approved" | "active" | "1" => StatusFilter::Approved,
            "blocked" | "2" => StatusFilter::Blocked,
            "rejected" | "inactive" | "3" => StatusFilter::Rejected,
            "all" => StatusFilter::All,
            _ => {
                tracing::warn!(status = raw, "unknown status filter, using pending");
                StatusFilter::Pending
            }
        }
    }

    pub fn status(&self) -> Option<Status> {
        match self {
            StatusFilter::Pending => Some(Status::Pending),
            StatusFilter::Approved => Some(Status::Approved),
            StatusFilter::Blocked => Some(Status::Blocked),
            StatusFilter::Rejected => Some(Status::Rejected),
            StatusFilter::All => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFilterParams {
    pub search: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "broker")]
    pub broker_id: Option<String>,
    pub country: Option<String>,
    pub page: Option<String>,
    #[serde(alias = "limit")]
    pub page_size: Option<String>,
}

impl RawFilterParams {
    /// Build from decoded key/value pairs; unknown keys are ignored, last value wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut raw = RawFilterParams::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "search" => &mut raw.search,
                "status" => &mut raw.status,
                "brokerId" | "broker" => &mut raw.broker_id,
                "country" => &mut raw.country,
                "page" => &mut raw.page,
                "pageSize" | "limit" => &mut raw.page_size,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub search: Option<String>,
    pub status: StatusFilter,
    pub broker_id: Option<i64>,
    pub country: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            search: None,
            status: StatusFilter::Pending,
            broker_id: None,
            country: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FilterSpec {
    pub fn parse(raw: &RawFilterParams) -> Result<Self, ValidationError> {
        let search = raw
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let broker_id = match unconstrained_or(raw.broker_id.as_deref()) {
            None => None,
            Some(value) => Some(value.parse::<i64>().map_err(|_| {
                ValidationError::new("brokerId", format!("'{}' is not a broker id", value))
            })?),
        };

        let country = match unconstrained_or(raw.country.as_deref()) {
            Some(value) if value.chars().count() > MAX_COUNTRY_LEN => {
                return Err(ValidationError::new(
                    "country",
                    format!("longer than {} characters", MAX_COUNTRY_LEN),
                ));
            }
            other => other.map(str::to_string),
        };

        let page = parse_number("page", raw.page.as_deref())?
            .map(|p| p.clamp(1, u32::MAX as i64) as u32)
            .unwrap_or(1);
        let page_size = parse_number("pageSize", raw.page_size.as_deref())?
            .map(|s| s.clamp(1, MAX_PAGE_SIZE as i64) as u32)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(Self {
            search,
            status: StatusFilter::parse(raw.status.as_deref()),
            broker_id,
            country,
            page,
            page_size,
        })
    }

    /// Approved companies only, as shown on the masterlist.
    pub fn masterlist(search: Option<&str>, page: u32, page_size: u32) -> Self {
        Self {
            search: search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            status: StatusFilter::Approved,
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            ..Self::default()
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }
}

/// Trimmed value, or `None` when absent, empty or "all".
fn unconstrained_or(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
}

fn parse_number(field: &'static str, raw: Option<&str>) -> Result<Option<i64>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ValidationError::new(field, format!("'{}' is not an integer", value))),
    }
}
