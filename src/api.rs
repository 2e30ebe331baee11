use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::actions::ActionService;
use crate::dashboard::DashboardService;
use crate::error::{ServiceError, ValidationError};
use crate::filter::{FilterSpec, RawFilterParams};
use crate::listing::ListingService;
use crate::models::{Broker, Candidate, DashboardCharts, DashboardOverview, Identity, Status};
use crate::registry::StoreRegistry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip)]
    pub status: u16,
}

impl From<ServiceError> for ErrorResponse {
    fn from(err: ServiceError) -> Self {
        Self {
            success: false,
            status: err.status_code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Ok(T),
    Err(ErrorResponse),
}

impl<T> Reply<T> {
    pub fn status_code(&self) -> u16 {
        match self {
            Reply::Ok(_) => 200,
            Reply::Err(err) => err.status,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }
}

impl<T> From<Result<T, ServiceError>> for Reply<T> {
    fn from(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(body) => Reply::Ok(body),
            Err(err) => Reply::Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyListResponse {
    pub success: bool,
    pub companies: Vec<Candidate>,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyResponse {
    pub success: bool,
    pub company: Candidate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyActionRequest {
    pub company_id: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyActionResponse {
    pub success: bool,
    pub message: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokersResponse {
    pub success: bool,
    pub brokers: Vec<Broker>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountriesResponse {
    pub success: bool,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardResponse<T> {
    pub success: bool,
    pub data: T,
}

pub struct Api {
    listing: ListingService,
    actions: ActionService,
    dashboard: DashboardService,
}

impl Api {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self {
            listing: ListingService::new(Arc::clone(&registry)),
            actions: ActionService::new(Arc::clone(&registry)),
            dashboard: DashboardService::new(registry),
        }
    }

    /// `GET /companies/new`
    pub fn list_new_companies(&self, caller: &Identity, raw: &RawFilterParams) -> Reply<CompanyListResponse> {
        tracing::debug!(caller = caller.id, "list new companies");
        FilterSpec::parse(raw)
            .map_err(ServiceError::from)
            .and_then(|spec| self.list(&spec))
            .into()
    }

    /// `GET /companies/masterlist`: approved companies only, whatever status was asked for.
    pub fn masterlist(&self, caller: &Identity, raw: &RawFilterParams) -> Reply<CompanyListResponse> {
        tracing::debug!(caller = caller.id, "masterlist");
        FilterSpec::parse(raw)
            .map_err(ServiceError::from)
            .and_then(|spec| {
                let spec = FilterSpec::masterlist(spec.search.as_deref(), spec.page, spec.page_size);
                self.list(&spec)
            })
            .into()
    }

    /// `GET /companies/:id`
    pub fn company(&self, caller: &Identity, id: i64) -> Reply<CompanyResponse> {
        tracing::debug!(caller = caller.id, company_id = id, "company detail");
        self.listing
            .get(id)
            .map(|company| CompanyResponse {
                success: true,
                company,
            })
            .into()
    }

    /// `POST /companies/action`
    pub fn company_action(&self, caller: &Identity, request: &CompanyActionRequest) -> Reply<CompanyActionResponse> {
        let result = parse_company_id(request.company_id.as_deref())
            .map_err(ServiceError::from)
            .and_then(|id| {
                let action = request.action.as_deref().unwrap_or_default();
                self.actions.transition(caller, id, action)
            })
            .map(|outcome| CompanyActionResponse {
                success: outcome.success,
                message: outcome.message,
                status: outcome.status,
            });
        result.into()
    }

    /// `GET /companies/filters/brokers`
    pub fn broker_options(&self, _caller: &Identity) -> Reply<BrokersResponse> {
        self.listing
            .broker_options()
            .map(|brokers| BrokersResponse {
                success: true,
                brokers,
            })
            .into()
    }

    /// `GET /companies/filters/countries`
    pub fn country_options(&self, _caller: &Identity) -> Reply<CountriesResponse> {
        self.listing
            .country_options()
            .map(|countries| CountriesResponse {
                success: true,
                countries,
            })
            .into()
    }

    /// `GET /dashboard/overview`
    pub fn dashboard_overview(&self, _caller: &Identity) -> Reply<DashboardResponse<DashboardOverview>> {
        self.dashboard
            .overview()
            .map(|data| DashboardResponse { success: true, data })
            .into()
    }

    /// `GET /dashboard/charts`
    pub fn dashboard_charts(&self, _caller: &Identity) -> Reply<DashboardResponse<DashboardCharts>> {
        self.dashboard
            .charts()
            .map(|data| DashboardResponse { success: true, data })
            .into()
    }

    fn list(&self, spec: &FilterSpec) -> Result<CompanyListResponse, ServiceError> {
        let page = self.listing.list(spec)?;
        Ok(CompanyListResponse {
            success: true,
            companies: page.items,
            total_count: page.total_count,
        })
    }
}

fn parse_company_id(raw: Option<&str>) -> Result<i64, ValidationError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ValidationError::new("companyId", "is required"))?;
    raw.parse::<i64>()
        .map_err(|_| ValidationError::new("companyId", format!("'{}' is not a company id", raw)))
}
