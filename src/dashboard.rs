use std::sync::Arc;

use chrono::{Duration, Utc};
use rusqlite::types::Value;

use crate::error::{ServiceError, StoreError};
use crate::listing::{ListingService, to_decimal};
use crate::models::{CompanySummary, DashboardCharts, DashboardOverview, LabelCount, Status};
use crate::registry::{Row, StoreId, StoreRegistry};

const RECENT_LIMIT: u32 = 5;
const TOP_COUNTRIES: u32 = 5;

pub const YIELD_BUCKETS: [&str; 6] = ["No Yield", "0-2%", "2-4%", "4-6%", "6-8%", "8%+"];

const YIELD_DISTRIBUTION_SQL: &str = "SELECT CASE \
    WHEN yield IS NULL OR yield = 0 THEN 0 \
    WHEN yield <= 2 THEN 1 \
    WHEN yield <= 4 THEN 2 \
    WHEN yield <= 6 THEN 3 \
    WHEN yield <= 8 THEN 4 \
    ELSE 5 END AS bucket, COUNT(*) AS count \
    FROM new_companies GROUP BY bucket ORDER BY bucket";

const STATUS_DISTRIBUTION_SQL: &str = "SELECT new_companies_status_id AS status_id, COUNT(*) AS count \
    FROM new_companies GROUP BY new_companies_status_id ORDER BY new_companies_status_id";

pub struct DashboardService {
    registry: Arc<StoreRegistry>,
    listing: ListingService,
}

impl DashboardService {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        let listing = ListingService::new(Arc::clone(&registry));
        Self { registry, listing }
    }

    pub fn overview(&self) -> Result<DashboardOverview, ServiceError> {
        Ok(DashboardOverview {
            summary: self.summary()?,
            top_countries: self.country_counts(Some(TOP_COUNTRIES))?,
            recent: self.listing.recent(RECENT_LIMIT)?,
        })
    }

    pub fn charts(&self) -> Result<DashboardCharts, ServiceError> {
        Ok(DashboardCharts {
            status_distribution: self.status_distribution()?,
            country_distribution: self.country_counts(None)?,
            yield_distribution: self.yield_distribution()?,
        })
    }

    pub fn summary(&self) -> Result<CompanySummary, ServiceError> {
        let sql = format!(
            "SELECT COUNT(*) AS total, \
             COUNT(CASE WHEN new_companies_status_id IS NULL THEN 1 END) AS pending, \
             COUNT(CASE WHEN new_companies_status_id = {approved} THEN 1 END) AS approved, \
             COUNT(CASE WHEN new_companies_status_id = {blocked} THEN 1 END) AS blocked, \
             COUNT(CASE WHEN new_companies_status_id = {rejected} THEN 1 END) AS rejected, \
             COUNT(CASE WHEN yield > 0 THEN 1 END) AS with_yield, \
             AVG(CASE WHEN yield > 0 THEN yield END) AS average_yield, \
             MAX(yield) AS max_yield, \
             COUNT(CASE WHEN created >= ? THEN 1 END) AS added_last_week \
             FROM new_companies",
            approved = Status::APPROVED_ID,
            blocked = Status::BLOCKED_ID,
            rejected = Status::REJECTED_ID,
        );
        let cutoff = (Utc::now() - Duration::days(7))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let rows = self.query(&sql, &[Value::Text(cutoff)])?;
        let Some(row) = rows.first() else {
            return Err(ServiceError::ServiceUnavailable);
        };
        decode(row_to_summary(row))
    }

    pub fn status_distribution(&self) -> Result<Vec<LabelCount>, ServiceError> {
        let rows = self.query(STATUS_DISTRIBUTION_SQL, &[])?;
        let mut out: Vec<LabelCount> = Vec::new();
        for row in &rows {
            let status = Status::from_foreign_key(decode(row.get::<Option<i64>>("status_id"))?);
            let count = decode(row.get::<i64>("count"))?;
            // Dangling ids fold into Pending alongside NULL.
            match out.iter_mut().find(|entry| entry.label == status.label()) {
                Some(entry) => entry.count += count,
                None => out.push(LabelCount {
                    label: status.label().to_string(),
                    count,
                }),
            }
        }
        Ok(out)
    }

    pub fn yield_distribution(&self) -> Result<Vec<LabelCount>, ServiceError> {
        let rows = self.query(YIELD_DISTRIBUTION_SQL, &[])?;
        rows.iter()
            .map(|row| {
                let bucket = decode(row.get::<i64>("bucket"))?;
                let label = YIELD_BUCKETS
                    .get(bucket as usize)
                    .copied()
                    .unwrap_or(YIELD_BUCKETS[YIELD_BUCKETS.len() - 1]);
                Ok(LabelCount {
                    label: label.to_string(),
                    count: decode(row.get::<i64>("count"))?,
                })
            })
            .collect()
    }

    fn country_counts(&self, limit: Option<u32>) -> Result<Vec<LabelCount>, ServiceError> {
        let mut sql = String::from(
            "SELECT TRIM(country_name) AS label, COUNT(*) AS count FROM new_companies \
             WHERE country_name IS NOT NULL AND TRIM(country_name) <> '' \
             GROUP BY TRIM(country_name) ORDER BY count DESC, label ASC",
        );
        let mut params = Vec::new();
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        let rows = self.query(&sql, &params)?;
        rows.iter().map(|row| decode(row_to_label_count(row))).collect()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ServiceError> {
        Ok(self.registry.execute(StoreId::Portfolio, sql, params)?)
    }
}

fn decode<T>(result: rusqlite::Result<T>) -> Result<T, ServiceError> {
    result.map_err(|e| ServiceError::from(StoreError::query(StoreId::Portfolio, e)))
}

fn row_to_summary(row: &Row) -> rusqlite::Result<CompanySummary> {
    Ok(CompanySummary {
        total: row.get("total")?,
        pending: row.get("pending")?,
        approved: row.get("approved")?,
        blocked: row.get("blocked")?,
        rejected: row.get("rejected")?,
        with_yield: row.get("with_yield")?,
        average_yield: to_decimal(row.get("average_yield")?).map(|d| d.round_dp(2)),
        max_yield: to_decimal(row.get("max_yield")?),
        added_last_week: row.get("added_last_week")?,
    })
}

fn row_to_label_count(row: &Row) -> rusqlite::Result<LabelCount> {
    Ok(LabelCount {
        label: row.get("label")?,
        count: row.get("count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::*;
    use rust_decimal::Decimal;

    fn seed(registry: &StoreRegistry) {
        let rows: [(&str, Option<&str>, Option<f64>, Status); 6] = [
            ("A", Some("Sweden"), None, Status::Pending),
            ("B", Some("Sweden"), Some(1.5), Status::Pending),
            ("C", Some("Norway"), Some(3.0), Status::Approved),
            ("D", Some("Denmark"), Some(9.0), Status::Rejected),
            ("E", None, Some(0.0), Status::Blocked),
            ("F", Some("Sweden "), Some(4.5), Status::Approved),
        ];
        for (name, country, yield_pct, status) in rows {
            add_candidate(
                registry,
                NewCandidate {
                    country,
                    yield_pct,
                    status,
                    ..NewCandidate::named(name)
                },
            );
        }
    }

    #[test]
    fn test_summary_counts() {
        let stores = stores(true);
        seed(&stores.registry);
        let service = DashboardService::new(Arc::clone(&stores.registry));

        let summary = service.summary().unwrap();
        assert_eq!(summary.total, 6);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.approved, 2);
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.with_yield, 4);
        assert_eq!(summary.average_yield, Some(Decimal::new(45, 1)));
        assert_eq!(summary.max_yield, Some(Decimal::new(9, 0)));
        assert_eq!(summary.added_last_week, 6);
    }

    #[test]
    fn test_charts() {
        let stores = stores(false);
        seed(&stores.registry);
        let service = DashboardService::new(Arc::clone(&stores.registry));

        let charts = service.charts().unwrap();
        let pairs = |v: &[LabelCount]| -> Vec<(String, i64)> {
            v.iter().map(|e| (e.label.clone(), e.count)).collect()
        };
        assert_eq!(
            pairs(charts.status_distribution.as_slice()),
            vec![
                ("Pending".to_string(), 2),
                ("Approved".to_string(), 2),
                ("Blocked".to_string(), 1),
                ("Rejected".to_string(), 1),
            ]
        );
        assert_eq!(
            pairs(charts.yield_distribution.as_slice()),
            vec![
                ("No Yield".to_string(), 2),
                ("0-2%".to_string(), 1),
                ("2-4%".to_string(), 1),
                ("4-6%".to_string(), 1),
                ("8%+".to_string(), 1),
            ]
        );
        assert_eq!(charts.country_distribution[0].label, "Sweden");
        assert_eq!(charts.country_distribution[0].count, 3);
        assert_eq!(charts.country_distribution.len(), 3);
    }

    #[test]
    fn test_overview_lists_recent_first() {
        let stores = stores(true);
        seed(&stores.registry);
        let service = DashboardService::new(Arc::clone(&stores.registry));

        let overview = service.overview().unwrap();
        let recent: Vec<&str> = overview.recent.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(recent, vec!["F", "E", "D", "C", "B"]);
        assert!(overview.top_countries.len() <= 5);
    }
}
