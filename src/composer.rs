//! Turns a `FilterSpec` into parameterized SQL.
//!
//! Candidates live in the portfolio store, brokers in the foundation store.
//! With `JoinStrategy::CrossStore` the broker name comes from a LEFT JOIN on
//! the attached `foundation` schema; with `JoinStrategy::Split` the page query
//! selects `NULL AS broker_name` and a second statement fetches the names.
//!
//! Clauses are appended in a fixed order (status, broker, country, search).
//! Caller-supplied values are always bound `?` parameters pushed in that same
//! order; only the status lookup ids are inlined as literals. Search compares
//! `casefold()` output, registered on every connection by the registry.

use rusqlite::types::Value;

use crate::error::StoreError;
use crate::filter::FilterSpec;
use crate::models::Status;
use crate::registry::{Row, StoreId, StoreRegistry};

const CANDIDATE_COLUMNS: &str = "nc.new_company_id, nc.company_name, nc.country_name, nc.comments, \
nc.yield, nc.ticker, nc.broker_id, nc.new_companies_status_id, ncs.status AS status_label";

const STATUS_JOIN: &str = "LEFT JOIN new_companies_status ncs ON nc.new_companies_status_id = ncs.id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// One statement; the foundation store is reachable as `foundation.*`.
    CrossStore,
    /// Two single-store statements merged in memory.
    Split,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub store: StoreId,
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(store: StoreId, sql: String, params: Vec<Value>) -> Self {
        Self { store, sql, params }
    }

    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    pub fn run(&self, registry: &StoreRegistry) -> Result<Vec<Row>, StoreError> {
        registry.execute(self.store, &self.sql, &self.params)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryComposer {
    strategy: JoinStrategy,
}

impl QueryComposer {
    pub fn new(strategy: JoinStrategy) -> Self {
        Self { strategy }
    }

    /// Cross-store joins when the registry attached the lookup stores.
    pub fn for_registry(registry: &StoreRegistry) -> Self {
        if registry.supports_cross_store() {
            Self::new(JoinStrategy::CrossStore)
        } else {
            Self::new(JoinStrategy::Split)
        }
    }

    pub fn strategy(&self) -> JoinStrategy {
        self.strategy
    }

    pub fn build(&self, spec: &FilterSpec) -> Statement {
        let (where_sql, mut params) = where_clause(spec);
        let sql = format!(
            "{} {} ORDER BY nc.company_name ASC, nc.new_company_id ASC LIMIT ? OFFSET ?",
            self.select_from(),
            where_sql
        );
        params.push(Value::Integer(spec.page_size as i64));
        params.push(Value::Integer(spec.offset()));
        Statement::new(StoreId::Portfolio, sql, params)
    }

    /// Total matching rows: same WHERE clause and parameters, no LIMIT/OFFSET.
    pub fn build_count(&self, spec: &FilterSpec) -> Statement {
        let (where_sql, params) = where_clause(spec);
        let sql = format!("SELECT COUNT(*) AS total FROM new_companies nc {}", where_sql);
        Statement::new(StoreId::Portfolio, sql, params)
    }

    pub fn build_detail(&self, id: i64) -> Statement {
        let sql = format!("{} WHERE nc.new_company_id = ?", self.select_from());
        Statement::new(StoreId::Portfolio, sql, vec![Value::Integer(id)])
    }

    pub fn build_recent(&self, limit: u32) -> Statement {
        let sql = format!(
            "{} ORDER BY nc.new_company_id DESC LIMIT ?",
            self.select_from()
        );
        Statement::new(StoreId::Portfolio, sql, vec![Value::Integer(limit as i64)])
    }

    /// Broker names for the split strategy. `None` when there is nothing to look up.
    pub fn build_broker_lookup(&self, ids: &[i64]) -> Option<Statement> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return None;
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT broker_id, broker_name FROM brokers WHERE broker_id IN ({}) \
             ORDER BY broker_name ASC, broker_id ASC",
            placeholders
        );
        let params = ids.into_iter().map(Value::Integer).collect();
        Some(Statement::new(StoreId::Foundation, sql, params))
    }

    /// Brokers referenced by at least one candidate, in one cross-store statement.
    pub fn build_broker_options(&self) -> Statement {
        Statement::new(
            StoreId::Portfolio,
            "SELECT DISTINCT b.broker_id, b.broker_name FROM foundation.brokers b \
             INNER JOIN new_companies nc ON b.broker_id = nc.broker_id \
             ORDER BY b.broker_name ASC, b.broker_id ASC"
                .to_string(),
            Vec::new(),
        )
    }

    /// Broker ids in use, the first half of the split broker-options lookup.
    pub fn build_used_broker_ids(&self) -> Statement {
        Statement::new(
            StoreId::Portfolio,
            "SELECT DISTINCT broker_id FROM new_companies WHERE broker_id IS NOT NULL ORDER BY broker_id"
                .to_string(),
            Vec::new(),
        )
    }

    pub fn build_country_options(&self) -> Statement {
        Statement::new(
            StoreId::Portfolio,
            "SELECT DISTINCT TRIM(country_name) AS country_name FROM new_companies \
             WHERE country_name IS NOT NULL AND TRIM(country_name) <> '' ORDER BY 1"
                .to_string(),
            Vec::new(),
        )
    }

    pub fn build_status_probe(&self, id: i64) -> Statement {
        Statement::new(
            StoreId::Portfolio,
            "SELECT new_company_id, new_companies_status_id FROM new_companies WHERE new_company_id = ?"
                .to_string(),
            vec![Value::Integer(id)],
        )
    }

    pub fn build_status_update(&self, id: i64, status: Status) -> Statement {
        let fk = status.foreign_key().map(Value::Integer).unwrap_or(Value::Null);
        Statement::new(
            StoreId::Portfolio,
            "UPDATE new_companies SET new_companies_status_id = ? WHERE new_company_id = ?".to_string(),
            vec![fk, Value::Integer(id)],
        )
    }

    fn select_from(&self) -> String {
        match self.strategy {
            JoinStrategy::CrossStore => format!(
                "SELECT {}, b.broker_name FROM new_companies nc {} \
                 LEFT JOIN foundation.brokers b ON nc.broker_id = b.broker_id",
                CANDIDATE_COLUMNS, STATUS_JOIN
            ),
            JoinStrategy::Split => format!(
                "SELECT {}, NULL AS broker_name FROM new_companies nc {}",
                CANDIDATE_COLUMNS, STATUS_JOIN
            ),
        }
    }
}

/// `WHERE 1=1` plus one `AND` per constrained dimension.
fn where_clause(spec: &FilterSpec) -> (String, Vec<Value>) {
    let mut sql = String::from("WHERE 1=1");
    let mut params = Vec::new();

    if let Some(status) = spec.status.status() {
        match status.foreign_key() {
            None => sql.push_str(" AND nc.new_companies_status_id IS NULL"),
            // Lookup ids are fixed constants, never caller input.
            Some(fk) => sql.push_str(&format!(" AND nc.new_companies_status_id = {}", fk)),
        }
    }

    if let Some(broker_id) = spec.broker_id {
        sql.push_str(" AND nc.broker_id = ?");
        params.push(Value::Integer(broker_id));
    }

    if let Some(country) = &spec.country {
        sql.push_str(" AND TRIM(nc.country_name) = ?");
        params.push(Value::Text(country.clone()));
    }

    if let Some(term) = &spec.search {
        sql.push_str(
            " AND (casefold(nc.company_name) LIKE ? ESCAPE '\\' \
             OR casefold(nc.country_name) LIKE ? ESCAPE '\\' \
             OR casefold(nc.comments) LIKE ? ESCAPE '\\')",
        );
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        for _ in 0..3 {
            params.push(Value::Text(pattern.clone()));
        }
    }

    (sql, params)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
