use crate::error::StoreError;
use crate::registry::{StoreId, StoreRegistry};

const FOUNDATION_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS brokers (
        broker_id INTEGER PRIMARY KEY,
        broker_name TEXT NOT NULL
    );
"#;

const PORTFOLIO_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS new_companies_status (
        id INTEGER PRIMARY KEY,
        status TEXT NOT NULL
    );

    INSERT OR IGNORE INTO new_companies_status (id, status) VALUES
        (1, 'Approved'),
        (2, 'Blocked'),
        (3, 'Rejected');

    CREATE TABLE IF NOT EXISTS new_companies (
        new_company_id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_name TEXT NOT NULL,
        ticker TEXT,
        country_name TEXT,
        yield REAL CHECK (yield IS NULL OR yield >= 0),
        comments TEXT,
        broker_id INTEGER,
        new_companies_status_id INTEGER REFERENCES new_companies_status(id),
        created TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX IF NOT EXISTS idx_new_companies_status ON new_companies(new_companies_status_id);
    CREATE INDEX IF NOT EXISTS idx_new_companies_broker ON new_companies(broker_id);
    CREATE INDEX IF NOT EXISTS idx_new_companies_name ON new_companies(company_name);
"#;

pub fn bootstrap(registry: &StoreRegistry) -> Result<(), StoreError> {
    registry.execute_batch(StoreId::Foundation, FOUNDATION_SCHEMA)?;
    registry.execute_batch(StoreId::Portfolio, PORTFOLIO_SCHEMA)?;
    // marketdata has no tables of its own yet; touching it verifies the pool.
    registry.execute(StoreId::Marketdata, "SELECT 1", &[])?;
    tracing::info!("stores bootstrapped");
    Ok(())
}

pub fn is_initialized(registry: &StoreRegistry) -> Result<bool, StoreError> {
    let rows = registry.execute(
        StoreId::Portfolio,
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = 'new_companies'",
        &[],
    )?;
    let count = match rows.first() {
        Some(row) => row
            .get::<i64>("n")
            .map_err(|e| StoreError::query(StoreId::Portfolio, e))?,
        None => 0,
    };
    Ok(count > 0)
}
