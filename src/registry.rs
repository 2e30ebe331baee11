//! Connection registry: one pooled SQLite handle set per logical store.
//!
//! Portfolio connections can ATTACH the foundation and marketdata files under
//! their logical names so a single statement may reference `foundation.brokers`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, params_from_iter};
use rusqlite::types::{FromSql, FromSqlError, Value, ValueRef};

use crate::config::RegistryConfig;
use crate::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreId {
    Foundation,
    Portfolio,
    Marketdata,
}

impl StoreId {
    pub const ALL: [StoreId; 3] = [StoreId::Foundation, StoreId::Portfolio, StoreId::Marketdata];

    /// Schema name the store is attached under on portfolio connections.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Foundation => "foundation",
            StoreId::Portfolio => "portfolio",
            StoreId::Marketdata => "marketdata",
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|idx| &self.values[idx])
    }

    /// Decode a column the way `rusqlite::Row::get` does.
    pub fn get<T: FromSql>(&self, column: &str) -> rusqlite::Result<T> {
        let idx = self
            .index_of(column)
            .ok_or_else(|| rusqlite::Error::InvalidColumnName(column.to_string()))?;
        let value = ValueRef::from(&self.values[idx]);
        T::column_result(value).map_err(|err| match err {
            FromSqlError::InvalidType => {
                rusqlite::Error::InvalidColumnType(idx, column.to_string(), value.data_type())
            }
            FromSqlError::OutOfRange(i) => rusqlite::Error::IntegralValueOutOfRange(idx, i),
            other => rusqlite::Error::FromSqlConversionFailure(idx, value.data_type(), Box::new(other)),
        })
    }

    fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

type SqlitePool = Pool<SqliteConnectionManager>;

/// Busy timeout plus `casefold(text)`, a Unicode lowercase. SQLite's own
/// `LIKE` and `LOWER` only fold ASCII, so "Ørsted" would miss "ørsted".
fn prepare_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Process-wide registry, built once at startup and shared behind an `Arc`.
pub struct StoreRegistry {
    pools: RwLock<HashMap<StoreId, SqlitePool>>,
    cross_store_joins: bool,
}

impl StoreRegistry {
    /// Build one pool per store. Connections are opened lazily on first use.
    pub fn init(config: &RegistryConfig) -> Result<Self, StoreError> {
        let mut pools = HashMap::new();
        for store in StoreId::ALL {
            let manager = Self::manager_for(config, store);
            let pool = Pool::builder()
                .max_size(config.max_connections)
                .min_idle(Some(0))
                .connection_timeout(config.acquire_timeout)
                .build_unchecked(manager);
            tracing::debug!(
                store = %store,
                path = %config.store_path(store).display(),
                max_connections = config.max_connections,
                "store pool created"
            );
            pools.insert(store, pool);
        }
        Ok(Self {
            pools: RwLock::new(pools),
            cross_store_joins: config.cross_store_joins,
        })
    }

    fn manager_for(config: &RegistryConfig, store: StoreId) -> SqliteConnectionManager {
        let manager = SqliteConnectionManager::file(config.store_path(store));
        if store == StoreId::Portfolio && config.cross_store_joins {
            let attachments: Vec<(StoreId, String)> = [StoreId::Foundation, StoreId::Marketdata]
                .into_iter()
                .map(|other| (other, config.store_path(other).to_string_lossy().into_owned()))
                .collect();
            manager.with_init(move |conn| {
                prepare_connection(conn)?;
                for (other, path) in &attachments {
                    conn.execute(&format!("ATTACH DATABASE ?1 AS {}", other.as_str()), [path])?;
                }
                Ok(())
            })
        } else {
            manager.with_init(|conn| prepare_connection(conn))
        }
    }

    /// Whether statements on the portfolio store may reference the other stores by name.
    pub fn supports_cross_store(&self) -> bool {
        self.cross_store_joins
    }

    fn acquire(&self, store: StoreId) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        let pool = {
            let pools = self.pools.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            pools.get(&store).cloned().ok_or(StoreError::Closed { store })?
        };
        pool.get().map_err(|source| StoreError::Connection { store, source })
    }

    pub fn execute(&self, store: StoreId, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        tracing::debug!(store = %store, params = params.len(), sql, "execute");
        let conn = self.acquire(store)?;
        let mut stmt = conn.prepare(sql).map_err(|e| StoreError::query(store, e))?;
        let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| StoreError::query(store, e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| StoreError::query(store, e))? {
            let values = (0..columns.len())
                .map(|idx| row.get::<_, Value>(idx))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| StoreError::query(store, e))?;
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    pub fn execute_write(&self, store: StoreId, sql: &str, params: &[Value]) -> Result<usize, StoreError> {
        tracing::debug!(store = %store, params = params.len(), sql, "execute_write");
        let conn = self.acquire(store)?;
        conn.execute(sql, params_from_iter(params.iter()))
            .map_err(|e| StoreError::query(store, e))
    }

    pub fn execute_batch(&self, store: StoreId, sql: &str) -> Result<(), StoreError> {
        let conn = self.acquire(store)?;
        conn.execute_batch(sql).map_err(|e| StoreError::query(store, e))
    }

    /// Drop every pool. Later calls fail with `StoreError::Closed`.
    pub fn shutdown(&self) {
        let mut pools = self.pools.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let closed = pools.len();
        pools.clear();
        tracing::info!(closed, "store registry shut down");
    }
}
