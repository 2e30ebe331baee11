use thiserror::Error;

use crate::registry::StoreId;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Pool for the store could not hand out a connection within the acquire timeout.
    #[error("could not acquire a connection to store '{store}': {source}")]
    Connection {
        store: StoreId,
        #[source]
        source: r2d2::Error,
    },

    /// Registry was shut down; no pool is available.
    #[error("store '{store}' is closed")]
    Closed { store: StoreId },

    /// Driver-level failure on a statement (syntax, constraint, decoding).
    #[error("query against store '{store}' failed: {source}")]
    Query {
        store: StoreId,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub fn query(store: StoreId, source: rusqlite::Error) -> Self {
        Self::Query { store, source }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Closed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for '{field}': {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A store failed. The driver message is logged, never carried here.
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    #[error("Company {0} not found")]
    NotFound(i64),

    #[error("Invalid action '{0}', expected 'approve' or 'reject'")]
    InvalidAction(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidAction(_) => 400,
            Self::NotFound(_) => 404,
            Self::ServiceUnavailable => 503,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        if err.is_connection() {
            tracing::error!(error = %err, "store unreachable");
        } else {
            tracing::error!(error = %err, "store query failed");
        }
        Self::ServiceUnavailable
    }
}
