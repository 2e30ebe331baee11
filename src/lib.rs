pub mod actions;
pub mod api;
pub mod composer;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod listing;
pub mod models;
pub mod registry;
pub mod schema;

pub use config::RegistryConfig;
pub use error::{ServiceError, StoreError, ValidationError};
pub use registry::{StoreId, StoreRegistry};
