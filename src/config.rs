use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::registry::StoreId;

pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
#[error("invalid configuration value for {key}: '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub data_dir: PathBuf,
    pub foundation_file: String,
    pub portfolio_file: String,
    pub marketdata_file: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Attach foundation/marketdata to portfolio connections so one statement can join across them.
    pub cross_store_joins: bool,
}

impl RegistryConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            foundation_file: "psw_foundation.db".to_string(),
            portfolio_file: "psw_portfolio.db".to_string(),
            marketdata_file: "psw_marketdata.db".to_string(),
            max_connections: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            cross_store_joins: true,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("PSW_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_data_dir);
        let mut config = Self::new(data_dir);

        if let Some(name) = lookup("PSW_DB_FOUNDATION") {
            config.foundation_file = name;
        }
        if let Some(name) = lookup("PSW_DB_PORTFOLIO") {
            config.portfolio_file = name;
        }
        if let Some(name) = lookup("PSW_DB_MARKETDATA") {
            config.marketdata_file = name;
        }
        if let Some(raw) = lookup("PSW_DB_POOL_SIZE") {
            config.max_connections = match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError { key: "PSW_DB_POOL_SIZE", value: raw }),
            };
        }
        if let Some(raw) = lookup("PSW_DB_ACQUIRE_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError {
                key: "PSW_DB_ACQUIRE_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("PSW_CROSS_STORE_JOINS") {
            config.cross_store_joins = parse_bool(&raw).ok_or(ConfigError {
                key: "PSW_CROSS_STORE_JOINS",
                value: raw,
            })?;
        }
        Ok(config)
    }

    pub fn store_path(&self, store: StoreId) -> PathBuf {
        let file = match store {
            StoreId::Foundation => &self.foundation_file,
            StoreId::Portfolio => &self.portfolio_file,
            StoreId::Marketdata => &self.marketdata_file,
        };
        self.data_dir.join(file)
    }

    fn default_data_dir() -> PathBuf {
        // XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "psw") {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
