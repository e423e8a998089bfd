// ⚙️ Configuration - environment variables with defaults
//
//   CASE_TRACKER_DB           SQLite file           (default: cases.db)
//   CASE_TRACKER_ADDR         server bind address   (default: 0.0.0.0:3000)
//   CASE_TRACKER_ADMIN_TOKEN  bearer token for exports (unset: nobody may export)
//   CASE_TRACKER_LOG          tracing filter        (default: info, RUST_LOG wins)

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_DB_PATH: &str = "cases.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub admin_token: Option<String>,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            admin_token: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (blank values count as unset)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = AppConfig::default();

        AppConfig {
            database_path: get("CASE_TRACKER_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            bind_addr: get("CASE_TRACKER_ADDR").unwrap_or(defaults.bind_addr),
            admin_token: get("CASE_TRACKER_ADMIN_TOKEN"),
            log_filter: get("CASE_TRACKER_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Install the global tracing subscriber (no-op if one is already set)
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_filter));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}
