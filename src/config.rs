use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::services::payments::EvidencePolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_EVIDENCE_MAX_BYTES: u64 = 5 * 1024 * 1024;
// Shared key for the admin surface in development; real deployments override
// it from the environment and put a proper identity layer in front.
const DEV_DEFAULT_ADMIN_KEY: &str = "storefront-dev-admin-key";

/// Application configuration structure
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Runtime environment name (development, test, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Log SQL statements at debug level
    #[serde(default)]
    pub log_sql: bool,

    /// Run pending migrations on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub db_min_connections: u32,

    /// Shared key expected in the `x-admin-key` header on admin routes
    #[serde(default = "default_admin_key")]
    pub admin_api_key: String,

    /// Maximum accepted payment-evidence size in bytes
    #[serde(default = "default_evidence_max_bytes")]
    pub evidence_max_bytes: u64,

    /// Accepted payment-evidence content types
    #[serde(default = "default_evidence_types")]
    pub evidence_allowed_types: Vec<String>,

    /// Origins allowed by the CORS layer; empty means any
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_database_url() -> String {
    "sqlite://storefront.db?mode=rwc".to_string()
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_admin_key() -> String {
    DEV_DEFAULT_ADMIN_KEY.to_string()
}
fn default_evidence_max_bytes() -> u64 {
    DEFAULT_EVIDENCE_MAX_BYTES
}
fn default_evidence_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/webp".to_string(),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            log_sql: false,
            auto_migrate: true,
            db_max_connections: default_max_connections(),
            db_min_connections: default_min_connections(),
            admin_api_key: default_admin_key(),
            evidence_max_bytes: default_evidence_max_bytes(),
            evidence_allowed_types: default_evidence_types(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Evidence size/type contract handed to the payment handler.
    pub fn evidence_policy(&self) -> EvidencePolicy {
        EvidencePolicy {
            max_bytes: self.evidence_max_bytes,
            allowed_content_types: self.evidence_allowed_types.clone(),
        }
    }
}

/// Loads configuration from `config/default`, an environment-specific file,
/// and `STOREFRONT_*` environment variables, in that precedence order.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = std::env::var("STOREFRONT_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("STOREFRONT").separator("__"))
        .build()?
        .try_deserialize()
}

/// Initializes the tracing subscriber. RUST_LOG takes precedence over the
/// configured level; calling twice (tests) is a no-op.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_out_of_the_box() {
        let cfg = AppConfig::default();
        assert!(cfg.auto_migrate);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.evidence_policy().max_bytes, DEFAULT_EVIDENCE_MAX_BYTES);
        assert!(!cfg.evidence_policy().allowed_content_types.is_empty());
    }
}
