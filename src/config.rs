use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "PANTRY";
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 8;
const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_RECENT_LIMIT: u32 = 5;
const DEFAULT_EXPIRING_SOON_DAYS: i64 = 3;

/// Settings for the consumption reconciliation service
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReconciliationConfig {
    /// How many times a conditional stock write is retried after losing a race
    #[serde(default = "default_max_conflict_retries")]
    #[validate(range(min = 1, max = 50))]
    pub max_conflict_retries: u32,

    /// Page size used by history queries when the caller gives none
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1))]
    pub default_page_size: u32,

    /// Upper bound on the page size a caller may request
    #[serde(default = "default_max_page_size")]
    #[validate(range(min = 1, max = 1000))]
    pub max_page_size: u32,

    /// Number of records returned by "recent consumption" when unspecified
    #[serde(default = "default_recent_limit")]
    #[validate(range(min = 1))]
    pub recent_limit: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            recent_limit: default_recent_limit(),
        }
    }
}

/// Settings for stock-side queries
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    /// Window, in days, that counts as "expiring soon"
    #[serde(default = "default_expiring_soon_days")]
    #[validate(range(min = 0, max = 365))]
    pub expiring_soon_days: i64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            expiring_soon_days: default_expiring_soon_days(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub reconciliation: ReconciliationConfig,

    #[serde(default)]
    #[validate]
    pub inventory: InventoryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            reconciliation: ReconciliationConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.reconciliation.default_page_size > self.reconciliation.max_page_size {
            let mut err = ValidationError::new("default_page_size");
            err.message =
                Some("reconciliation.default_page_size must not exceed max_page_size".into());
            errors.add("reconciliation", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_max_conflict_retries() -> u32 {
    DEFAULT_MAX_CONFLICT_RETRIES
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_recent_limit() -> u32 {
    DEFAULT_RECENT_LIMIT
}

fn default_expiring_soon_days() -> i64 {
    DEFAULT_EXPIRING_SOON_DAYS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("pantry_ledger={},pantry_cli={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .with_writer(std::io::stderr)
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Loads application configuration from the default `config/` directory.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (`{dir}/default.toml`)
/// 3. Environment-specific config (`{dir}/{env}.toml`)
/// 4. Environment variables (`PANTRY__*`)
pub fn load_config_from(dir: impl AsRef<Path>) -> Result<AppConfig, AppConfigError> {
    let dir = dir.as_ref();
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.clone())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_default(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.toml"), content).unwrap();
        dir
    }

    #[test]
    fn defaults_apply_without_config_files() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(dir.path().join("missing")).unwrap();
        assert_eq!(cfg.log_level(), "info");
        assert_eq!(cfg.reconciliation.max_conflict_retries, 8);
        assert_eq!(cfg.reconciliation.default_page_size, 10);
        assert_eq!(cfg.reconciliation.recent_limit, 5);
        assert_eq!(cfg.inventory.expiring_soon_days, 3);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = write_default(
            r#"
            log_level = "debug"
            log_json = true

            [reconciliation]
            max_conflict_retries = 3
            default_page_size = 25

            [inventory]
            expiring_soon_days = 7
            "#,
        );
        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.log_level(), "debug");
        assert!(cfg.log_json);
        assert_eq!(cfg.reconciliation.max_conflict_retries, 3);
        assert_eq!(cfg.reconciliation.default_page_size, 25);
        assert_eq!(cfg.reconciliation.max_page_size, 100);
        assert_eq!(cfg.inventory.expiring_soon_days, 7);
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let dir = write_default(r#"log_level = "loud""#);
        let err = load_config_from(dir.path()).unwrap_err();
        assert!(matches!(err, AppConfigError::Validation(_)));
    }

    #[test]
    fn page_size_above_maximum_is_rejected() {
        let dir = write_default(
            r#"
            [reconciliation]
            default_page_size = 50
            max_page_size = 20
            "#,
        );
        let err = load_config_from(dir.path()).unwrap_err();
        assert!(matches!(err, AppConfigError::Validation(_)));
    }

    #[test]
    fn zero_retries_fail_validation() {
        let mut cfg = AppConfig::default();
        cfg.reconciliation.max_conflict_retries = 0;
        assert!(cfg.validate().is_err());
    }
}
