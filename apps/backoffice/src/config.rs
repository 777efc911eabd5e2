//! Back-office configuration.
//!
//! Layers, lowest precedence first:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. serde defaults (this file)                                         │
//! │  2. TOML file: $TALLY_CONFIG, or ./backoffice.toml when present        │
//! │  3. Environment: TALLY_DATABASE_PATH, TALLY_MAX_CONNECTIONS, ...       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as Cfg, Environment, File};
use serde::{Deserialize, Serialize};
use tally_core::{QuotaPolicy, DEFAULT_FREE_QUOTA_MONTHLY};
use tally_db::DbConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TALLY_CONFIG";

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "backoffice.toml";

/// Back-office configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackofficeConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Deadline for one service operation, including its transaction
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Free membership units per calendar month
    #[serde(default = "default_free_quota_monthly")]
    pub free_quota_monthly: i64,

    /// Reconcile stock with the catalog when tally-maintain starts
    #[serde(default = "default_true")]
    pub sync_stock_on_startup: bool,

    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tally.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_operation_timeout_ms() -> u64 {
    10_000
}

fn default_free_quota_monthly() -> i64 {
    DEFAULT_FREE_QUOTA_MONTHLY
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    "info,sqlx=warn".to_string()
}

impl Default for BackofficeConfig {
    fn default() -> Self {
        BackofficeConfig {
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            operation_timeout_ms: default_operation_timeout_ms(),
            free_quota_monthly: default_free_quota_monthly(),
            sync_stock_on_startup: default_true(),
            log_filter: default_log_filter(),
        }
    }
}

impl BackofficeConfig {
    /// Loads from `$TALLY_CONFIG` (or `./backoffice.toml`) and `TALLY_*`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Loads with `path` as the file layer. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: BackofficeConfig = Cfg::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("TALLY").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "operation_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.free_quota_monthly < 0 {
            return Err(ConfigError::InvalidValue {
                key: "free_quota_monthly",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            monthly_free: self.free_quota_monthly,
        }
    }

    /// Pool settings for [`tally_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        let db = DbConfig::new(&self.database_path);
        if db.is_in_memory() {
            return DbConfig::in_memory();
        }
        db.max_connections(self.max_connections)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tally-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BackofficeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.quota_policy(), QuotaPolicy::default());
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("tally-config-does-not-exist.toml");
        let config = BackofficeConfig::load_from(&path).unwrap();
        assert_eq!(config.free_quota_monthly, DEFAULT_FREE_QUOTA_MONTHLY);
        assert!(config.sync_stock_on_startup);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = temp_file(
            r#"
            database_path = "/var/lib/tally/shop.db"
            operation_timeout_ms = 2500
            free_quota_monthly = 50
            sync_stock_on_startup = false
            "#,
        );

        let config = BackofficeConfig::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/tally/shop.db"));
        assert_eq!(config.operation_timeout_ms, 2500);
        assert_eq!(config.quota_policy().monthly_free, 50);
        assert!(!config.sync_stock_on_startup);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let path = temp_file("operation_timeout_ms = 0\n");
        let err = BackofficeConfig::load_from(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::InvalidValue { key: "operation_timeout_ms", .. }));
    }

    #[test]
    fn test_rejects_negative_quota_and_zero_pool() {
        let mut config = BackofficeConfig::default();
        config.free_quota_monthly = -1;
        assert!(config.validate().is_err());

        let mut config = BackofficeConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_passes_pool_size() {
        let mut config = BackofficeConfig::default();
        config.max_connections = 3;
        let db = config.db_config();
        assert_eq!(db.max_connections, 3);
        assert_eq!(db.database_path, PathBuf::from("tally.db"));
    }
}
