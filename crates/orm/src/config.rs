//! Database, pool and migration configuration
//!
//! Values come from code or from the environment:
//!
//! | variable                   | default | meaning                               |
//! |----------------------------|---------|---------------------------------------|
//! | `DATABASE_URL`             | -       | backend URL, required                 |
//! | `DATABASE_MAX_CONNECTIONS` | `10`    | pool size                             |
//! | `DATABASE_ACQUIRE_TIMEOUT` | `30`    | seconds to wait for a connection, `0` waits forever |

use std::env;
use std::time::Duration;

use crate::connection::DatabaseId;
use crate::error::{ModelError, ModelResult};

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: usize,
    /// How long `request_connection` waits before failing; `None` waits forever
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfig {
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.max_connections == 0 {
            return Err(ModelError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.acquire_timeout == Some(Duration::ZERO) {
            return Err(ModelError::Configuration(
                "acquire_timeout must be positive; use None to wait forever".to_string(),
            ));
        }
        Ok(())
    }

    /// Read pool settings from the environment, falling back to defaults
    pub fn from_env() -> ModelResult<Self> {
        let defaults = Self::default();

        let max_connections = match env_optional("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse_env::<usize>("DATABASE_MAX_CONNECTIONS", &raw)?,
            None => defaults.max_connections,
        };

        let acquire_timeout = match env_optional("DATABASE_ACQUIRE_TIMEOUT") {
            Some(raw) => match parse_env::<u64>("DATABASE_ACQUIRE_TIMEOUT", &raw)? {
                0 => None,
                seconds => Some(Duration::from_secs(seconds)),
            },
            None => defaults.acquire_timeout,
        };

        let config = Self {
            max_connections,
            acquire_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

/// One logical database: identifier, backend URL and pool settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub id: DatabaseId,
    pub url: String,
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    pub fn new(id: impl Into<DatabaseId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            pool: PoolConfig::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn from_env(id: impl Into<DatabaseId>) -> ModelResult<Self> {
        let url = env::var("DATABASE_URL").map_err(|_| {
            ModelError::Configuration("Missing required environment variable: DATABASE_URL".to_string())
        })?;

        let config = Self {
            id: id.into(),
            url,
            pool: PoolConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.url.is_empty() {
            return Err(ModelError::Configuration(format!(
                "Database '{}' has an empty URL",
                self.id
            )));
        }
        self.pool.validate()
    }
}

/// Where the migrator keeps its log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Entity holding one record per applied migration
    pub table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            table: "quarry_migrations".to_string(),
        }
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> ModelResult<T> {
    raw.trim().parse().map_err(|_| {
        ModelError::Configuration(format!("Invalid value for {}: '{}'", key, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clean_env() {
        env::remove_var("DATABASE_URL");
        env::remove_var("DATABASE_MAX_CONNECTIONS");
        env::remove_var("DATABASE_ACQUIRE_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_database_config_from_env() {
        clean_env();
        env::set_var("DATABASE_URL", "postgresql://localhost/app");
        env::set_var("DATABASE_MAX_CONNECTIONS", "4");
        env::set_var("DATABASE_ACQUIRE_TIMEOUT", "0");

        let config = DatabaseConfig::from_env("main").unwrap();
        assert_eq!(config.id, DatabaseId::new("main"));
        assert_eq!(config.url, "postgresql://localhost/app");
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.acquire_timeout, None);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_defaults_apply_when_unset() {
        clean_env();
        env::set_var("DATABASE_URL", "postgresql://localhost/app");

        let config = DatabaseConfig::from_env("main").unwrap();
        assert_eq!(config.pool, PoolConfig::default());

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_url_and_invalid_numbers() {
        clean_env();
        assert!(matches!(
            DatabaseConfig::from_env("main"),
            Err(ModelError::Configuration(_))
        ));

        env::set_var("DATABASE_URL", "postgresql://localhost/app");
        env::set_var("DATABASE_MAX_CONNECTIONS", "lots");
        let err = DatabaseConfig::from_env("main").unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));

        env::set_var("DATABASE_MAX_CONNECTIONS", "0");
        assert!(DatabaseConfig::from_env("main").is_err());

        clean_env();
    }

    #[test]
    fn test_migration_table_default() {
        assert_eq!(MigrationConfig::default().table, "quarry_migrations");
    }
}
