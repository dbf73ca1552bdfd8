//! Database Connection Pool
//!
//! Connection pooling for SQLite with configurable limits, WAL journaling,
//! and environment-driven construction. One pool is shared process-wide;
//! every job store mutation borrows a connection for one short-lived
//! transaction.

use sqlx::{pool::PoolOptions, sqlite::SqliteConnectOptions, Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// Database connection string
    pub database_url: String,
    /// Maximum number of connections in pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of connections to maintain (default: 2)
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 30)
    pub connection_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:darkroom.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 2,
            connection_timeout_secs: 30,
        }
    }
}

impl ConnectionPoolConfig {
    /// Creates a new connection pool configuration
    pub fn new(database_url: String) -> Self {
        Self {
            database_url,
            ..Default::default()
        }
    }

    /// Sets maximum pool size
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Sets minimum pool size
    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets connection acquire timeout
    pub fn with_connection_timeout(mut self, timeout_secs: u64) -> Self {
        self.connection_timeout_secs = timeout_secs;
        self
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.max_connections < self.min_connections {
            return Err(format!(
                "Max connections ({}) must be >= min connections ({})",
                self.max_connections, self.min_connections
            ));
        }
        Ok(())
    }
}

/// Database connection pool
pub struct ConnectionPool {
    pool: Pool<Sqlite>,
}

impl ConnectionPool {
    /// Creates a new connection pool
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the database
    /// connection fails.
    pub async fn create(config: ConnectionPoolConfig) -> Result<Self, String> {
        config.validate()?;

        info!(
            "Creating connection pool: max={}, min={}, timeout={}s",
            config.max_connections, config.min_connections, config.connection_timeout_secs
        );

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| format!("Invalid database URL: {}", e))?
            .create_if_missing(true)
            // WAL keeps readers unblocked while workers write batch rows
            .pragma("journal_mode", "WAL")
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "MEMORY")
            .pragma("foreign_keys", "ON")
            // Batch claims contend on the same table; wait instead of failing
            .pragma("busy_timeout", "5000");

        let pool = PoolOptions::<Sqlite>::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| format!("Failed to create connection pool: {}", e))?;

        info!("Connection pool created successfully");
        Ok(Self { pool })
    }

    /// Creates connection pool from environment variables
    ///
    /// # Environment Variables
    /// - `DATABASE_URL`: Database connection string (default: sqlite:darkroom.db?mode=rwc)
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 2)
    /// - `DB_CONNECTION_TIMEOUT`: Acquire timeout in seconds (default: 30)
    pub async fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:darkroom.db?mode=rwc".to_string());

        let mut config = ConnectionPoolConfig::new(database_url);

        if let Ok(max) = std::env::var("DB_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<u32>() {
                config = config.with_max_connections(val);
            }
        }
        if let Ok(min) = std::env::var("DB_MIN_CONNECTIONS") {
            if let Ok(val) = min.parse::<u32>() {
                config = config.with_min_connections(val);
            }
        }
        if let Ok(timeout) = std::env::var("DB_CONNECTION_TIMEOUT") {
            if let Ok(val) = timeout.parse::<u64>() {
                config = config.with_connection_timeout(val);
            }
        }

        Self::create(config).await
    }

    /// Gets the underlying SQLx pool
    pub fn inner(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Closes the connection pool
    pub async fn close(self) {
        info!("Closing connection pool");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConnectionPoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connection_timeout_secs, 30);
    }

    #[test]
    fn test_config_builder() {
        let config = ConnectionPoolConfig::new("sqlite::memory:".to_string())
            .with_max_connections(20)
            .with_min_connections(5)
            .with_connection_timeout(60);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.connection_timeout_secs, 60);
    }

    #[test]
    fn test_config_validate() {
        assert!(ConnectionPoolConfig::new("sqlite::memory:".to_string())
            .validate()
            .is_ok());
        assert!(ConnectionPoolConfig::new("".to_string()).validate().is_err());
        assert!(ConnectionPoolConfig::new("sqlite::memory:".to_string())
            .with_max_connections(2)
            .with_min_connections(5)
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_create_in_memory_pool() {
        let pool = ConnectionPool::create(ConnectionPoolConfig::new(
            "sqlite::memory:".to_string(),
        ))
        .await
        .unwrap();
        let row: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
