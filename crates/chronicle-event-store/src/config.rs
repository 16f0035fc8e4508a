//! Event store configuration, read from the environment.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::pg_event_log::PgEventLog;
use crate::schema::{DEFAULT_EVENTS_TABLE, validate_table_name};

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Startup errors of the event store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connection settings of the PostgreSQL event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStoreConfig {
    /// Connection URL.
    pub database_url: String,
    /// Name of the events table.
    pub events_table: String,
    /// Size of the connection pool.
    pub max_connections: u32,
}

impl EventStoreConfig {
    /// Reads the configuration from the process environment.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `DATABASE_URL` | required |
    /// | `CHRONICLE_EVENTS_TABLE` | `events` |
    /// | `CHRONICLE_MAX_CONNECTIONS` | `10` |
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Config` if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Config` if a variable is missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::Config("DATABASE_URL environment variable must be set".into()))?;
        let events_table = lookup("CHRONICLE_EVENTS_TABLE").unwrap_or_else(|| DEFAULT_EVENTS_TABLE.to_string());
        validate_table_name(&events_table).map_err(|e| ConfigError::Config(e.to_string()))?;
        let max_connections = match lookup("CHRONICLE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::Config(format!("CHRONICLE_MAX_CONNECTIONS must be a valid u32: {e}")))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            database_url,
            events_table,
            max_connections,
        })
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Database` if the database is unreachable.
    pub async fn connect(&self) -> Result<PgPool, ConfigError> {
        Ok(PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?)
    }

    /// Opens a connection pool and returns the event log over the configured
    /// table.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Database` if the database is unreachable.
    pub async fn event_log(&self) -> Result<PgEventLog, ConfigError> {
        let pool = self.connect().await?;
        PgEventLog::with_table(pool, &self.events_table).map_err(|e| ConfigError::Config(e.to_string()))
    }
}
