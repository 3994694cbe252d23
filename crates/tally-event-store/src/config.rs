//! Connection settings for the PostgreSQL record store.

use std::fmt;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

const DATABASE_URL: &str = "DATABASE_URL";
const MAX_CONNECTIONS: &str = "TALLY_DB_MAX_CONNECTIONS";
const ACQUIRE_TIMEOUT_SECS: &str = "TALLY_DB_ACQUIRE_TIMEOUT_SECS";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Errors raised while configuring or connecting the store.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// A setting is present but cannot be parsed.
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        /// The environment variable at fault.
        name: &'static str,
        /// What the variable should hold.
        expected: &'static str,
        /// The value as found.
        value: String,
    },

    /// The pool could not connect.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Pool settings read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct EventStoreConfig {
    /// PostgreSQL connection string, from `DATABASE_URL`.
    pub database_url: String,
    /// Pool size cap, from `TALLY_DB_MAX_CONNECTIONS` (default 10).
    pub max_connections: u32,
    /// How long to wait for a free connection, from
    /// `TALLY_DB_ACQUIRE_TIMEOUT_SECS` (default 5 seconds).
    pub acquire_timeout: Duration,
}

impl EventStoreConfig {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `DATABASE_URL` is unset and
    /// `ConfigError::Invalid` if a numeric setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Same as [`EventStoreConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(DATABASE_URL)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL))?;

        let max_connections = match lookup(MAX_CONNECTIONS) {
            Some(value) => value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    name: MAX_CONNECTIONS,
                    expected: "a positive integer",
                    value,
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let acquire_timeout_secs = match lookup(ACQUIRE_TIMEOUT_SECS) {
            Some(value) => value.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: ACQUIRE_TIMEOUT_SECS,
                expected: "a whole number of seconds",
                value,
            })?,
            None => DEFAULT_ACQUIRE_TIMEOUT_SECS,
        };

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
        })
    }

    /// Opens a connection pool with these settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Database` if the pool cannot connect.
    pub async fn connect(&self) -> Result<PgPool, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await?;
        info!(max_connections = self.max_connections, "connected to event store");
        Ok(pool)
    }
}

impl fmt::Debug for EventStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStoreConfig")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Applies the `event_records` migrations to `pool`.
///
/// # Errors
///
/// Returns `ConfigError::Migrate` if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), ConfigError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
