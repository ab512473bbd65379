//! # Catalog Configuration Module
//!
//! Provides configuration management for the catalog service.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `CatalogConfig`. It enforces fail-fast validation so that a bad setting is
//! reported with its name before any database is opened.
//!
//! ## Usage
//!
//! ### File-backed catalog
//!
//! ```
//! use core_runtime::config::CatalogConfig;
//! use std::time::Duration;
//!
//! let config = CatalogConfig::builder()
//!     .database_path("/var/lib/catalog/catalog.db")
//!     .max_connections(8)
//!     .loan_period(Duration::from_secs(14 * 24 * 60 * 60))
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.max_connections, 8);
//! ```
//!
//! ### In-memory catalog for tests
//!
//! ```
//! use core_runtime::config::{CatalogConfig, DatabaseLocation};
//!
//! let config = CatalogConfig::builder().in_memory().build().unwrap();
//! assert_eq!(config.database, DatabaseLocation::InMemory);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CatalogConfig;
//!
//! // No database location given
//! let config = CatalogConfig::builder()
//!     .build()
//!     .expect("Should fail - missing database path");
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of pooled connections for a file database.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Upper bound accepted for `max_connections`.
pub const MAX_CONNECTIONS_LIMIT: u32 = 64;

/// Default time to wait for a pooled connection.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound accepted for `reservation_hold` and `loan_period` (ten years).
pub const MAX_LENDING_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Default period of the expiration sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Where the catalog lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite database file, created if missing
    File(PathBuf),
    /// Private in-memory database, gone when the service drops
    InMemory,
}

/// Catalog configuration.
///
/// Use [`CatalogConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Database file or in-memory store
    pub database: DatabaseLocation,

    /// Maximum pooled connections (ignored for in-memory databases)
    pub max_connections: u32,

    /// Time to wait for a pooled connection
    pub acquire_timeout: Duration,

    /// How long a reservation holds a copy; `None` keeps the engine default
    pub reservation_hold: Option<Duration>,

    /// How long a copy may stay borrowed; `None` keeps the engine default
    pub loan_period: Option<Duration>,

    /// Period of the expiration sweep schedule
    pub sweep_interval: Duration,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl CatalogConfig {
    /// Creates a new builder for constructing a `CatalogConfig`.
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Connection count is within 1..=64
    /// - Every duration is greater than zero
    /// - Lending durations stay within [`MAX_LENDING_DURATION`]
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.max_connections == 0 || self.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(Error::Config(format!(
                "max_connections must be between 1 and {} (got {})",
                MAX_CONNECTIONS_LIMIT, self.max_connections
            )));
        }

        ensure_positive("acquire_timeout", self.acquire_timeout)?;
        ensure_positive("sweep_interval", self.sweep_interval)?;
        if let Some(hold) = self.reservation_hold {
            ensure_lending_duration("reservation_hold", hold)?;
        }
        if let Some(period) = self.loan_period {
            ensure_lending_duration("loan_period", period)?;
        }

        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == DatabaseLocation::InMemory
    }
}

fn ensure_positive(setting: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::Config(format!(
            "{} must be greater than zero",
            setting
        )));
    }
    Ok(())
}

fn ensure_lending_duration(setting: &str, value: Duration) -> Result<()> {
    ensure_positive(setting, value)?;
    if value > MAX_LENDING_DURATION {
        return Err(Error::Config(format!(
            "{} must not exceed {} days",
            setting,
            MAX_LENDING_DURATION.as_secs() / 86_400
        )));
    }
    Ok(())
}

/// Builder for [`CatalogConfig`].
#[derive(Debug, Default)]
pub struct CatalogConfigBuilder {
    database: Option<DatabaseLocation>,
    max_connections: Option<u32>,
    acquire_timeout: Option<Duration>,
    reservation_hold: Option<Duration>,
    loan_period: Option<Duration>,
    sweep_interval: Option<Duration>,
    logging: Option<LoggingConfig>,
}

impl CatalogConfigBuilder {
    /// Sets the SQLite database file.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CatalogConfig;
    ///
    /// let builder = CatalogConfig::builder()
    ///     .database_path("/path/to/catalog.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Uses a private in-memory database instead of a file.
    pub fn in_memory(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    /// Sets the maximum number of pooled connections.
    ///
    /// Default: 5
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets how long to wait for a pooled connection.
    ///
    /// Default: 30 seconds
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Overrides how long a reservation holds a copy.
    pub fn reservation_hold(mut self, hold: Duration) -> Self {
        self.reservation_hold = Some(hold);
        self
    }

    /// Overrides how long a copy may stay borrowed.
    pub fn loan_period(mut self, period: Duration) -> Self {
        self.loan_period = Some(period);
        self
    }

    /// Sets the period of the expiration sweep.
    ///
    /// Default: 24 hours
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the configuration, validating every setting.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the missing or invalid setting.
    pub fn build(self) -> Result<CatalogConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory() to set it."
                    .to_string(),
            )
        })?;

        let config = CatalogConfig {
            database,
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: self.acquire_timeout.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT),
            reservation_hold: self.reservation_hold,
            loan_period: self.loan_period,
            sweep_interval: self.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL),
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
