//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the catalog:
//! - Logging and tracing infrastructure
//! - Configuration management
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other crates depend on. It
//! establishes the configuration and logging conventions used throughout the
//! workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CatalogConfig, CatalogConfigBuilder, DatabaseLocation};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
