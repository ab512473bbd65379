//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service`, `core-catalog`, `core-runtime`). Host
//! applications can depend on `catalog-workspace` and enable the documented
//! features without needing to wire each crate individually.

#[cfg(any(feature = "service", feature = "catalog-only"))]
pub use core_catalog as catalog;

#[cfg(feature = "service")]
pub use core_runtime as runtime;

#[cfg(feature = "service")]
pub use core_service as service;
