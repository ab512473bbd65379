//! # Catalog Module
//!
//! Owns the catalog database and the rules that govern it.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Repository patterns for books and authors
//! - Copy identity and copy numbering for duplicate physical copies
//! - The lending state machine (reserve, borrow, return, cancel)
//! - Catalog search with filtering, sorting, and pagination
//! - The expiration sweep for overdue copies

pub mod clock;
pub mod db;
pub mod error;
pub mod identity;
pub mod lending;
pub mod models;
pub mod query;
pub mod repositories;
pub mod sort;
pub mod sweep;
pub mod views;

pub use clock::{Clock, FixedClock, SystemClock};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{CatalogError, Result, ValidationErrors};
pub use identity::{Candidate, CopyLookup, IdentityCheck, IdentityResolver};
pub use lending::{LendingAction, LendingPolicy, LendingService, TransitionOutcome};
pub use models::{Author, Book, BookChanges, BookDetails, LendingStatus, NewBook};
pub use query::{CatalogQuery, FilterParams, SearchParams};
pub use sort::{SortDirection, SortField, SortSpec};
pub use sweep::{ExpirationSweep, SweepReport};
pub use views::{BookView, ErrorBody, ErrorResponse, SearchResponse};
