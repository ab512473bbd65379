//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations for catalog data.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Pagination is supported via the `Page<T>` wrapper
//!
//! ## Available Repositories
//!
//! - `BookRepository` - Physical copies, their author links and lending columns
//! - `AuthorRepository` - Authors

pub mod author;
pub mod book;
pub mod pagination;

pub use author::{AuthorRepository, SqliteAuthorRepository};
pub use book::{BookRepository, SqliteBookRepository};
pub use pagination::{Page, PageMeta, PageRequest};
