//! Domain models for the library catalog
//!
//! This module contains the catalog entities with validation and database mapping.

use crate::error::{CatalogError, ValidationErrors};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Storage format for `published_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Lending Status
// =============================================================================

/// Lending state of a single copy.
///
/// Variants are declared in ordinal order; the ordinal is what gets stored,
/// so sorting by status follows `available < borrowed < reserved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LendingStatus {
    Available,
    Borrowed,
    Reserved,
}

impl LendingStatus {
    pub const ALL: [LendingStatus; 3] = [
        LendingStatus::Available,
        LendingStatus::Borrowed,
        LendingStatus::Reserved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LendingStatus::Available => "available",
            LendingStatus::Borrowed => "borrowed",
            LendingStatus::Reserved => "reserved",
        }
    }

    pub fn ordinal(&self) -> i64 {
        match self {
            LendingStatus::Available => 0,
            LendingStatus::Borrowed => 1,
            LendingStatus::Reserved => 2,
        }
    }

    pub fn from_ordinal(value: i64) -> Option<Self> {
        match value {
            0 => Some(LendingStatus::Available),
            1 => Some(LendingStatus::Borrowed),
            2 => Some(LendingStatus::Reserved),
            _ => None,
        }
    }

    /// Whether a copy in this state is out of the library.
    pub fn is_checked_out(&self) -> bool {
        !matches!(self, LendingStatus::Available)
    }
}

impl Default for LendingStatus {
    fn default() -> Self {
        LendingStatus::Available
    }
}

impl fmt::Display for LendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LendingStatus {
    type Err = String;

    /// Exact, case-sensitive match on the lowercase names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LendingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid status: {}", s))
    }
}

// =============================================================================
// Author
// =============================================================================

/// Book author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Author {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Author {
    /// Create a new author stamped at `now`
    pub fn new(name: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: now.timestamp(),
            updated_at: now.timestamp(),
        }
    }

    /// Validate author data
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", "can't be blank");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// =============================================================================
// Book
// =============================================================================

/// One physical copy of a title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier
    pub id: String,
    pub title: String,
    /// Shared by every copy of the same work
    pub isbn: String,
    /// Position of this copy within its `(title, isbn, authors)` work
    pub copy_number: i64,
    pub published_date: NaiveDate,
    pub status: LendingStatus,
    /// Due date as unix seconds; only set while borrowed or reserved
    pub borrowed_until: Option<i64>,
    /// Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Book {
    /// Build a fresh `available` copy from creation input.
    pub fn from_new(new_book: &NewBook, copy_number: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: new_book.title.trim().to_string(),
            isbn: new_book.isbn.trim().to_string(),
            copy_number,
            published_date: new_book.published_date,
            status: LendingStatus::Available,
            borrowed_until: None,
            created_at: now.timestamp(),
            updated_at: now.timestamp(),
        }
    }
}

/// Raw `books` row as stored in SQLite.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct BookRow {
    pub id: String,
    pub title: String,
    pub isbn: String,
    pub copy_number: i64,
    pub published_date: String,
    pub status: i64,
    pub borrowed_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<BookRow> for Book {
    type Error = CatalogError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| CatalogError::Corrupt {
            entity_type: "Book".to_string(),
            id: row.id.clone(),
            message,
        };

        let published_date = NaiveDate::parse_from_str(&row.published_date, DATE_FORMAT)
            .map_err(|e| corrupt(format!("bad published_date {:?}: {}", row.published_date, e)))?;
        let status = LendingStatus::from_ordinal(row.status)
            .ok_or_else(|| corrupt(format!("bad status ordinal {}", row.status)))?;

        Ok(Book {
            id: row.id,
            title: row.title,
            isbn: row.isbn,
            copy_number: row.copy_number,
            published_date,
            status,
            borrowed_until: row.borrowed_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for creating a new copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub isbn: String,
    pub published_date: NaiveDate,
    pub author_ids: Vec<String>,
}

impl NewBook {
    pub fn new(
        title: impl Into<String>,
        isbn: impl Into<String>,
        published_date: NaiveDate,
        author_ids: Vec<String>,
    ) -> Self {
        Self {
            title: title.into(),
            isbn: isbn.into(),
            published_date,
            author_ids,
        }
    }

    /// Presence checks that do not need the database.
    pub fn validate(&self) -> ValidationErrors {
        validate_book_fields(&self.title, &self.isbn, &self.author_ids)
    }
}

/// Direct field edits to an existing copy.
///
/// Lending fields are deliberately absent; they only change through the
/// lending state machine. The copy number never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookChanges {
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub author_ids: Option<Vec<String>>,
}

impl BookChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.isbn.is_none()
            && self.published_date.is_none()
            && self.author_ids.is_none()
    }
}

pub(crate) fn validate_book_fields(
    title: &str,
    isbn: &str,
    author_ids: &[String],
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if title.trim().is_empty() {
        errors.add("title", "can't be blank");
    }
    if isbn.trim().is_empty() {
        errors.add("isbn", "can't be blank");
    }
    if author_ids.iter().all(|id| id.trim().is_empty()) {
        errors.add("authors", "must have at least one author");
    }
    errors
}

/// A copy together with its authors, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDetails {
    pub book: Book,
    pub authors: Vec<Author>,
}

impl BookDetails {
    /// Sorted, de-duplicated author ids.
    pub fn author_ids(&self) -> Vec<String> {
        normalize_author_ids(self.authors.iter().map(|a| a.id.clone()))
    }
}

/// Sort and de-duplicate a set of author ids, dropping blanks.
pub fn normalize_author_ids<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut ids: Vec<String> = ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
