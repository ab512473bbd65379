//! Ordering for catalog queries.
//!
//! `sort` is a comma-separated list of field names, each optionally prefixed
//! with `-` for descending order. Fields apply left to right as a composite key.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sortable catalog fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    /// Alphabetically-first author name of each copy
    Author,
    Isbn,
    PublishedDate,
    /// Ordinal order: available, borrowed, reserved
    Status,
    BorrowedUntil,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub const ALL: [SortField; 8] = [
        SortField::Title,
        SortField::Author,
        SortField::Isbn,
        SortField::PublishedDate,
        SortField::Status,
        SortField::BorrowedUntil,
        SortField::CreatedAt,
        SortField::UpdatedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Author => "author",
            SortField::Isbn => "isbn",
            SortField::PublishedDate => "published_date",
            SortField::Status => "status",
            SortField::BorrowedUntil => "borrowed_until",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }

    /// SQL expression over the `b` alias and the `first_author_name` column.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortField::Title => "b.title COLLATE NOCASE",
            SortField::Author => "first_author_name COLLATE NOCASE",
            SortField::Isbn => "b.isbn",
            SortField::PublishedDate => "b.published_date",
            SortField::Status => "b.status",
            SortField::BorrowedUntil => "b.borrowed_until",
            SortField::CreatedAt => "b.created_at",
            SortField::UpdatedAt => "b.updated_at",
        }
    }

    fn valid_fields() -> String {
        SortField::ALL
            .iter()
            .map(SortField::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        SortField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| {
                CatalogError::invalid_input(
                    "sort",
                    format!(
                        "Invalid sort field: {}. Valid fields are: {}",
                        s,
                        SortField::valid_fields()
                    ),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Composite ordering, primary key first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        if keys.is_empty() {
            Self::default()
        } else {
            Self { keys }
        }
    }

    /// Parse a raw `sort` parameter; missing or blank means title ascending.
    ///
    /// # Errors
    ///
    /// `InvalidInput` naming the first unknown field and the valid set.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| match token.strip_prefix('-') {
                Some(name) => name.trim().parse().map(SortKey::desc),
                None => token.parse().map(SortKey::asc),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(keys))
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn uses(&self, field: SortField) -> bool {
        self.keys.iter().any(|key| key.field == field)
    }

    /// `ORDER BY` body. Insertion order breaks remaining ties so that pages
    /// never overlap.
    pub(crate) fn order_by_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .keys
            .iter()
            .map(|key| format!("{} {}", key.field.column(), key.direction.sql()))
            .collect();
        parts.push("b.rowid ASC".to_string());
        parts.join(", ")
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            keys: vec![SortKey::asc(SortField::Title)],
        }
    }
}
