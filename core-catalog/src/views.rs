//! Serializable response shapes.
//!
//! Timestamps are rendered as RFC 3339 strings and publication dates as
//! `YYYY-MM-DD`.

use crate::error::{CatalogError, ValidationErrors};
use crate::models::{BookDetails, LendingStatus};
use crate::repositories::{Page, PageMeta};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Author reference embedded in a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookView {
    pub id: String,
    pub title: String,
    pub isbn: String,
    pub copy_number: i64,
    pub published_date: NaiveDate,
    pub status: LendingStatus,
    pub borrowed_until: Option<DateTime<Utc>>,
    pub authors: Vec<AuthorRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BookDetails> for BookView {
    fn from(details: BookDetails) -> Self {
        let BookDetails { book, authors } = details;
        Self {
            id: book.id,
            title: book.title,
            isbn: book.isbn,
            copy_number: book.copy_number,
            published_date: book.published_date,
            status: book.status,
            borrowed_until: book.borrowed_until.map(timestamp),
            authors: authors
                .into_iter()
                .map(|author| AuthorRef {
                    id: author.id,
                    name: author.name,
                })
                .collect(),
            created_at: timestamp(book.created_at),
            updated_at: timestamp(book.updated_at),
        }
    }
}

/// `{books, pagination}` search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResponse {
    pub books: Vec<BookView>,
    pub pagination: PageMeta,
}

impl From<Page<BookDetails>> for SearchResponse {
    fn from(page: Page<BookDetails>) -> Self {
        let Page { items, meta } = page;
        Self {
            books: items.into_iter().map(BookView::from).collect(),
            pagination: meta,
        }
    }
}

/// `{error}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Client-facing error: field validation renders as `{field: [messages]}`,
/// everything else as `{error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorResponse {
    Fields(ValidationErrors),
    Message(ErrorBody),
}

impl From<&CatalogError> for ErrorResponse {
    fn from(err: &CatalogError) -> Self {
        match err {
            CatalogError::Validation(errors) => ErrorResponse::Fields(errors.clone()),
            other => ErrorResponse::Message(ErrorBody::new(other.client_message())),
        }
    }
}
