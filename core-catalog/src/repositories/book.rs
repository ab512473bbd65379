//! Book repository trait and implementation

use crate::error::{is_unique_violation, CatalogError, Result};
use crate::identity::{CopyLookup, ExistingCopy};
use crate::lending::LendingState;
use crate::models::{Author, Book, BookDetails, BookRow, LendingStatus, DATE_FORMAT};
use crate::query::{build_book_query_spec, BindValue, CatalogQuery};
use crate::repositories::Page;
use async_trait::async_trait;
use sqlx::query::QueryAs;
use sqlx::sqlite::SqliteArguments;
use sqlx::{query_as, FromRow, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, warn};

const SELECT_BOOK: &str = "SELECT id, title, isbn, copy_number, published_date, status, \
     borrowed_until, created_at, updated_at FROM books";

/// Book repository interface for data access operations
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Find a copy by its ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Book>>;

    /// Find a copy together with its authors
    async fn find_details(&self, id: &str) -> Result<Option<BookDetails>>;

    /// Insert a copy and its author links in one transaction
    ///
    /// # Errors
    /// Returns `Conflict` if another record already holds the same
    /// `(title, isbn, copy_number)`.
    async fn insert(&self, book: &Book, author_ids: &[String]) -> Result<()>;

    /// Update the editable fields of a copy
    ///
    /// Lending columns and the copy number are left untouched. When
    /// `author_ids` is given, the author links are replaced.
    ///
    /// # Errors
    /// Returns `NotFound` if the copy does not exist.
    async fn update(&self, book: &Book, author_ids: Option<&[String]>) -> Result<()>;

    /// Delete a copy by ID
    ///
    /// # Returns
    /// - `Ok(true)` if the copy was deleted
    /// - `Ok(false)` if the copy was not found
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Write `next` only if the copy is still in `expected`.
    ///
    /// # Returns
    /// `Ok(false)` when the row was missing or had already moved on.
    async fn compare_and_set_lending(
        &self,
        id: &str,
        expected: LendingStatus,
        next: LendingState,
        updated_at: i64,
    ) -> Result<bool>;

    /// Checked-out copies whose due date is strictly before `now`
    async fn find_overdue(&self, now: i64) -> Result<Vec<Book>>;

    /// Filtered, sorted and paginated search
    async fn search(&self, query: &CatalogQuery) -> Result<Page<BookDetails>>;

    /// Count total copies
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of BookRepository
pub struct SqliteBookRepository {
    pool: SqlitePool,
}

impl SqliteBookRepository {
    /// Create a new SQLite book repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BookAuthorRow {
    book_id: String,
    id: String,
    name: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, FromRow)]
struct CopyRow {
    id: String,
    title: String,
    isbn: String,
    copy_number: i64,
    author_id: Option<String>,
}

fn bind_values<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    binds: &[BindValue],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            BindValue::Text(value) => query.bind(value.clone()),
            BindValue::I64(value) => query.bind(*value),
        };
    }
    query
}

fn map_write_error(err: sqlx::Error, book: &Book) -> CatalogError {
    if is_unique_violation(&err) {
        warn!(
            title = %book.title,
            isbn = %book.isbn,
            copy_number = book.copy_number,
            "Copy number already taken"
        );
        CatalogError::Conflict(format!(
            "copy {} of {:?} ({}) already exists",
            book.copy_number, book.title, book.isbn
        ))
    } else {
        CatalogError::Database(err)
    }
}

/// Authors of each listed copy, sorted by name.
async fn authors_for(
    conn: &mut SqliteConnection,
    book_ids: &[String],
) -> Result<HashMap<String, Vec<Author>>> {
    let mut grouped: HashMap<String, Vec<Author>> = HashMap::new();
    if book_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders = vec!["?"; book_ids.len()].join(", ");
    let sql = format!(
        "SELECT ba.book_id, a.id, a.name, a.created_at, a.updated_at \
         FROM book_authors ba INNER JOIN authors a ON a.id = ba.author_id \
         WHERE ba.book_id IN ({}) \
         ORDER BY a.name COLLATE NOCASE ASC, a.id ASC",
        placeholders
    );

    let mut query = query_as::<_, BookAuthorRow>(&sql);
    for id in book_ids {
        query = query.bind(id);
    }

    for row in query.fetch_all(&mut *conn).await? {
        grouped.entry(row.book_id).or_default().push(Author {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        });
    }

    Ok(grouped)
}

async fn attach_authors(conn: &mut SqliteConnection, books: Vec<Book>) -> Result<Vec<BookDetails>> {
    let ids: Vec<String> = books.iter().map(|book| book.id.clone()).collect();
    let mut authors = authors_for(conn, &ids).await?;

    Ok(books
        .into_iter()
        .map(|book| {
            let authors = authors.remove(&book.id).unwrap_or_default();
            BookDetails { book, authors }
        })
        .collect())
}

async fn link_authors(conn: &mut SqliteConnection, book_id: &str, author_ids: &[String]) -> Result<()> {
    for author_id in author_ids {
        sqlx::query("INSERT OR IGNORE INTO book_authors (book_id, author_id) VALUES (?, ?)")
            .bind(book_id)
            .bind(author_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl BookRepository for SqliteBookRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Book>> {
        let row = query_as::<_, BookRow>(&format!("{} WHERE id = ?", SELECT_BOOK))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Book::try_from).transpose()
    }

    async fn find_details(&self, id: &str) -> Result<Option<BookDetails>> {
        let Some(book) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        let mut details = attach_authors(&mut *conn, vec![book]).await?;
        Ok(details.pop())
    }

    async fn insert(&self, book: &Book, author_ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO books (
                id, title, isbn, copy_number, published_date,
                status, borrowed_until, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(book.copy_number)
        .bind(book.published_date.format(DATE_FORMAT).to_string())
        .bind(book.status.ordinal())
        .bind(book.borrowed_until)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, book))?;

        link_authors(&mut *tx, &book.id, author_ids).await?;
        tx.commit().await?;

        debug!(book_id = %book.id, copy_number = book.copy_number, "Inserted book copy");
        Ok(())
    }

    async fn update(&self, book: &Book, author_ids: Option<&[String]>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE books SET
                title = ?, isbn = ?, published_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(book.published_date.format(DATE_FORMAT).to_string())
        .bind(book.updated_at)
        .bind(&book.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, book))?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::not_found("Book", &book.id));
        }

        if let Some(author_ids) = author_ids {
            sqlx::query("DELETE FROM book_authors WHERE book_id = ?")
                .bind(&book.id)
                .execute(&mut *tx)
                .await?;
            link_authors(&mut *tx, &book.id, author_ids).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_set_lending(
        &self,
        id: &str,
        expected: LendingStatus,
        next: LendingState,
        updated_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE books SET status = ?, borrowed_until = ?, updated_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(next.status.ordinal())
        .bind(next.borrowed_until)
        .bind(updated_at)
        .bind(id)
        .bind(expected.ordinal())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_overdue(&self, now: i64) -> Result<Vec<Book>> {
        let rows = query_as::<_, BookRow>(&format!(
            "{} WHERE status IN (?, ?) AND borrowed_until IS NOT NULL AND borrowed_until < ? \
             ORDER BY borrowed_until ASC, rowid ASC",
            SELECT_BOOK
        ))
        .bind(LendingStatus::Borrowed.ordinal())
        .bind(LendingStatus::Reserved.ordinal())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Book::try_from).collect()
    }

    async fn search(&self, query: &CatalogQuery) -> Result<Page<BookDetails>> {
        let spec = build_book_query_spec(&query.filter, &query.sort);

        // Count, slice and authors come from one read snapshot
        let mut tx = self.pool.begin().await?;

        let total: (i64,) = bind_values(query_as(&spec.count_sql), &spec.binds)
            .fetch_one(&mut *tx)
            .await?;

        // Get the requested slice
        let paged_sql = format!("{} LIMIT ? OFFSET ?", spec.select_sql);
        let rows: Vec<BookRow> = bind_values(query_as(&paged_sql), &spec.binds)
            .bind(i64::from(query.page.limit()))
            .bind(query.page.offset() as i64)
            .fetch_all(&mut *tx)
            .await?;

        let books = rows
            .into_iter()
            .map(Book::try_from)
            .collect::<Result<Vec<_>>>()?;
        let items = attach_authors(&mut *tx, books).await?;
        tx.commit().await?;

        debug!(
            total = total.0,
            returned = items.len(),
            page = query.page.page,
            "Catalog search completed"
        );

        Ok(Page::new(items, total.0 as u64, query.page))
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = query_as("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

#[async_trait]
impl CopyLookup for SqliteBookRepository {
    async fn copies_of(&self, title: &str, isbn: &str) -> Result<Vec<ExistingCopy>> {
        let rows = query_as::<_, CopyRow>(
            "SELECT b.id, b.title, b.isbn, b.copy_number, ba.author_id \
             FROM books b LEFT JOIN book_authors ba ON ba.book_id = b.id \
             WHERE b.title = ? AND b.isbn = ? \
             ORDER BY b.copy_number ASC, b.id ASC, ba.author_id ASC",
        )
        .bind(title)
        .bind(isbn)
        .fetch_all(&self.pool)
        .await?;

        let mut copies: Vec<ExistingCopy> = Vec::new();
        for row in rows {
            match copies.last_mut() {
                Some(copy) if copy.id == row.id => copy.author_ids.extend(row.author_id),
                _ => copies.push(ExistingCopy {
                    id: row.id,
                    title: row.title,
                    isbn: row.isbn,
                    copy_number: row.copy_number,
                    author_ids: row.author_id.into_iter().collect(),
                }),
            }
        }

        Ok(copies)
    }
}
