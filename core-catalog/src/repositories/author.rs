//! Author repository trait and implementation

use crate::error::{CatalogError, Result, ValidationErrors};
use crate::models::Author;
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Author repository interface for data access operations
#[async_trait]
pub trait AuthorRepository: Send + Sync {
    /// Find an author by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Author>>;

    /// Find every author whose ID is listed; unknown IDs are skipped
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Author>>;

    /// Insert a new author
    ///
    /// # Errors
    /// Returns `Validation` if the name is blank.
    async fn insert(&self, author: &Author) -> Result<()>;

    /// Update an existing author
    ///
    /// # Errors
    /// Returns `NotFound` if the author does not exist.
    async fn update(&self, author: &Author) -> Result<()>;

    /// Delete an author by ID; join rows go with it
    ///
    /// # Returns
    /// - `Ok(true)` if the author was deleted
    /// - `Ok(false)` if the author was not found
    ///
    /// # Errors
    /// Returns `Validation` on `books` while any copy has no other author.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Authors ordered by name with pagination
    async fn query(&self, page_request: PageRequest) -> Result<Page<Author>>;

    /// Count total authors
    async fn count(&self) -> Result<i64>;
}

/// Rejection message when deleting an author would orphan a copy.
pub const SOLE_AUTHOR: &str = "still has copies with no other author";

/// Copies whose only author is the bound author.
const SOLE_AUTHORED_COUNT: &str = "SELECT COUNT(*) FROM book_authors ba \
     WHERE ba.author_id = ? AND NOT EXISTS ( \
         SELECT 1 FROM book_authors other \
         WHERE other.book_id = ba.book_id AND other.author_id <> ba.author_id)";

/// SQLite implementation of AuthorRepository
pub struct SqliteAuthorRepository {
    pool: SqlitePool,
}

impl SqliteAuthorRepository {
    /// Create a new SQLite author repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorRepository for SqliteAuthorRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Author>> {
        let author = query_as::<_, Author>("SELECT * FROM authors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(author)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Author>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM authors WHERE id IN ({}) ORDER BY name COLLATE NOCASE, id",
            placeholders
        );

        let mut query = query_as::<_, Author>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn insert(&self, author: &Author) -> Result<()> {
        author.validate().map_err(CatalogError::Validation)?;

        sqlx::query("INSERT INTO authors (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(&author.id)
            .bind(author.name.trim())
            .bind(author.created_at)
            .bind(author.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update(&self, author: &Author) -> Result<()> {
        author.validate().map_err(CatalogError::Validation)?;

        let result = sqlx::query("UPDATE authors SET name = ?, updated_at = ? WHERE id = ?")
            .bind(author.name.trim())
            .bind(author.updated_at)
            .bind(&author.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::not_found("Author", &author.id));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let sole: (i64,) = query_as(SOLE_AUTHORED_COUNT)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if sole.0 > 0 {
            let mut errors = ValidationErrors::new();
            errors.add("books", SOLE_AUTHOR);
            return Err(CatalogError::Validation(errors));
        }

        let result = sqlx::query("DELETE FROM authors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<Author>> {
        // Get total count
        let total: (i64,) = query_as("SELECT COUNT(*) FROM authors")
            .fetch_one(&self.pool)
            .await?;

        // Get paginated authors
        let authors = query_as::<_, Author>(
            "SELECT * FROM authors ORDER BY name COLLATE NOCASE, rowid LIMIT ? OFFSET ?",
        )
        .bind(i64::from(page_request.limit()))
        .bind(page_request.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(authors, total.0 as u64, page_request))
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = query_as("SELECT COUNT(*) FROM authors")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
