//! Catalog service façade and bootstrap helpers.
//!
//! [`CatalogService`] wires a [`CatalogConfig`] into a SQLite pool, the
//! repositories and the catalog engines (identity resolution, lending, search
//! and the expiration sweep). Hosts such as an HTTP layer call the façade and
//! render the returned views.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_runtime::CatalogConfig;
//! use core_service::CatalogService;
//!
//! let config = CatalogConfig::builder()
//!     .database_path("/var/lib/catalog/catalog.db")
//!     .build()?;
//! let catalog = core_service::bootstrap(config).await?;
//! let schedule = catalog.start_expiration_schedule();
//!
//! // ... serve requests ...
//!
//! schedule.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod locks;

pub use error::{CoreError, Result};

use chrono::Duration as ChronoDuration;
use core_catalog::clock::{Clock, SystemClock};
use core_catalog::db::{create_pool, DatabaseConfig};
use core_catalog::identity::{Candidate, IdentityResolver};
use core_catalog::lending::{LendingPolicy, LendingService, TransitionOutcome};
use core_catalog::models::{normalize_author_ids, Author, Book, BookChanges, BookDetails, NewBook};
use core_catalog::query::{CatalogQuery, SearchParams};
use core_catalog::repositories::{
    AuthorRepository, BookRepository, Page, PageRequest, SqliteAuthorRepository,
    SqliteBookRepository,
};
use core_catalog::sweep::{ExpirationSweep, SweepReport};
use core_catalog::views::SearchResponse;
use core_catalog::{CatalogError, ValidationErrors};
use core_runtime::config::{CatalogConfig, DatabaseLocation};
use locks::IdentityLocks;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

const UNKNOWN_AUTHOR: &str = "must exist";

fn not_found(entity_type: &str, id: &str) -> CoreError {
    CoreError::Catalog(CatalogError::NotFound {
        entity_type: entity_type.to_string(),
        id: id.to_string(),
    })
}

/// Initialize logging from `config`, then open the catalog.
pub async fn bootstrap(config: CatalogConfig) -> Result<CatalogService> {
    core_runtime::logging::init_logging(config.logging.clone())?;
    CatalogService::new(config).await
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CatalogService {
    config: Arc<CatalogConfig>,
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    authors: Arc<dyn AuthorRepository>,
    books: Arc<dyn BookRepository>,
    identity: IdentityResolver,
    lending: LendingService,
    sweep: Arc<ExpirationSweep>,
    identity_locks: Arc<IdentityLocks>,
}

impl CatalogService {
    /// Open the configured database and wire the catalog on the system clock.
    pub async fn new(config: CatalogConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Same as [`CatalogService::new`] with an injected clock.
    pub async fn with_clock(config: CatalogConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let pool = create_pool(database_config(&config)).await?;
        Self::from_pool(config, pool, clock)
    }

    /// Wire the catalog on an existing, migrated pool.
    pub fn from_pool(config: CatalogConfig, pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        let policy = lending_policy(&config)?;

        let authors: Arc<dyn AuthorRepository> = Arc::new(SqliteAuthorRepository::new(pool.clone()));
        let book_repository = Arc::new(SqliteBookRepository::new(pool.clone()));
        let books: Arc<dyn BookRepository> = book_repository.clone();

        let identity = IdentityResolver::new(book_repository);
        let lending = LendingService::new(Arc::clone(&books), Arc::clone(&clock), policy);
        let sweep = Arc::new(ExpirationSweep::new(
            Arc::clone(&books),
            lending.clone(),
            Arc::clone(&clock),
        ));

        info!(
            in_memory = config.is_in_memory(),
            reservation_hold_secs = policy.reservation_hold.num_seconds(),
            loan_period_secs = policy.loan_period.num_seconds(),
            "Catalog service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            pool,
            clock,
            authors,
            books,
            identity,
            lending,
            sweep,
            identity_locks: Arc::new(IdentityLocks::default()),
        })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn lending_policy(&self) -> &LendingPolicy {
        self.lending.policy()
    }

    // =========================================================================
    // Authors
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn create_author(&self, name: &str) -> Result<Author> {
        let author = Author::new(name.trim().to_string(), self.clock.now());
        self.authors.insert(&author).await?;

        info!(author_id = %author.id, "Author created");
        Ok(author)
    }

    pub async fn get_author(&self, id: &str) -> Result<Author> {
        self.authors
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Author", id))
    }

    #[instrument(skip(self))]
    pub async fn rename_author(&self, id: &str, name: &str) -> Result<Author> {
        let mut author = self.get_author(id).await?;
        author.name = name.trim().to_string();
        author.updated_at = self.clock.unix_timestamp();
        self.authors.update(&author).await?;
        Ok(author)
    }

    /// Delete an author and their links to books.
    ///
    /// Refused with a `Validation` error on `books` while the author is the
    /// only author of any copy.
    #[instrument(skip(self))]
    pub async fn delete_author(&self, id: &str) -> Result<()> {
        if !self.authors.delete(id).await? {
            return Err(not_found("Author", id));
        }
        info!(author_id = %id, "Author deleted");
        Ok(())
    }

    pub async fn list_authors(&self, page: PageRequest) -> Result<Page<Author>> {
        Ok(self.authors.query(page).await?)
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// Create a new copy.
    ///
    /// A copy of an existing work gets the next copy number of that work.
    /// Creation is serialized per `(title, isbn)` group.
    ///
    /// # Errors
    ///
    /// - `Validation` for blank fields, unknown authors, or an isbn taken by a
    ///   different author set
    /// - `Conflict` if another process claimed the same copy number
    #[instrument(skip(self, new_book), fields(title = %new_book.title, isbn = %new_book.isbn))]
    pub async fn create_book(&self, new_book: NewBook) -> Result<BookDetails> {
        new_book.validate().into_result()?;

        let candidate = Candidate::from_new_book(&new_book);
        let authors = self.resolve_authors(&candidate.author_ids).await?;

        let _group = self
            .identity_locks
            .acquire(&candidate.title, &candidate.isbn)
            .await;

        let assignment = self.identity.assign(&candidate).await?;
        let book = Book::from_new(&new_book, assignment.copy_number, self.clock.now());
        self.books.insert(&book, &candidate.author_ids).await?;

        info!(
            book_id = %book.id,
            copy_number = book.copy_number,
            check = ?assignment.check,
            "Book copy created"
        );

        Ok(BookDetails { book, authors })
    }

    pub async fn get_book(&self, id: &str) -> Result<BookDetails> {
        self.books
            .find_details(id)
            .await?
            .ok_or_else(|| not_found("Book", id))
    }

    /// Edit title, isbn, publication date or authors.
    ///
    /// The isbn check is re-run against every other record; the copy number
    /// and lending state never change here.
    #[instrument(skip(self, changes))]
    pub async fn update_book(&self, id: &str, changes: BookChanges) -> Result<BookDetails> {
        let current = self.get_book(id).await?;
        if changes.is_empty() {
            return Ok(current);
        }

        let mut book = current.book.clone();
        if let Some(title) = &changes.title {
            book.title = title.trim().to_string();
        }
        if let Some(isbn) = &changes.isbn {
            book.isbn = isbn.trim().to_string();
        }
        if let Some(published_date) = changes.published_date {
            book.published_date = published_date;
        }

        let author_ids = changes.author_ids.map(normalize_author_ids);
        let effective_authors = author_ids.clone().unwrap_or_else(|| current.author_ids());

        NewBook::new(
            book.title.clone(),
            book.isbn.clone(),
            book.published_date,
            effective_authors.clone(),
        )
        .validate()
        .into_result()?;

        if let Some(ids) = &author_ids {
            self.resolve_authors(ids).await?;
        }

        let candidate = Candidate::new(&book.title, &book.isbn, effective_authors);
        let _group = self
            .identity_locks
            .acquire(&candidate.title, &candidate.isbn)
            .await;

        self.identity
            .check(&candidate, Some(id))
            .await?
            .into_result()?;

        book.updated_at = self.clock.unix_timestamp();
        self.books.update(&book, author_ids.as_deref()).await?;

        debug!(book_id = %id, "Book updated");
        self.get_book(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_book(&self, id: &str) -> Result<()> {
        if !self.books.delete(id).await? {
            return Err(not_found("Book", id));
        }
        info!(book_id = %id, "Book copy deleted");
        Ok(())
    }

    /// Validate raw search parameters and run the query.
    #[instrument(skip(self, params))]
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse> {
        let query = CatalogQuery::from_params(params)?;
        let page = self.books.search(&query).await?;
        Ok(SearchResponse::from(page))
    }

    /// Authors for `ids` in name order; every id must exist.
    async fn resolve_authors(&self, ids: &[String]) -> Result<Vec<Author>> {
        let authors = self.authors.find_by_ids(ids).await?;
        if authors.len() != ids.len() {
            let mut errors = ValidationErrors::new();
            errors.add("authors", UNKNOWN_AUTHOR);
            return Err(CatalogError::Validation(errors).into());
        }
        Ok(authors)
    }

    // =========================================================================
    // Lending
    // =========================================================================

    pub async fn reserve(&self, book_id: &str) -> Result<TransitionOutcome> {
        Ok(self.lending.reserve(book_id).await?)
    }

    pub async fn borrow(&self, book_id: &str) -> Result<TransitionOutcome> {
        Ok(self.lending.borrow(book_id).await?)
    }

    pub async fn return_book(&self, book_id: &str) -> Result<TransitionOutcome> {
        Ok(self.lending.return_book(book_id).await?)
    }

    pub async fn cancel_reservation(&self, book_id: &str) -> Result<TransitionOutcome> {
        Ok(self.lending.cancel_reservation(book_id).await?)
    }

    // =========================================================================
    // Expiration sweep
    // =========================================================================

    /// Run one expiration pass now.
    pub async fn run_expiration_sweep(&self) -> Result<SweepReport> {
        Ok(self.sweep.run_once().await?)
    }

    /// Start the periodic sweep at the configured interval.
    ///
    /// The task keeps running until [`SweepSchedule::stop`] is called or its
    /// token is cancelled.
    pub fn start_expiration_schedule(&self) -> SweepSchedule {
        let shutdown = CancellationToken::new();
        let handle = Arc::clone(&self.sweep).spawn_periodic(self.config.sweep_interval, shutdown.clone());
        SweepSchedule { shutdown, handle }
    }
}

/// Handle to a running expiration schedule.
pub struct SweepSchedule {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweepSchedule {
    /// Token that stops the schedule when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the schedule and wait for the current pass to finish.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.handle.await.map_err(|e| {
            CoreError::Runtime(core_runtime::Error::Internal(format!(
                "Expiration sweep task failed: {}",
                e
            )))
        })
    }
}

fn database_config(config: &CatalogConfig) -> DatabaseConfig {
    match &config.database {
        DatabaseLocation::File(path) => DatabaseConfig::new(path)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout),
        DatabaseLocation::InMemory => {
            DatabaseConfig::in_memory().acquire_timeout(config.acquire_timeout)
        }
    }
}

fn lending_policy(config: &CatalogConfig) -> Result<LendingPolicy> {
    let mut policy = LendingPolicy::default();
    if let Some(hold) = config.reservation_hold {
        policy = policy.with_reservation_hold(to_chrono("reservation_hold", hold)?);
    }
    if let Some(period) = config.loan_period {
        policy = policy.with_loan_period(to_chrono("loan_period", period)?);
    }
    Ok(policy)
}

fn to_chrono(setting: &str, value: Duration) -> Result<ChronoDuration> {
    ChronoDuration::from_std(value)
        .map_err(|_| CoreError::InitializationFailed(format!("{} is out of range", setting)))
}
