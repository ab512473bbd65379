//! # Expiration Sweep
//!
//! Returns every borrowed or reserved copy whose due date has passed.
//!
//! The sweep never touches the lending columns directly: each overdue copy
//! goes through [`LendingService::return_book`], so a copy returned by a
//! client between the scan and the write is simply skipped. A failure on one
//! copy is logged and the sweep moves on to the next.
//!
//! ## Usage
//!
//! ```ignore
//! use core_catalog::sweep::ExpirationSweep;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let sweep = Arc::new(ExpirationSweep::new(books, lending, clock));
//!
//! // One pass
//! let report = sweep.run_once().await?;
//!
//! // Daily, until shutdown
//! let shutdown = CancellationToken::new();
//! let handle = sweep.spawn_periodic(Duration::from_secs(86_400), shutdown.clone());
//! ```

use crate::clock::Clock;
use crate::error::Result;
use crate::lending::{LendingService, TransitionOutcome};
use crate::repositories::BookRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Counters for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue copies found by the scan
    pub examined: usize,
    /// Copies moved back to `available`
    pub expired: usize,
    /// Copies whose return failed with an error
    pub failed: usize,
}

impl SweepReport {
    /// Copies that were already returned by the time the sweep reached them.
    pub fn skipped(&self) -> usize {
        self.examined - self.expired - self.failed
    }
}

pub struct ExpirationSweep {
    books: Arc<dyn BookRepository>,
    lending: LendingService,
    clock: Arc<dyn Clock>,
}

impl ExpirationSweep {
    pub fn new(books: Arc<dyn BookRepository>, lending: LendingService, clock: Arc<dyn Clock>) -> Self {
        Self {
            books,
            lending,
            clock,
        }
    }

    /// Run one pass over all overdue copies.
    ///
    /// # Errors
    ///
    /// Only the initial scan can fail; per-copy failures are counted in
    /// [`SweepReport::failed`].
    #[instrument(skip(self), name = "expiration_sweep")]
    pub async fn run_once(&self) -> Result<SweepReport> {
        let now = self.clock.unix_timestamp();
        let overdue = self.books.find_overdue(now).await?;

        let mut report = SweepReport {
            examined: overdue.len(),
            ..Default::default()
        };

        if overdue.is_empty() {
            debug!("No overdue copies");
            return Ok(report);
        }

        for book in overdue {
            match self.lending.return_book(&book.id).await {
                Ok(TransitionOutcome::Applied(_)) => {
                    report.expired += 1;
                    info!(
                        book_id = %book.id,
                        previous_status = %book.status,
                        due = ?book.borrowed_until,
                        "Expired overdue copy"
                    );
                }
                Ok(TransitionOutcome::Rejected { current, .. }) => {
                    debug!(book_id = %book.id, %current, "Copy already returned");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(book_id = %book.id, error = %e, "Failed to expire overdue copy");
                }
            }
        }

        info!(
            examined = report.examined,
            expired = report.expired,
            failed = report.failed,
            "Expiration sweep completed"
        );

        Ok(report)
    }

    /// Run [`run_once`](Self::run_once) every `every` until `shutdown` fires.
    ///
    /// The first pass starts immediately.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = every.as_secs(), "Expiration sweep scheduled");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Expiration sweep schedule stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Expiration sweep pass failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::create_test_pool;
    use crate::lending::LendingPolicy;
    use crate::models::{Author, Book, LendingStatus, NewBook};
    use crate::repositories::{AuthorRepository, SqliteAuthorRepository, SqliteBookRepository};
    use chrono::{NaiveDate, TimeZone, Utc};
    use sqlx::SqlitePool;

    struct Fixture {
        pool: SqlitePool,
        books: Arc<SqliteBookRepository>,
        clock: Arc<FixedClock>,
        lending: LendingService,
        author_id: String,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = create_test_pool().await.unwrap();
            let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
            let author = Author::new("Frank Herbert".to_string(), start);
            SqliteAuthorRepository::new(pool.clone())
                .insert(&author)
                .await
                .unwrap();

            let books = Arc::new(SqliteBookRepository::new(pool.clone()));
            let clock = Arc::new(FixedClock::new(start));
            let lending = LendingService::new(books.clone(), clock.clone(), LendingPolicy::default());

            Self {
                pool,
                books,
                clock,
                lending,
                author_id: author.id,
            }
        }

        async fn add_copy(&self, title: &str) -> Book {
            let new_book = NewBook::new(
                title,
                format!("isbn-{}", title),
                NaiveDate::from_ymd_opt(1965, 8, 1).unwrap(),
                vec![self.author_id.clone()],
            );
            let book = Book::from_new(&new_book, 1, self.clock.now());
            self.books
                .insert(&book, &[self.author_id.clone()])
                .await
                .unwrap();
            book
        }

        fn sweep(&self) -> ExpirationSweep {
            ExpirationSweep::new(self.books.clone(), self.lending.clone(), self.clock.clone())
        }

        async fn status_of(&self, id: &str) -> (LendingStatus, Option<i64>) {
            let book = self.books.find_by_id(id).await.unwrap().unwrap();
            (book.status, book.borrowed_until)
        }
    }

    #[tokio::test]
    async fn past_due_copies_become_available() {
        let fx = Fixture::new().await;
        let borrowed = fx.add_copy("Dune").await;
        let reserved = fx.add_copy("Emma").await;
        assert!(fx.lending.borrow(&borrowed.id).await.unwrap().is_applied());
        assert!(fx.lending.reserve(&reserved.id).await.unwrap().is_applied());

        fx.clock.advance(chrono::Duration::days(8));
        let report = fx.sweep().run_once().await.unwrap();

        assert_eq!(report, SweepReport { examined: 2, expired: 2, failed: 0 });
        assert_eq!(fx.status_of(&borrowed.id).await, (LendingStatus::Available, None));
        assert_eq!(fx.status_of(&reserved.id).await, (LendingStatus::Available, None));
    }

    #[tokio::test]
    async fn future_due_dates_are_untouched() {
        let fx = Fixture::new().await;
        let borrowed = fx.add_copy("Dune").await;
        let reserved = fx.add_copy("Emma").await;
        fx.lending.borrow(&borrowed.id).await.unwrap();
        fx.lending.reserve(&reserved.id).await.unwrap();

        // Reservation lapses after one day; the loan runs for a week.
        fx.clock.advance(chrono::Duration::days(2));
        let report = fx.sweep().run_once().await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(fx.status_of(&borrowed.id).await.0, LendingStatus::Borrowed);
        assert_eq!(fx.status_of(&reserved.id).await.0, LendingStatus::Available);
    }

    #[tokio::test]
    async fn available_copy_with_stray_due_date_is_ignored() {
        let fx = Fixture::new().await;
        let book = fx.add_copy("Dune").await;
        sqlx::query("UPDATE books SET borrowed_until = ? WHERE id = ?")
            .bind(fx.clock.unix_timestamp() - 3_600)
            .bind(&book.id)
            .execute(&fx.pool)
            .await
            .unwrap();

        let report = fx.sweep().run_once().await.unwrap();

        assert_eq!(report, SweepReport::default());
        let (status, due) = fx.status_of(&book.id).await;
        assert_eq!(status, LendingStatus::Available);
        assert!(due.is_some());
    }

    #[tokio::test]
    async fn periodic_sweep_runs_until_cancelled() {
        let fx = Fixture::new().await;
        let book = fx.add_copy("Dune").await;
        fx.lending.borrow(&book.id).await.unwrap();
        fx.clock.advance(chrono::Duration::weeks(2));

        let shutdown = CancellationToken::new();
        let handle = Arc::new(fx.sweep()).spawn_periodic(Duration::from_millis(10), shutdown.clone());

        let mut status = LendingStatus::Borrowed;
        for _ in 0..100 {
            status = fx.status_of(&book.id).await.0;
            if status == LendingStatus::Available {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(status, LendingStatus::Available);
    }
}
