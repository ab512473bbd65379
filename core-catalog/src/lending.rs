//! Lending state machine for a single copy.
//!
//! ```text
//!              reserve                      borrow
//!   reserved <--------- available ----------------> borrowed
//!      |                ^   ^                          |
//!      | cancel/return  |   |          return          |
//!      +----------------+   +--------------------------+
//! ```
//!
//! `reserve` and `borrow` only leave `available`; there is no direct
//! reserved -> borrowed edge. A rejected transition is a value
//! ([`TransitionOutcome::Rejected`]), never an error.

use crate::clock::Clock;
use crate::error::{CatalogError, Result};
use crate::models::{Book, LendingStatus};
use crate::repositories::BookRepository;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// How long a reservation holds a copy.
pub const DEFAULT_RESERVATION_HOLD: Duration = Duration::days(1);

/// How long a borrowed copy may stay out.
pub const DEFAULT_LOAN_PERIOD: Duration = Duration::weeks(1);

const DUE_DATE_OUT_OF_RANGE: &str = "Due date is out of range";

/// Due-date durations applied by `reserve` and `borrow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingPolicy {
    pub reservation_hold: Duration,
    pub loan_period: Duration,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            reservation_hold: DEFAULT_RESERVATION_HOLD,
            loan_period: DEFAULT_LOAN_PERIOD,
        }
    }
}

impl LendingPolicy {
    pub fn with_reservation_hold(mut self, hold: Duration) -> Self {
        self.reservation_hold = hold;
        self
    }

    pub fn with_loan_period(mut self, period: Duration) -> Self {
        self.loan_period = period;
        self
    }
}

/// State-changing lending operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LendingAction {
    Reserve,
    Borrow,
    Return,
    CancelReservation,
}

impl LendingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LendingAction::Reserve => "reserve",
            LendingAction::Borrow => "borrow",
            LendingAction::Return => "return",
            LendingAction::CancelReservation => "cancel_reservation",
        }
    }

    /// Whether the action may start from `status`.
    pub fn accepts(&self, status: LendingStatus) -> bool {
        match self {
            LendingAction::Reserve | LendingAction::Borrow => status == LendingStatus::Available,
            LendingAction::Return => status.is_checked_out(),
            LendingAction::CancelReservation => status == LendingStatus::Reserved,
        }
    }

    /// Resulting lending fields, or `None` when the precondition fails.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on `borrowed_until` when the due date falls outside the
    /// representable range.
    pub fn apply(
        &self,
        from: LendingStatus,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> Result<Option<LendingState>> {
        if !self.accepts(from) {
            return Ok(None);
        }

        let next = match self {
            LendingAction::Reserve => LendingState {
                status: LendingStatus::Reserved,
                borrowed_until: Some(due_date(now, policy.reservation_hold)?),
            },
            LendingAction::Borrow => LendingState {
                status: LendingStatus::Borrowed,
                borrowed_until: Some(due_date(now, policy.loan_period)?),
            },
            LendingAction::Return | LendingAction::CancelReservation => LendingState::available(),
        };
        Ok(Some(next))
    }
}

fn due_date(now: DateTime<Utc>, period: Duration) -> Result<i64> {
    now.checked_add_signed(period)
        .map(|due| due.timestamp())
        .ok_or_else(|| CatalogError::invalid_input("borrowed_until", DUE_DATE_OUT_OF_RANGE))
}

impl fmt::Display for LendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two lending columns, always written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingState {
    pub status: LendingStatus,
    pub borrowed_until: Option<i64>,
}

impl LendingState {
    pub fn available() -> Self {
        Self {
            status: LendingStatus::Available,
            borrowed_until: None,
        }
    }
}

/// Result of a lending operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The copy moved to its new state.
    Applied(Book),
    /// The precondition did not hold; nothing changed.
    Rejected {
        action: LendingAction,
        current: LendingStatus,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }

    pub fn book(&self) -> Option<&Book> {
        match self {
            TransitionOutcome::Applied(book) => Some(book),
            TransitionOutcome::Rejected { .. } => None,
        }
    }

    /// Message for callers that report rejections to a client.
    pub fn rejection_message(&self) -> Option<String> {
        match self {
            TransitionOutcome::Applied(_) => None,
            TransitionOutcome::Rejected { action, current } => {
                Some(format!("Book is {}; cannot {}", current, action))
            }
        }
    }
}

/// Drives lending transitions and persists them with compare-and-set.
#[derive(Clone)]
pub struct LendingService {
    books: Arc<dyn BookRepository>,
    clock: Arc<dyn Clock>,
    policy: LendingPolicy,
}

impl LendingService {
    pub fn new(books: Arc<dyn BookRepository>, clock: Arc<dyn Clock>, policy: LendingPolicy) -> Self {
        Self {
            books,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub async fn reserve(&self, book_id: &str) -> Result<TransitionOutcome> {
        self.perform(book_id, LendingAction::Reserve).await
    }

    pub async fn borrow(&self, book_id: &str) -> Result<TransitionOutcome> {
        self.perform(book_id, LendingAction::Borrow).await
    }

    pub async fn return_book(&self, book_id: &str) -> Result<TransitionOutcome> {
        self.perform(book_id, LendingAction::Return).await
    }

    pub async fn cancel_reservation(&self, book_id: &str) -> Result<TransitionOutcome> {
        self.perform(book_id, LendingAction::CancelReservation).await
    }

    /// Apply `action` to a copy.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; database errors propagate. A failed
    /// precondition is `Ok(TransitionOutcome::Rejected { .. })`.
    #[instrument(skip(self))]
    pub async fn perform(&self, book_id: &str, action: LendingAction) -> Result<TransitionOutcome> {
        let book = self
            .books
            .find_by_id(book_id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Book", book_id))?;

        let now = self.clock.now();
        let Some(next) = action.apply(book.status, now, &self.policy)? else {
            debug!(book_id, current = %book.status, "Lending transition rejected");
            return Ok(TransitionOutcome::Rejected {
                action,
                current: book.status,
            });
        };

        let swapped = self
            .books
            .compare_and_set_lending(book_id, book.status, next, now.timestamp())
            .await?;

        if !swapped {
            // Lost a race: report against whatever state won.
            let current = self
                .books
                .find_by_id(book_id)
                .await?
                .ok_or_else(|| CatalogError::not_found("Book", book_id))?;
            debug!(book_id, current = %current.status, "Lending transition lost a concurrent update");
            return Ok(TransitionOutcome::Rejected {
                action,
                current: current.status,
            });
        }

        info!(
            book_id,
            from = %book.status,
            to = %next.status,
            borrowed_until = ?next.borrowed_until,
            "Lending transition applied"
        );

        Ok(TransitionOutcome::Applied(Book {
            status: next.status,
            borrowed_until: next.borrowed_until,
            updated_at: now.timestamp(),
            ..book
        }))
    }
}
