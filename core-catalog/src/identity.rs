//! Copy identity resolution.
//!
//! A *work* is identified by `(title, isbn, author set)`. Every record is one
//! physical copy of a work and carries a `copy_number` that is unique inside
//! the work. An ISBN belongs to exactly one author set for a given title:
//! reusing `(title, isbn)` with a different set of authors is rejected unless
//! a copy with the exact same author set already exists.
//!
//! The decision functions here are pure. Record lookup goes through the
//! [`CopyLookup`] capability so callers decide where the data comes from
//! (the SQLite repository in production, a mock in tests).

use crate::error::{CatalogError, Result, ValidationErrors};
use crate::models::{normalize_author_ids, NewBook};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Message attached to `isbn` when the identity check fails.
pub const ISBN_TAKEN: &str = "has already been taken";

/// Identity of a record that is about to be created or edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub isbn: String,
    /// Sorted, de-duplicated
    pub author_ids: Vec<String>,
}

impl Candidate {
    pub fn new<I>(title: &str, isbn: &str, author_ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            title: title.trim().to_string(),
            isbn: isbn.trim().to_string(),
            author_ids: normalize_author_ids(author_ids),
        }
    }

    pub fn from_new_book(new_book: &NewBook) -> Self {
        Self::new(
            &new_book.title,
            &new_book.isbn,
            new_book.author_ids.iter().cloned(),
        )
    }
}

/// Existing record sharing a candidate's `(title, isbn)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingCopy {
    pub id: String,
    pub title: String,
    pub isbn: String,
    pub copy_number: i64,
    /// Sorted, de-duplicated
    pub author_ids: Vec<String>,
}

impl ExistingCopy {
    fn is_same_work(&self, candidate: &Candidate) -> bool {
        self.title == candidate.title
            && self.isbn == candidate.isbn
            && self.author_ids == candidate.author_ids
    }
}

/// Outcome of the uniqueness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityCheck {
    /// Nothing else uses this `(title, isbn)`.
    Unique,
    /// Another copy of the very same work exists.
    DuplicateOfExistingCopy,
    /// The `(title, isbn)` belongs to a different author set.
    ConflictsWithDifferentBook,
}

impl IdentityCheck {
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, IdentityCheck::ConflictsWithDifferentBook)
    }

    /// Collapse into the validator result (`isbn` taken on conflict).
    pub fn into_result(self) -> Result<()> {
        if self.is_acceptable() {
            return Ok(());
        }
        let mut errors = ValidationErrors::new();
        errors.add("isbn", ISBN_TAKEN);
        Err(CatalogError::Validation(errors))
    }
}

/// Classify `candidate` against the records that share its `(title, isbn)`.
///
/// `excluding_id` is the record being edited, which never counts against
/// itself. An exact author-set match wins over any number of mismatches.
pub fn classify(
    candidate: &Candidate,
    excluding_id: Option<&str>,
    existing: &[ExistingCopy],
) -> IdentityCheck {
    let mut others = existing
        .iter()
        .filter(|copy| Some(copy.id.as_str()) != excluding_id)
        .filter(|copy| copy.title == candidate.title && copy.isbn == candidate.isbn)
        .peekable();

    if others.peek().is_none() {
        return IdentityCheck::Unique;
    }

    if others.any(|copy| copy.author_ids == candidate.author_ids) {
        IdentityCheck::DuplicateOfExistingCopy
    } else {
        IdentityCheck::ConflictsWithDifferentBook
    }
}

/// Copy number for a new record: one past the highest copy of the same work.
pub fn next_copy_number(candidate: &Candidate, existing: &[ExistingCopy]) -> i64 {
    if candidate.author_ids.is_empty() {
        return 1;
    }

    existing
        .iter()
        .filter(|copy| copy.is_same_work(candidate))
        .map(|copy| copy.copy_number)
        .max()
        .map_or(1, |max| max + 1)
}

/// Source of the records sharing a `(title, isbn)`.
#[async_trait]
pub trait CopyLookup: Send + Sync {
    /// All records with exactly this title and isbn, with their author ids.
    async fn copies_of(&self, title: &str, isbn: &str) -> Result<Vec<ExistingCopy>>;
}

/// Identity decision for a record about to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyAssignment {
    pub check: IdentityCheck,
    pub copy_number: i64,
}

/// Runs the identity rules against an injected [`CopyLookup`].
///
/// The resolver never writes. Callers must hold the identity-group lock
/// across [`IdentityResolver::assign`] and the insert.
#[derive(Clone)]
pub struct IdentityResolver {
    lookup: Arc<dyn CopyLookup>,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn CopyLookup>) -> Self {
        Self { lookup }
    }

    /// Uniqueness check only, for edits of an existing record.
    pub async fn check(
        &self,
        candidate: &Candidate,
        excluding_id: Option<&str>,
    ) -> Result<IdentityCheck> {
        let existing = self
            .lookup
            .copies_of(&candidate.title, &candidate.isbn)
            .await?;
        Ok(classify(candidate, excluding_id, &existing))
    }

    /// Uniqueness check plus copy number for a new record.
    ///
    /// # Errors
    ///
    /// `CatalogError::Validation` with `isbn` taken when the candidate clashes
    /// with a different work.
    pub async fn assign(&self, candidate: &Candidate) -> Result<CopyAssignment> {
        let existing = self
            .lookup
            .copies_of(&candidate.title, &candidate.isbn)
            .await?;

        let check = classify(candidate, None, &existing);
        check.into_result()?;

        let copy_number = next_copy_number(candidate, &existing);
        debug!(
            title = %candidate.title,
            isbn = %candidate.isbn,
            ?check,
            copy_number,
            "Resolved copy identity"
        );

        Ok(CopyAssignment { check, copy_number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        pub Lookup {}

        #[async_trait]
        impl CopyLookup for Lookup {
            async fn copies_of(&self, title: &str, isbn: &str) -> Result<Vec<ExistingCopy>>;
        }
    }

    fn candidate(authors: &[&str]) -> Candidate {
        Candidate::new(
            "Dune",
            "978-0441013593",
            authors.iter().map(|a| a.to_string()),
        )
    }

    fn copy(id: &str, copy_number: i64, authors: &[&str]) -> ExistingCopy {
        ExistingCopy {
            id: id.to_string(),
            title: "Dune".to_string(),
            isbn: "978-0441013593".to_string(),
            copy_number,
            author_ids: normalize_author_ids(authors.iter().map(|a| a.to_string())),
        }
    }

    #[test]
    fn no_existing_records_is_unique() {
        assert_eq!(classify(&candidate(&["a1"]), None, &[]), IdentityCheck::Unique);
        assert_eq!(next_copy_number(&candidate(&["a1"]), &[]), 1);
    }

    #[test]
    fn author_order_does_not_matter() {
        let existing = vec![copy("b1", 1, &["a2", "a1"])];
        assert_eq!(
            classify(&candidate(&["a1", "a2"]), None, &existing),
            IdentityCheck::DuplicateOfExistingCopy
        );
        assert_eq!(next_copy_number(&candidate(&["a1", "a2"]), &existing), 2);
    }

    #[test]
    fn different_author_set_conflicts() {
        let existing = vec![copy("b1", 1, &["a1"])];
        let check = classify(&candidate(&["a2"]), None, &existing);
        assert_eq!(check, IdentityCheck::ConflictsWithDifferentBook);

        match check.into_result() {
            Err(CatalogError::Validation(errors)) => {
                assert_eq!(errors.messages("isbn"), [ISBN_TAKEN]);
            }
            other => panic!("expected isbn validation error, got {:?}", other),
        }
    }

    #[test]
    fn exact_match_wins_over_mismatching_records() {
        let existing = vec![copy("b1", 1, &["a1"]), copy("b2", 4, &["a2"])];
        assert_eq!(
            classify(&candidate(&["a2"]), None, &existing),
            IdentityCheck::DuplicateOfExistingCopy
        );
        // Only copies of the same work count towards the next number.
        assert_eq!(next_copy_number(&candidate(&["a1"]), &existing), 2);
        assert_eq!(next_copy_number(&candidate(&["a2"]), &existing), 5);
    }

    #[test]
    fn edited_record_does_not_conflict_with_itself() {
        let existing = vec![copy("b1", 1, &["a1"])];
        assert_eq!(
            classify(&candidate(&["a2"]), Some("b1"), &existing),
            IdentityCheck::Unique
        );
    }

    #[test]
    fn next_copy_number_uses_max_not_count() {
        let existing = vec![copy("b1", 1, &["a1"]), copy("b3", 3, &["a1"])];
        assert_eq!(next_copy_number(&candidate(&["a1"]), &existing), 4);
    }

    #[test]
    fn empty_author_set_short_circuits_to_one() {
        let existing = vec![copy("b1", 7, &[])];
        assert_eq!(next_copy_number(&candidate(&[]), &existing), 1);
    }

    #[tokio::test]
    async fn resolver_assigns_from_lookup() {
        let mut lookup = MockLookup::new();
        lookup
            .expect_copies_of()
            .with(eq("Dune"), eq("978-0441013593"))
            .times(1)
            .returning(|_, _| Ok(vec![copy("b1", 1, &["a1"]), copy("b2", 2, &["a1"])]));

        let resolver = IdentityResolver::new(Arc::new(lookup));
        let assignment = resolver.assign(&candidate(&["a1"])).await.unwrap();

        assert_eq!(assignment.check, IdentityCheck::DuplicateOfExistingCopy);
        assert_eq!(assignment.copy_number, 3);
    }

    #[tokio::test]
    async fn resolver_rejects_clashing_isbn() {
        let mut lookup = MockLookup::new();
        lookup
            .expect_copies_of()
            .returning(|_, _| Ok(vec![copy("b1", 1, &["a1"])]));

        let resolver = IdentityResolver::new(Arc::new(lookup));
        let result = resolver.assign(&candidate(&["a9"])).await;

        assert!(matches!(result, Err(CatalogError::Validation(_))));
    }

    #[tokio::test]
    async fn resolver_propagates_lookup_failures() {
        let mut lookup = MockLookup::new();
        lookup
            .expect_copies_of()
            .returning(|_, _| Err(CatalogError::Database(sqlx::Error::PoolTimedOut)));

        let resolver = IdentityResolver::new(Arc::new(lookup));
        let result = resolver.check(&candidate(&["a1"]), None).await;

        assert!(matches!(result, Err(CatalogError::Database(_))));
    }
}
