//! Catalog search: filter validation and SQL composition.
//!
//! Raw `filter[...]`, `sort`, `page` and `per_page` values arrive as optional
//! strings. [`CatalogQuery::from_params`] validates them into typed filters,
//! and [`build_book_query_spec`] turns the filters into one `SELECT` plus a
//! matching `COUNT(*)`. Filters combine with AND; tokens of a multi-value
//! filter combine with OR.

use crate::error::{CatalogError, Result};
use crate::models::{LendingStatus, DATE_FORMAT};
use crate::repositories::PageRequest;
use crate::sort::{SortField, SortSpec};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound on comma-separated tokens per multi-value filter.
pub const MAX_FILTER_TOKENS: usize = 10;

pub const MISSING_FILTER: &str = "At least one search parameter is required";
pub const INVALID_STATUS: &str = "Invalid status. Must be one of: available, borrowed, reserved";
pub const INVALID_BORROWED_UNTIL: &str = "Invalid date format for borrowed_until. Use YYYY-MM-DD";

/// Raw `filter[...]` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParams {
    pub q: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub status: Option<String>,
    pub borrowed_until: Option<String>,
}

impl FilterParams {
    fn has_any_key(&self) -> bool {
        self.q.is_some()
            || self.title.is_some()
            || self.author.is_some()
            || self.isbn.is_some()
            || self.status.is_some()
            || self.borrowed_until.is_some()
    }
}

/// Raw search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub filter: FilterParams,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

/// Validated filters. Empty fields contribute no predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Free text matched against title, author names and isbn
    pub text: Option<String>,
    pub titles: Vec<String>,
    pub authors: Vec<String>,
    pub isbns: Vec<String>,
    pub status: Option<LendingStatus>,
    /// Copies that are free or due back on or before this date
    pub available_by: Option<NaiveDate>,
}

impl CatalogFilter {
    /// Validate the raw filter keys.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no key is present, a multi-value filter has more
    /// than [`MAX_FILTER_TOKENS`] tokens, the status is unknown, or the date
    /// is not `YYYY-MM-DD`.
    pub fn from_params(params: &FilterParams) -> Result<Self> {
        if !params.has_any_key() {
            return Err(CatalogError::invalid_input("filter", MISSING_FILTER));
        }

        let text = params.q.as_deref().and_then(clean_free_text);
        let titles = split_tokens("title", params.title.as_deref())?;
        let authors = split_tokens("author", params.author.as_deref())?;
        let isbns = split_tokens("isbn", params.isbn.as_deref())?;

        let status = params
            .status
            .as_deref()
            .map(|raw| {
                raw.parse::<LendingStatus>()
                    .map_err(|_| CatalogError::invalid_input("status", INVALID_STATUS))
            })
            .transpose()?;

        let available_by = params
            .borrowed_until
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
                    CatalogError::invalid_input("borrowed_until", INVALID_BORROWED_UNTIL)
                })
            })
            .transpose()?;

        Ok(Self {
            text,
            titles,
            authors,
            isbns,
            status,
            available_by,
        })
    }

    /// True when no predicate would be emitted.
    pub fn matches_everything(&self) -> bool {
        self.text.is_none()
            && self.titles.is_empty()
            && self.authors.is_empty()
            && self.isbns.is_empty()
            && self.status.is_none()
            && self.available_by.is_none()
    }
}

/// Fully validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub filter: CatalogFilter,
    pub sort: SortSpec,
    pub page: PageRequest,
}

impl CatalogQuery {
    /// Validate filters, then sort, then pagination.
    pub fn from_params(params: &SearchParams) -> Result<Self> {
        let filter = CatalogFilter::from_params(&params.filter)?;
        let sort = SortSpec::parse(params.sort.as_deref())?;
        let page = PageRequest::parse(params.page.as_deref(), params.per_page.as_deref())?;
        Ok(Self { filter, sort, page })
    }
}

/// Strip one pair of surrounding quotes; blank text means "no predicate".
fn clean_free_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let unquoted = unquoted
        .strip_suffix(['"', '\''])
        .unwrap_or(unquoted)
        .trim();

    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}

fn split_tokens(field: &str, raw: Option<&str>) -> Result<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let tokens: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();

    if tokens.len() > MAX_FILTER_TOKENS {
        return Err(CatalogError::invalid_input(
            field,
            format!(
                "Too many {} filters. Maximum {} allowed.",
                field, MAX_FILTER_TOKENS
            ),
        ));
    }

    Ok(tokens)
}

// =============================================================================
// SQL composition
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BindValue {
    Text(String),
    I64(i64),
}

#[derive(Debug, Clone)]
pub(crate) struct BookQuerySpec {
    pub select_sql: String,
    pub count_sql: String,
    pub binds: Vec<BindValue>,
}

const BOOK_COLUMNS: &str = "b.id, b.title, b.isbn, b.copy_number, b.published_date, \
     b.status, b.borrowed_until, b.created_at, b.updated_at";

const FIRST_AUTHOR_NAME: &str = "(SELECT a.name FROM book_authors ba \
     INNER JOIN authors a ON a.id = ba.author_id \
     WHERE ba.book_id = b.id \
     ORDER BY a.name COLLATE NOCASE ASC LIMIT 1) AS first_author_name";

const AUTHOR_NAME_EXISTS: &str = "EXISTS (SELECT 1 FROM book_authors ba \
     INNER JOIN authors a ON a.id = ba.author_id \
     WHERE ba.book_id = b.id AND ({}))";

/// `%token%` with LIKE wildcards escaped.
///
/// Folds ASCII only, matching SQLite's `LOWER()`; other characters compare
/// as written.
fn like_pattern(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len() + 2);
    escaped.push('%');
    for ch in token.to_ascii_lowercase().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn like(column: &str) -> String {
    format!("LOWER({}) LIKE ? ESCAPE '\\'", column)
}

fn author_exists(inner: &str) -> String {
    AUTHOR_NAME_EXISTS.replace("{}", inner)
}

/// OR of substring matches of `column` against each token.
fn any_token(column: &str, tokens: &[String], binds: &mut Vec<BindValue>) -> String {
    let clauses: Vec<String> = tokens
        .iter()
        .map(|token| {
            binds.push(BindValue::Text(like_pattern(token)));
            like(column)
        })
        .collect();
    format!("({})", clauses.join(" OR "))
}

pub(crate) fn build_book_query_spec(filter: &CatalogFilter, sort: &SortSpec) -> BookQuerySpec {
    let mut conditions: Vec<String> = Vec::new();
    let mut binds = Vec::new();

    if let Some(text) = &filter.text {
        let pattern = like_pattern(text);
        conditions.push(format!(
            "({} OR {} OR {})",
            like("b.title"),
            author_exists(&like("a.name")),
            like("b.isbn")
        ));
        binds.push(BindValue::Text(pattern.clone()));
        binds.push(BindValue::Text(pattern.clone()));
        binds.push(BindValue::Text(pattern));
    }

    if !filter.titles.is_empty() {
        conditions.push(any_token("b.title", &filter.titles, &mut binds));
    }

    if !filter.authors.is_empty() {
        let inner = any_token("a.name", &filter.authors, &mut binds);
        conditions.push(author_exists(&inner));
    }

    if !filter.isbns.is_empty() {
        conditions.push(any_token("b.isbn", &filter.isbns, &mut binds));
    }

    if let Some(status) = filter.status {
        conditions.push("b.status = ?".to_string());
        binds.push(BindValue::I64(status.ordinal()));
    }

    if let Some(date) = filter.available_by {
        let cutoff = date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc().timestamp())
            .unwrap_or_default();
        conditions.push("(b.borrowed_until IS NULL OR b.borrowed_until <= ?)".to_string());
        binds.push(BindValue::I64(cutoff));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let mut select_sql = format!("SELECT {}", BOOK_COLUMNS);
    if sort.uses(SortField::Author) {
        select_sql.push_str(", ");
        select_sql.push_str(FIRST_AUTHOR_NAME);
    }
    select_sql.push_str(" FROM books b");
    select_sql.push_str(&where_clause);
    select_sql.push_str(" ORDER BY ");
    select_sql.push_str(&sort.order_by_sql());

    let count_sql = format!("SELECT COUNT(*) AS count FROM books b{}", where_clause);

    BookQuerySpec {
        select_sql,
        count_sql,
        binds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(configure: impl FnOnce(&mut FilterParams)) -> Result<CatalogFilter> {
        let mut params = FilterParams::default();
        configure(&mut params);
        CatalogFilter::from_params(&params)
    }

    fn message(result: Result<CatalogFilter>) -> String {
        result.unwrap_err().client_message()
    }

    #[test]
    fn requires_at_least_one_filter_key() {
        assert_eq!(message(filter(|_| {})), MISSING_FILTER);
    }

    #[test]
    fn blank_free_text_counts_as_present_but_matches_everything() {
        let parsed = filter(|p| p.q = Some("   ".into())).unwrap();
        assert!(parsed.matches_everything());

        let parsed = filter(|p| p.q = Some("\"\"".into())).unwrap();
        assert!(parsed.matches_everything());
    }

    #[test]
    fn quoted_free_text_is_unquoted() {
        let double = filter(|p| p.q = Some("\"Python\"".into())).unwrap();
        let single = filter(|p| p.q = Some("'Python'".into())).unwrap();
        let bare = filter(|p| p.q = Some("Python".into())).unwrap();
        assert_eq!(double, bare);
        assert_eq!(single, bare);
        assert_eq!(bare.text.as_deref(), Some("Python"));
    }

    #[test]
    fn multi_value_filters_are_split_and_cleaned() {
        let parsed = filter(|p| p.title = Some(" Dune , ,Emma,".into())).unwrap();
        assert_eq!(parsed.titles, vec!["Dune".to_string(), "Emma".to_string()]);
    }

    #[test]
    fn empty_multi_value_filter_contributes_no_predicate() {
        let parsed = filter(|p| p.title = Some(",,".into())).unwrap();
        assert!(parsed.titles.is_empty());
        assert!(parsed.matches_everything());
    }

    #[test]
    fn eleven_tokens_are_too_many() {
        let tokens = (1..=11).map(|i| format!("t{}", i)).collect::<Vec<_>>().join(",");
        let err = message(filter(|p| p.title = Some(tokens.clone())));
        assert_eq!(err, "Too many title filters. Maximum 10 allowed.");

        let err = message(filter(|p| p.author = Some(tokens)));
        assert!(err.contains("Maximum 10"));
        assert!(err.contains("author"));

        let ten = (1..=10).map(|i| format!("t{}", i)).collect::<Vec<_>>().join(",");
        assert_eq!(filter(|p| p.isbn = Some(ten)).unwrap().isbns.len(), 10);
    }

    #[test]
    fn status_must_be_exact() {
        assert_eq!(
            filter(|p| p.status = Some("borrowed".into())).unwrap().status,
            Some(LendingStatus::Borrowed)
        );
        assert_eq!(message(filter(|p| p.status = Some("Borrowed".into()))), INVALID_STATUS);
        assert_eq!(message(filter(|p| p.status = Some("".into()))), INVALID_STATUS);
    }

    #[test]
    fn borrowed_until_must_be_iso_date() {
        let parsed = filter(|p| p.borrowed_until = Some("2024-02-29".into())).unwrap();
        assert_eq!(parsed.available_by, NaiveDate::from_ymd_opt(2024, 2, 29));

        for raw in ["2023-02-29", "29/02/2024", "tomorrow", ""] {
            assert_eq!(
                message(filter(|p| p.borrowed_until = Some(raw.into()))),
                INVALID_BORROWED_UNTIL,
                "{}",
                raw
            );
        }
    }

    #[test]
    fn query_validates_sort_and_pagination_after_filters() {
        let params = SearchParams {
            filter: FilterParams {
                q: Some("dune".into()),
                ..Default::default()
            },
            sort: Some("-status".into()),
            page: Some("2".into()),
            per_page: Some("5".into()),
        };
        let query = CatalogQuery::from_params(&params).unwrap();
        assert_eq!(query.page, PageRequest::new(2, 5));

        let bad_sort = SearchParams {
            sort: Some("rating".into()),
            ..params.clone()
        };
        assert!(CatalogQuery::from_params(&bad_sort)
            .unwrap_err()
            .client_message()
            .starts_with("Invalid sort field: rating"));
    }

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(like_pattern("100%_Py\\"), "%100\\%\\_py\\\\%");
        assert_eq!(like_pattern("ÉMILE"), "%Émile%");
    }

    #[test]
    fn spec_without_filters_has_no_where_clause() {
        let spec = build_book_query_spec(&CatalogFilter::default(), &SortSpec::default());
        assert!(!spec.select_sql.contains("WHERE"));
        assert_eq!(spec.count_sql, "SELECT COUNT(*) AS count FROM books b");
        assert!(spec.binds.is_empty());
    }

    #[test]
    fn spec_ands_filters_and_ors_tokens() {
        let parsed = filter(|p| {
            p.title = Some("dune,emma".into());
            p.status = Some("available".into());
        })
        .unwrap();
        let spec = build_book_query_spec(&parsed, &SortSpec::default());

        assert!(spec.count_sql.contains(
            "WHERE (LOWER(b.title) LIKE ? ESCAPE '\\' OR LOWER(b.title) LIKE ? ESCAPE '\\') \
             AND b.status = ?"
        ));
        assert_eq!(
            spec.binds,
            vec![
                BindValue::Text("%dune%".into()),
                BindValue::Text("%emma%".into()),
                BindValue::I64(0),
            ]
        );
    }

    #[test]
    fn author_sort_selects_first_author_name() {
        let parsed = filter(|p| p.q = Some("x".into())).unwrap();
        let spec = build_book_query_spec(&parsed, &SortSpec::parse(Some("author")).unwrap());
        assert!(spec.select_sql.contains("AS first_author_name"));
        assert!(!spec.count_sql.contains("first_author_name"));
    }
}
