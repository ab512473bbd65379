//! Pagination helper types for repository queries

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

pub const INVALID_PAGE: &str = "Page must be a positive integer";
pub const INVALID_PER_PAGE: &str = "Per page must be between 1 and 100";

/// Pagination request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl PageRequest {
    /// Create a new page request
    ///
    /// # Examples
    ///
    /// ```
    /// use core_catalog::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(2, 20);
    /// assert_eq!(request.offset(), 20);
    /// assert_eq!(request.limit(), 20);
    /// ```
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Validate raw `page` / `per_page` query values.
    ///
    /// Missing or blank values take the defaults. Fractional numbers are
    /// truncated toward zero before the range check.
    ///
    /// # Errors
    ///
    /// `InvalidInput` with a fixed message per field.
    pub fn parse(page: Option<&str>, per_page: Option<&str>) -> Result<Self> {
        let page = match non_blank(page) {
            None => DEFAULT_PAGE,
            Some(raw) => parse_truncated(raw)
                .filter(|value| *value >= 1 && *value <= i64::from(u32::MAX))
                .map(|value| value as u32)
                .ok_or_else(|| CatalogError::invalid_input("page", INVALID_PAGE))?,
        };

        let per_page = match non_blank(per_page) {
            None => DEFAULT_PER_PAGE,
            Some(raw) => parse_truncated(raw)
                .filter(|value| (1..=i64::from(MAX_PER_PAGE)).contains(value))
                .map(|value| value as u32)
                .ok_or_else(|| CatalogError::invalid_input("per_page", INVALID_PER_PAGE))?,
        };

        Ok(Self { page, per_page })
    }

    /// Calculate the SQL OFFSET value
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Get the LIMIT value (same as per_page)
    pub fn limit(&self) -> u32 {
        self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_truncated(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value.trunc() as i64)
}

/// Page metadata exposed next to the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total_count: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl PageMeta {
    pub fn new(total_count: u64, request: PageRequest) -> Self {
        let total_pages = if request.per_page == 0 {
            0
        } else {
            total_count.div_ceil(u64::from(request.per_page))
        };

        Self {
            current_page: request.page,
            per_page: request.per_page,
            total_count,
            total_pages,
            has_next_page: u64::from(request.page) < total_pages,
            has_previous_page: request.page > 1,
        }
    }
}

/// Paginated response containing items and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Position of this page within the full result
    pub meta: PageMeta,
}

impl<T> Page<T> {
    /// Create a new paginated response
    ///
    /// # Examples
    ///
    /// ```
    /// use core_catalog::repositories::{Page, PageRequest};
    ///
    /// let page = Page::new(vec![1, 2, 3], 25, PageRequest::new(1, 10));
    ///
    /// assert_eq!(page.items.len(), 3);
    /// assert_eq!(page.meta.total_count, 25);
    /// assert_eq!(page.meta.total_pages, 3);
    /// assert!(page.has_next());
    /// ```
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            meta: PageMeta::new(total, request),
        }
    }

    /// Check if there are more pages after the current one
    pub fn has_next(&self) -> bool {
        self.meta.has_next_page
    }

    /// Check if there are pages before the current one
    pub fn has_previous(&self) -> bool {
        self.meta.has_previous_page
    }

    /// Map the items to a different type
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}
