//! Shared fixtures for service integration tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_catalog::models::{Author, NewBook};
use core_catalog::{FilterParams, FixedClock, SearchParams};
use core_runtime::CatalogConfig;
use core_service::CatalogService;
use std::sync::Arc;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// In-memory catalog on a clock pinned at [`start_time`].
pub async fn test_service() -> (CatalogService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(start_time()));
    let config = CatalogConfig::builder().in_memory().build().unwrap();
    let service = CatalogService::with_clock(config, clock.clone())
        .await
        .unwrap();
    (service, clock)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn new_book(title: &str, isbn: &str, authors: &[&Author]) -> NewBook {
    NewBook::new(
        title,
        isbn,
        date(1965, 8, 1),
        authors.iter().map(|a| a.id.clone()).collect(),
    )
}

pub fn search_params(filter: FilterParams) -> SearchParams {
    SearchParams {
        filter,
        ..SearchParams::default()
    }
}
