//! Integration tests for catalog search, sorting and pagination

mod common;

use common::{date, new_book, search_params, test_service};
use core_catalog::{CatalogError, FilterParams, LendingStatus, NewBook, SearchParams};
use core_service::{CatalogService, CoreError};
use std::collections::HashSet;

async fn seed_classics(service: &CatalogService) {
    let herbert = service.create_author("Frank Herbert").await.unwrap();
    let austen = service.create_author("Jane Austen").await.unwrap();
    let bronte = service.create_author("Charlotte Bronte").await.unwrap();

    service
        .create_book(new_book("Dune", "9780441013593", &[&herbert]))
        .await
        .unwrap();
    service
        .create_book(new_book("Emma", "9780141439587", &[&austen]))
        .await
        .unwrap();
    service
        .create_book(new_book("Jane Eyre", "9780141441146", &[&bronte]))
        .await
        .unwrap();
}

fn titles(service_response: &core_catalog::SearchResponse) -> Vec<&str> {
    service_response
        .books
        .iter()
        .map(|b| b.title.as_str())
        .collect()
}

fn invalid_input(err: CoreError) -> String {
    match err {
        CoreError::Catalog(err @ CatalogError::InvalidInput { .. }) => err.client_message(),
        other => panic!("expected invalid input, got {:?}", other),
    }
}

#[tokio::test]
async fn test_search_requires_a_filter() {
    let (service, _clock) = test_service().await;

    let err = service.search(&SearchParams::default()).await.unwrap_err();
    assert_eq!(invalid_input(err), "At least one search parameter is required");
}

#[tokio::test]
async fn test_blank_or_quoted_q_matches_everything() {
    let (service, _clock) = test_service().await;
    seed_classics(&service).await;

    for q in ["", "\"\"", "''"] {
        let response = service
            .search(&search_params(FilterParams {
                q: Some(q.into()),
                ..FilterParams::default()
            }))
            .await
            .unwrap();
        assert_eq!(response.pagination.total_count, 3, "q = {:?}", q);
    }
}

#[tokio::test]
async fn test_q_matches_title_author_or_isbn() {
    let (service, _clock) = test_service().await;
    seed_classics(&service).await;

    let search_q = |q: &str| {
        search_params(FilterParams {
            q: Some(q.into()),
            ..FilterParams::default()
        })
    };

    // "jane" hits the title "Jane Eyre" and the author "Jane Austen".
    let response = service.search(&search_q("\"jane\"")).await.unwrap();
    assert_eq!(titles(&response), vec!["Emma", "Jane Eyre"]);

    let response = service.search(&search_q("0441013")).await.unwrap();
    assert_eq!(titles(&response), vec!["Dune"]);
}

#[tokio::test]
async fn test_multi_value_filters_are_or_ed_and_combined_with_and() {
    let (service, _clock) = test_service().await;
    seed_classics(&service).await;

    let response = service
        .search(&search_params(FilterParams {
            title: Some(" dune , , emma ".into()),
            ..FilterParams::default()
        }))
        .await
        .unwrap();
    assert_eq!(titles(&response), vec!["Dune", "Emma"]);

    let response = service
        .search(&search_params(FilterParams {
            title: Some("dune,emma".into()),
            author: Some("austen".into()),
            ..FilterParams::default()
        }))
        .await
        .unwrap();
    assert_eq!(titles(&response), vec!["Emma"]);
}

#[tokio::test]
async fn test_too_many_title_tokens() {
    let (service, _clock) = test_service().await;

    let tokens: Vec<String> = (0..11).map(|i| format!("t{}", i)).collect();
    let err = service
        .search(&search_params(FilterParams {
            title: Some(tokens.join(",")),
            ..FilterParams::default()
        }))
        .await
        .unwrap_err();

    assert_eq!(
        invalid_input(err),
        "Too many title filters. Maximum 10 allowed."
    );
}

#[tokio::test]
async fn test_invalid_status_and_date_are_rejected() {
    let (service, _clock) = test_service().await;

    let err = service
        .search(&search_params(FilterParams {
            status: Some("lost".into()),
            ..FilterParams::default()
        }))
        .await
        .unwrap_err();
    assert_eq!(
        invalid_input(err),
        "Invalid status. Must be one of: available, borrowed, reserved"
    );

    let err = service
        .search(&search_params(FilterParams {
            borrowed_until: Some("03/01/2024".into()),
            ..FilterParams::default()
        }))
        .await
        .unwrap_err();
    assert_eq!(
        invalid_input(err),
        "Invalid date format for borrowed_until. Use YYYY-MM-DD"
    );
}

#[tokio::test]
async fn test_status_and_due_date_filters() {
    let (service, _clock) = test_service().await;
    seed_classics(&service).await;

    let all = service
        .search(&search_params(FilterParams {
            q: Some(String::new()),
            ..FilterParams::default()
        }))
        .await
        .unwrap();
    let dune = all.books.iter().find(|b| b.title == "Dune").unwrap();
    let emma = all.books.iter().find(|b| b.title == "Emma").unwrap();
    service.borrow(&dune.id).await.unwrap();
    service.reserve(&emma.id).await.unwrap();

    let borrowed = service
        .search(&search_params(FilterParams {
            status: Some("borrowed".into()),
            ..FilterParams::default()
        }))
        .await
        .unwrap();
    assert_eq!(titles(&borrowed), vec!["Dune"]);
    assert_eq!(borrowed.books[0].status, LendingStatus::Borrowed);

    // Emma is due 2024-03-02 12:00, Dune 2024-03-08 12:00.
    let due_by = |day: &str| {
        search_params(FilterParams {
            borrowed_until: Some(day.into()),
            ..FilterParams::default()
        })
    };
    let response = service.search(&due_by("2024-03-03")).await.unwrap();
    assert_eq!(titles(&response), vec!["Emma", "Jane Eyre"]);

    let response = service.search(&due_by("2024-03-02")).await.unwrap();
    assert_eq!(titles(&response), vec!["Jane Eyre"]);
}

#[tokio::test]
async fn test_sort_by_status_then_title_descending() {
    let (service, _clock) = test_service().await;
    seed_classics(&service).await;

    let all = service
        .search(&search_params(FilterParams {
            q: Some(String::new()),
            ..FilterParams::default()
        }))
        .await
        .unwrap();
    for view in &all.books {
        match view.title.as_str() {
            "Dune" => {
                service.reserve(&view.id).await.unwrap();
            }
            "Emma" => {
                service.borrow(&view.id).await.unwrap();
            }
            _ => {}
        }
    }

    let response = service
        .search(&SearchParams {
            filter: FilterParams {
                q: Some(String::new()),
                ..FilterParams::default()
            },
            sort: Some("status,-title".into()),
            ..SearchParams::default()
        })
        .await
        .unwrap();

    assert_eq!(titles(&response), vec!["Jane Eyre", "Emma", "Dune"]);
}

#[tokio::test]
async fn test_unknown_sort_field() {
    let (service, _clock) = test_service().await;

    let err = service
        .search(&SearchParams {
            filter: FilterParams {
                q: Some(String::new()),
                ..FilterParams::default()
            },
            sort: Some("title,rating".into()),
            ..SearchParams::default()
        })
        .await
        .unwrap_err();

    assert!(invalid_input(err).starts_with("Invalid sort field: rating."));
}

#[tokio::test]
async fn test_pages_are_disjoint_and_past_end_is_empty() {
    let (service, _clock) = test_service().await;
    let author = service.create_author("Anonymous").await.unwrap();
    for i in 1..=15 {
        service
            .create_book(NewBook::new(
                format!("Book {:02}", i),
                format!("isbn-{}", i),
                date(2000, 1, 1),
                vec![author.id.clone()],
            ))
            .await
            .unwrap();
    }

    let page = |page: &str| SearchParams {
        filter: FilterParams {
            title: Some("book".into()),
            ..FilterParams::default()
        },
        page: Some(page.into()),
        per_page: Some("5".into()),
        ..SearchParams::default()
    };

    let first = service.search(&page("1")).await.unwrap();
    let second = service.search(&page("2")).await.unwrap();
    assert_eq!(titles(&first), vec!["Book 01", "Book 02", "Book 03", "Book 04", "Book 05"]);

    let first_ids: HashSet<_> = first.books.iter().map(|b| b.id.clone()).collect();
    assert!(second.books.iter().all(|b| !first_ids.contains(&b.id)));
    assert_eq!(first.pagination.total_pages, 3);
    assert!(first.pagination.has_next_page);
    assert!(!first.pagination.has_previous_page);

    let past_end = service.search(&page("4")).await.unwrap();
    assert!(past_end.books.is_empty());
    assert_eq!(past_end.pagination.current_page, 4);
    assert_eq!(past_end.pagination.total_count, 15);
    assert_eq!(past_end.pagination.total_pages, 3);
    assert!(!past_end.pagination.has_next_page);
    assert!(past_end.pagination.has_previous_page);
}

#[tokio::test]
async fn test_invalid_pagination() {
    let (service, _clock) = test_service().await;

    let params = |page: &str, per_page: &str| SearchParams {
        filter: FilterParams {
            q: Some(String::new()),
            ..FilterParams::default()
        },
        page: Some(page.into()),
        per_page: Some(per_page.into()),
        ..SearchParams::default()
    };

    let err = service.search(&params("0", "20")).await.unwrap_err();
    assert_eq!(invalid_input(err), "Page must be a positive integer");

    let err = service.search(&params("1", "101")).await.unwrap_err();
    assert_eq!(invalid_input(err), "Per page must be between 1 and 100");
}
