//! Tests for the SQLite backend, driven through the query service

use coursemart_api::query::{Order, SearchRequest};
use coursemart_api::store::{OtpStore, SqliteStore};
use coursemart_api::{ApiError, QueryService};
use coursemart_core::{SortDirection, Table};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn create_test_store() -> (SqliteStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.db");
    let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
    (store, dir) // Return dir to keep it alive
}

fn cond(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_create_and_find() {
    let (store, _dir) = create_test_store();
    let query = QueryService::new(&store, 4, 50);

    let created = query
        .create(Table::Courses, json!({ "title": "Rust", "tags": ["systems", "web"] }))
        .unwrap();
    let id = created["_id"].as_str().unwrap();

    let found = query
        .find_one(Table::Courses, cond(json!({ "_id": id })))
        .unwrap()
        .unwrap();
    assert_eq!(found["title"], "Rust");

    // List fields match on membership
    let rows = query
        .find_many(Table::Courses, cond(json!({ "tags": "web" })))
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_unique_conflict_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reopen.db");
    let path = path.to_str().unwrap();

    {
        let store = SqliteStore::open(path).unwrap();
        QueryService::new(&store, 4, 50)
            .create(
                Table::Users,
                json!({ "name": "A", "email": "a@example.com", "password": "password-one" }),
            )
            .unwrap();
    }

    let store = SqliteStore::open(path).unwrap();
    let err = QueryService::new(&store, 4, 50)
        .create(
            Table::Users,
            json!({ "name": "B", "email": "a@example.com", "password": "password-two" }),
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[test]
fn test_bulk_insert_is_atomic() {
    let (store, _dir) = create_test_store();
    let query = QueryService::new(&store, 4, 50);

    let err = query
        .bulk_create(
            Table::Courses,
            json!([{ "title": "A", "slug": "x" }, { "title": "B", "slug": "x" }]),
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert!(query.find_many(Table::Courses, Map::new()).unwrap().is_empty());
}

#[test]
fn test_search_paginates_with_count() {
    let (store, _dir) = create_test_store();
    let query = QueryService::new(&store, 4, 50);
    for i in 0..5 {
        query
            .create(Table::Jobs, json!({ "title": format!("Rust dev {}", i), "company": "Acme" }))
            .unwrap();
    }
    query
        .create(Table::Jobs, json!({ "title": "Chef", "company": "Diner" }))
        .unwrap();

    let page = query
        .search(
            Table::Jobs,
            SearchRequest {
                search: Some("rust DEV".to_string()),
                page: 0,
                page_size: 2,
                order: Some(Order {
                    field: Some("title".to_string()),
                    direction: SortDirection::Asc,
                }),
                ..SearchRequest::default()
            },
        )
        .unwrap();
    assert_eq!(page.count, 5);
    assert_eq!(page.rows.len(), 2);
    assert_eq!(page.rows[0]["title"], "Rust dev 0");
}

#[test]
fn test_search_escapes_like_wildcards() {
    let (store, _dir) = create_test_store();
    let query = QueryService::new(&store, 4, 50);
    query.create(Table::News, json!({ "title": "100% done" })).unwrap();
    query.create(Table::News, json!({ "title": "1000 things" })).unwrap();

    let page = query
        .search(
            Table::News,
            SearchRequest {
                search: Some("0%".to_string()),
                ..SearchRequest::default()
            },
        )
        .unwrap();
    assert_eq!(page.count, 1);
}

#[test]
fn test_search_folds_non_ascii_case() {
    let (store, _dir) = create_test_store();
    let query = QueryService::new(&store, 4, 50);
    query.create(Table::News, json!({ "title": "ÉCOLE de Rust" })).unwrap();
    query.create(Table::News, json!({ "title": "Straße ÜBER alles" })).unwrap();
    query.create(Table::News, json!({ "title": "Plain ascii" })).unwrap();

    for (term, expected) in [("école", 1), ("ÉCOLE", 1), ("über", 1), ("ÜBER", 1), ("e", 2)] {
        let page = query
            .search(
                Table::News,
                SearchRequest {
                    search: Some(term.to_string()),
                    fields: vec!["title".to_string()],
                    ..SearchRequest::default()
                },
            )
            .unwrap();
        assert_eq!(page.count, expected, "search for {}", term);
    }
}

#[test]
fn test_update_counts_matched_and_modified() {
    let (store, _dir) = create_test_store();
    let query = QueryService::new(&store, 4, 50);
    query
        .create(Table::Courses, json!({ "title": "A", "level": "beginner" }))
        .unwrap();
    query
        .create(Table::Courses, json!({ "title": "B", "level": "advanced" }))
        .unwrap();

    let outcome = query
        .update(
            Table::Courses,
            cond(json!({ "title": "A" })),
            json!({ "level": "beginner" }),
        )
        .unwrap();
    assert_eq!(outcome.matched_count, 1);
    assert_eq!(outcome.modified_count, 0);

    let deleted = query
        .delete(Table::Courses, cond(json!({ "level": "advanced" })))
        .unwrap();
    assert_eq!(deleted, 1);
}

#[test]
fn test_otp_single_use_and_expiry() {
    let (store, _dir) = create_test_store();

    store
        .store("a@example.com", "signup", "123456", json!({ "k": 1 }), chrono::Duration::minutes(5))
        .unwrap();
    assert!(store.verify("a@example.com", "signup", "654321").unwrap().is_none());
    assert_eq!(
        store.verify("A@Example.com", "signup", "123456").unwrap(),
        Some(json!({ "k": 1 }))
    );
    assert!(store.verify("a@example.com", "signup", "123456").unwrap().is_none());

    store
        .store("b@example.com", "signup", "111111", Value::Null, chrono::Duration::seconds(-1))
        .unwrap();
    assert!(store.verify("b@example.com", "signup", "111111").unwrap().is_none());
    assert_eq!(store.purge_expired().unwrap(), 1);
}

#[test]
fn test_otp_is_bound_to_its_purpose() {
    let (store, _dir) = create_test_store();
    let ttl = chrono::Duration::minutes(5);

    store
        .store("a@example.com", "password_reset", "123456", json!({ "k": 1 }), ttl)
        .unwrap();
    store
        .store("a@example.com", "signup", "222222", json!({ "k": 2 }), ttl)
        .unwrap();

    // Presenting the code to another flow neither succeeds nor burns it
    assert!(store.verify("a@example.com", "signup", "123456").unwrap().is_none());
    assert_eq!(
        store.verify("a@example.com", "password_reset", "123456").unwrap(),
        Some(json!({ "k": 1 }))
    );
    assert_eq!(
        store.verify("a@example.com", "signup", "222222").unwrap(),
        Some(json!({ "k": 2 }))
    );
}
