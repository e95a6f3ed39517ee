//! Tests for the generic CRUD endpoints

mod common;

use common::{create_record, create_test_app};
use serde_json::{json, Value};

#[tokio::test]
async fn test_create_and_get_by_id() {
    let app = create_test_app();
    let id = create_record(&app, "courses", json!({ "title": "Rust 101", "price": "499" })).await;

    let response = app.server.get(&format!("/api/courses/{}", id)).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], 200);
    assert_eq!(body["data"]["title"], "Rust 101");
    // Numeric strings are coerced by the schema
    assert_eq!(body["data"]["price"], 499);
    assert!(body["data"]["createdAt"].is_string());
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn test_table_names_are_resolved_loosely() {
    let app = create_test_app();
    create_record(&app, "Job-Postings", json!({ "title": "Engineer", "company": "Acme" })).await;

    let response = app.server.get("/api/jobs").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_table_is_not_found() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/widgets")
        .json(&json!({ "name": "x" }))
        .await;
    assert_eq!(response.status_code(), 404);

    let body: Value = response.json();
    assert_eq!(body["status"], 404);
    assert!(body["data"].is_null());
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_missing_required_field_is_rejected() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/courses")
        .json(&json!({ "price": 10 }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_duplicate_unique_field_conflicts() {
    let app = create_test_app();
    create_record(&app, "courses", json!({ "title": "A", "slug": "rust" })).await;

    let response = app
        .server
        .post("/api/courses")
        .json(&json!({ "title": "B", "slug": "rust" }))
        .await;
    assert_eq!(response.status_code(), 409);
}

#[tokio::test]
async fn test_bulk_create_is_all_or_nothing() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/courses/bulk")
        .json(&json!([
            { "title": "One", "slug": "same" },
            { "title": "Two", "slug": "same" }
        ]))
        .await;
    assert_eq!(response.status_code(), 409);

    let response = app.server.get("/api/courses").await;
    let body: Value = response.json();
    assert!(body["data"].as_array().unwrap().is_empty());

    let response = app
        .server
        .post("/api/courses/bulk")
        .json(&json!([{ "title": "One" }, { "title": "Two" }]))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_filters_by_query_params() {
    let app = create_test_app();
    create_record(&app, "courses", json!({ "title": "A", "level": "beginner" })).await;
    create_record(&app, "courses", json!({ "title": "B", "level": "advanced" })).await;

    let response = app.server.get("/api/courses?level=beginner").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "A");
}

#[tokio::test]
async fn test_unknown_condition_field_is_rejected() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/courses/find")
        .json(&json!({ "filter": { "titel": "typo" } }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_find_one_not_found() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/courses/find-one")
        .json(&json!({ "filter": { "title": "missing" } }))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_paginated_search_returns_rows_and_count() {
    let app = create_test_app();
    for i in 0..5 {
        create_record(&app, "courses", json!({ "title": format!("Rust part {}", i) })).await;
    }
    create_record(&app, "courses", json!({ "title": "Go basics" })).await;

    let response = app
        .server
        .post("/api/courses/search")
        .json(&json!({
            "search": "RUST",
            "fields": ["title"],
            "page": 0,
            "pageSize": 2,
            "order": { "field": "title", "direction": "asc" }
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["data"]["count"], 5);
    let rows = body["data"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["title"], "Rust part 0");
    assert_eq!(rows[1]["title"], "Rust part 1");

    let response = app
        .server
        .post("/api/courses/search")
        .json(&json!({ "search": "rust", "page": 2, "pageSize": 2 }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_folds_non_ascii_case() {
    let app = create_test_app();
    create_record(&app, "courses", json!({ "title": "ÉCOLE de Rust" })).await;
    create_record(&app, "courses", json!({ "title": "Go basics" })).await;

    let response = app
        .server
        .post("/api/courses/search")
        .json(&json!({ "search": "école", "fields": ["title"] }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["rows"][0]["title"], "ÉCOLE de Rust");
}

#[tokio::test]
async fn test_search_rejects_zero_page_size() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/courses/search")
        .json(&json!({ "pageSize": 0 }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_search_page_size_is_capped() {
    let app = create_test_app();
    let many: Vec<Value> = (0..60).map(|i| json!({ "title": format!("c{}", i) })).collect();
    let response = app
        .server
        .post("/api/courses/bulk")
        .json(&Value::Array(many))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = app
        .server
        .post("/api/courses/search")
        .json(&json!({ "pageSize": 1000 }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["data"]["count"], 60);
    assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 50);
}

#[tokio::test]
async fn test_update_many_reports_counts() {
    let app = create_test_app();
    create_record(&app, "courses", json!({ "title": "A", "level": "beginner" })).await;
    create_record(&app, "courses", json!({ "title": "B", "level": "beginner" })).await;

    let response = app
        .server
        .patch("/api/courses")
        .json(&json!({ "filter": { "level": "beginner" }, "update": { "published": true } }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["matchedCount"], 2);
    assert_eq!(body["data"]["modifiedCount"], 2);
}

#[tokio::test]
async fn test_update_without_match_is_not_found() {
    let app = create_test_app();

    let response = app
        .server
        .patch("/api/courses")
        .json(&json!({ "filter": { "title": "ghost" }, "update": { "level": "x" } }))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_update_without_condition_is_rejected() {
    let app = create_test_app();
    create_record(&app, "courses", json!({ "title": "A" })).await;

    let response = app
        .server
        .patch("/api/courses")
        .json(&json!({ "filter": {}, "update": { "level": "x" } }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_update_by_id_returns_record() {
    let app = create_test_app();
    let id = create_record(&app, "courses", json!({ "title": "Old" })).await;

    let response = app
        .server
        .patch(&format!("/api/courses/{}", id))
        .json(&json!({ "title": "New" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["title"], "New");
    assert_eq!(body["data"]["_id"], id);
}

#[tokio::test]
async fn test_delete_by_id_then_missing() {
    let app = create_test_app();
    let id = create_record(&app, "courses", json!({ "title": "Doomed" })).await;

    let response = app.server.delete(&format!("/api/courses/{}", id)).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["deletedCount"], 1);

    let response = app.server.get(&format!("/api/courses/{}", id)).await;
    assert_eq!(response.status_code(), 404);

    let response = app.server.delete(&format!("/api/courses/{}", id)).await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_delete_many_by_condition() {
    let app = create_test_app();
    create_record(&app, "news", json!({ "title": "a", "published": false })).await;
    create_record(&app, "news", json!({ "title": "b", "published": false })).await;
    create_record(&app, "news", json!({ "title": "c", "published": true })).await;

    let response = app
        .server
        .delete("/api/news")
        .json(&json!({ "filter": { "published": false } }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["deletedCount"], 2);
}

#[tokio::test]
async fn test_secret_fields_never_returned() {
    let app = create_test_app();
    let id = create_record(
        &app,
        "users",
        json!({ "name": "Ann", "email": "ann@example.com", "password": "plaintext-pass" }),
    )
    .await;

    let response = app.server.get(&format!("/api/users/{}", id)).await;
    let body: Value = response.json();
    assert_eq!(body["data"]["email"], "ann@example.com");
    assert!(body["data"].get("password").is_none());

    // Secret fields cannot be queried either
    let response = app
        .server
        .post("/api/users/find")
        .json(&json!({ "filter": { "password": "plaintext-pass" } }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_populate_expands_references() {
    let app = create_test_app();
    let author = create_record(
        &app,
        "users",
        json!({ "name": "Ann", "email": "ann@example.com", "password": "plaintext-pass" }),
    )
    .await;
    let post = create_record(&app, "news", json!({ "title": "Hello", "author": author })).await;

    let response = app
        .server
        .get(&format!("/api/news/{}?populate=author", post))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["author"]["name"], "Ann");
    assert!(body["data"]["author"].get("password").is_none());
}

#[tokio::test]
async fn test_populate_keeps_dangling_id() {
    let app = create_test_app();
    let ghost = "00000000-0000-4000-8000-000000000000";
    create_record(&app, "news", json!({ "title": "Orphan", "author": ghost })).await;

    let response = app
        .server
        .post("/api/news/find")
        .json(&json!({ "filter": { "title": "Orphan" }, "populate": ["author"] }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"][0]["author"], ghost);
}

#[tokio::test]
async fn test_populate_rejects_non_relation() {
    let app = create_test_app();
    create_record(&app, "news", json!({ "title": "x" })).await;

    let response = app.server.get("/api/news?populate=title").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_malformed_json_uses_envelope() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/courses")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_health_and_unknown_route() {
    let app = create_test_app();

    let response = app.server.get("/api/health").await;
    assert_eq!(response.status_code(), 200);

    let response = app.server.get("/nope/at/all").await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["status"], 404);
}
