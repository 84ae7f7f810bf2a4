//! API integration tests
//!
//! Run the router in process over the in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use bookshelf_server::{
    api,
    config::{
        AppConfig, AuthConfig, DatabaseConfig, LendingConfig, LoggingConfig, ServerConfig,
        StorageBackend, StorageConfig,
    },
    models::{user::RealmAccess, UserClaims},
    repository::MemoryStore,
    AppState,
};

const SECRET: &str = "integration-secret";

fn app() -> Router {
    let config = AppConfig {
        server: ServerConfig::default(),
        database: DatabaseConfig::default(),
        storage: StorageConfig {
            backend: StorageBackend::Memory,
        },
        auth: AuthConfig {
            secret: Some(SECRET.to_string()),
            ..AuthConfig::default()
        },
        lending: LendingConfig::default(),
        logging: LoggingConfig::default(),
    };
    let state = AppState::new(config, Arc::new(MemoryStore::new())).expect("Failed to build state");
    api::create_router(state)
}

fn token(sub: &str, admin: bool) -> String {
    let now = Utc::now();
    let roles = if admin {
        vec!["bookshelf-admin".to_string()]
    } else {
        vec![]
    };
    UserClaims {
        sub: sub.to_string(),
        name: Some(format!("User {}", sub)),
        preferred_username: None,
        email: Some(format!("{}@example.com", sub)),
        realm_access: RealmAccess { roles },
        iss: None,
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    }
    .create_token(SECRET)
    .expect("Failed to sign token")
}

/// Send a request and return status plus parsed JSON body (Null when empty)
async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("Failed to build request");

    let response = app.clone().oneshot(request).await.expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Body is not JSON")
    };
    (status, value)
}

async fn create_book(app: &Router, admin: &str, total_copies: i32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/books",
        Some(admin),
        Some(json!({
            "title": "The Mythical Man-Month",
            "author": "Frederick Brooks",
            "isbn": "9780201835953",
            "category": "Engineering",
            "total_copies": total_copies
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().expect("No id in response").to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_requires_authentication() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/v1/books", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthenticated");

    let (status, _) = send(&app, Method::GET, "/api/v1/books", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inventory_is_admin_only() {
    let app = app();
    let employee = token("alice", false);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&employee),
        Some(json!({ "title": "Dune", "author": "Frank Herbert", "total_copies": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let (status, _) = send(&app, Method::GET, "/api/v1/stats", Some(&employee), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_book_validation() {
    let app = app();
    let admin = token("root", true);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&admin),
        Some(json!({ "title": "Dune", "author": "Frank Herbert", "total_copies": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationFailed");
}

#[tokio::test]
async fn test_malformed_bodies_use_error_body() {
    let app = app();
    let admin = token("root", true);
    let alice = token("alice", false);

    // Missing title
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&admin),
        Some(json!({ "author": "Frank Herbert", "total_copies": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationFailed");
    assert_eq!(body["code"], 6);

    // Wrong type
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&admin),
        Some(json!({ "title": "Dune", "author": "Frank Herbert", "total_copies": "3" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationFailed");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&alice),
        Some(json!({ "book_id": "not-a-uuid" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationFailed");
}

#[tokio::test]
async fn test_lending_flow() {
    let app = app();
    let admin = token("root", true);
    let alice = token("alice", false);
    let bob = token("bob", false);
    let carol = token("carol", false);

    let book_id = create_book(&app, &admin, 2).await;

    // Alice borrows
    let (status, loan) = send(&app, Method::POST, "/api/v1/loans", Some(&alice), Some(json!({ "book_id": book_id }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["user_id"], "alice");
    let alice_loan = loan["id"].as_str().unwrap().to_string();

    // Alice again
    let (status, body) = send(&app, Method::POST, "/api/v1/loans", Some(&alice), Some(json!({ "book_id": book_id }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyBorrowed");

    // Bob takes the last copy, Carol gets nothing
    let (status, _) = send(&app, Method::POST, "/api/v1/loans", Some(&bob), Some(json!({ "book_id": book_id }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&app, Method::POST, "/api/v1/loans", Some(&carol), Some(json!({ "book_id": book_id }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "OutOfStock");

    let (_, detail) = send(&app, Method::GET, &format!("/api/v1/books/{}", book_id), Some(&alice), None).await;
    assert_eq!(detail["book"]["available_copies"], 0);
    assert_eq!(detail["active_loan"]["id"], alice_loan.as_str());

    // Bob can't return Alice's loan
    let uri = format!("/api/v1/loans/{}/return", alice_loan);
    let (status, _) = send(&app, Method::POST, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Deleting is refused while copies are out
    let book_uri = format!("/api/v1/books/{}", book_id);
    let (status, body) = send(&app, Method::DELETE, &book_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "HasActiveLoans");

    let (status, body) = send(&app, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyReturned");

    let (_, detail) = send(&app, Method::GET, &book_uri, Some(&carol), None).await;
    assert_eq!(detail["book"]["available_copies"], 1);
    assert!(detail["active_loan"].is_null());

    // Loan visibility
    let (_, own) = send(&app, Method::GET, "/api/v1/loans", Some(&alice), None).await;
    assert_eq!(own.as_array().unwrap().len(), 1);
    assert_eq!(own[0]["book"]["title"], "The Mythical Man-Month");

    let (_, all) = send(&app, Method::GET, "/api/v1/loans", Some(&admin), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, active) = send(&app, Method::GET, "/api/v1/loans?status=active", Some(&admin), None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["user_id"], "bob");

    let (status, stats) = send(&app, Method::GET, "/api/v1/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_books"], 1);
    assert_eq!(stats["total_loans"], 2);
    assert_eq!(stats["active_loans"], 1);
    assert_eq!(stats["overdue_loans"], 0);
}

#[tokio::test]
async fn test_edit_and_delete_book() {
    let app = app();
    let admin = token("root", true);
    let alice = token("alice", false);

    let book_id = create_book(&app, &admin, 3).await;
    let book_uri = format!("/api/v1/books/{}", book_id);

    let (status, loan) = send(&app, Method::POST, "/api/v1/loans", Some(&alice), Some(json!({ "book_id": book_id }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, book) = send(
        &app,
        Method::PUT,
        &book_uri,
        Some(&admin),
        Some(json!({
            "title": "The Mythical Man-Month (Anniversary Edition)",
            "author": "Frederick Brooks",
            "total_copies": 5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["total_copies"], 5);
    assert_eq!(book["available_copies"], 4);

    let return_uri = format!("/api/v1/loans/{}/return", loan["id"].as_str().unwrap());
    let (status, _) = send(&app, Method::POST, &return_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::DELETE, &book_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, body) = send(&app, Method::GET, &book_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, _) = send(&app, Method::POST, "/api/v1/loans", Some(&alice), Some(json!({ "book_id": book_id }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_and_categories() {
    let app = app();
    let admin = token("root", true);
    let alice = token("alice", false);

    for (title, author, category) in [
        ("Refactoring", "Martin Fowler", "Programming"),
        ("Dune", "Frank Herbert", "Fiction"),
        ("Clean Code", "Robert Martin", "Programming"),
    ] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/books",
            Some(&admin),
            Some(json!({ "title": title, "author": author, "category": category, "total_copies": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, books) = send(&app, Method::GET, "/api/v1/books?q=martin", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = books
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Clean Code", "Refactoring"]);

    let (_, books) = send(&app, Method::GET, "/api/v1/books?category=fiction", Some(&alice), None).await;
    assert_eq!(books.as_array().unwrap().len(), 1);

    let (_, categories) = send(&app, Method::GET, "/api/v1/books/categories", Some(&alice), None).await;
    assert_eq!(categories, json!(["Fiction", "Programming"]));
}
