//! API integration tests
//!
//! Requests go through the full router in-process, backed by the in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use biblioteca_server::{
    api,
    config::AppConfig,
    models::user::{Principal, Role, UserClaims},
    repository::MemoryStore,
    services::Services,
    AppState,
};

struct TestApp {
    router: Router,
    secret: String,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::default();
        let secret = config.auth.jwt_secret.clone();
        let services = Services::new(Arc::new(MemoryStore::new()), config.loans);
        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        };
        Self {
            router: api::create_router(state),
            secret,
        }
    }

    fn token(&self, principal: Principal) -> String {
        UserClaims::for_principal(principal, chrono::Duration::hours(1))
            .create_token(&self.secret)
            .expect("token")
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_book(&self, admin: &str, title: &str, copies: i32) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/books",
                Some(admin),
                Some(json!({
                    "title": title,
                    "author": "Cecília Meireles",
                    "description": "Poemas para crianças",
                    "total_copies": copies
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

fn admin() -> Principal {
    Principal::new(Uuid::new_v4(), Role::Admin)
}

fn member() -> Principal {
    Principal::new(Uuid::new_v4(), Role::Member)
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/books", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let (status, _) = app.send(Method::GET, "/books", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_borrow_and_return_flow() {
    let app = TestApp::new();
    let admin = app.token(admin());
    let reader = member();
    let token = app.token(reader);

    let book = app.create_book(&admin, "Ou Isto ou Aquilo", 2).await;
    let book_id = book["id"].as_str().unwrap().to_string();
    assert_eq!(book["available_copies"], 2);

    let (status, loan) = app
        .send(Method::POST, "/loans", Some(&token), Some(json!({ "book_id": book_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", loan);
    assert_eq!(loan["user_id"], reader.user_id.to_string());
    assert_eq!(loan["returned"], false);
    let loan_id = loan["id"].as_str().unwrap().to_string();

    let (status, mine) = app.send(Method::GET, "/loans/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    // A few milliseconds pass between borrowing and listing
    assert!(matches!(mine[0]["days_remaining"].as_i64(), Some(6) | Some(7)));
    assert_eq!(mine[0]["status"], "on_track");
    assert_eq!(mine[0]["book"]["title"], "Ou Isto ou Aquilo");

    let (_, book) = app.send(Method::GET, &format!("/books/{}", book_id), Some(&token), None).await;
    assert_eq!(book["available_copies"], 1);

    let (status, again) = app
        .send(Method::POST, "/loans", Some(&token), Some(json!({ "book_id": book_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "DuplicateLoan");

    let (status, receipt) = app
        .send(Method::POST, &format!("/loans/{}/return", loan_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", receipt);
    assert_eq!(receipt["loan"]["returned"], true);
    assert_eq!(receipt["late"], false);

    let (status, twice) = app
        .send(Method::POST, &format!("/loans/{}/return", loan_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(twice["error"], "AlreadyReturned");

    let (_, book) = app.send(Method::GET, &format!("/books/{}", book_id), Some(&token), None).await;
    assert_eq!(book["available_copies"], 2);
}

#[tokio::test]
async fn test_loan_limit_and_empty_shelf() {
    let app = TestApp::new();
    let admin = app.token(admin());
    let token = app.token(member());

    let mut ids = Vec::new();
    for i in 0..4 {
        let book = app.create_book(&admin, &format!("Cânticos {}", i), 1).await;
        ids.push(book["id"].as_str().unwrap().to_string());
    }
    for id in &ids[..3] {
        let (status, _) = app
            .send(Method::POST, "/loans", Some(&token), Some(json!({ "book_id": id })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .send(Method::POST, "/loans", Some(&token), Some(json!({ "book_id": ids[3] })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "MaxBorrowsReached");

    let other = app.token(member());
    let (status, body) = app
        .send(Method::POST, "/loans", Some(&other), Some(json!({ "book_id": ids[0] })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NoCopiesAvailable");

    let (status, books) = app.send(Method::GET, "/books", Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);
    let shelf = books.as_array().unwrap();
    let first = shelf.iter().find(|b| b["id"] == ids[0].as_str()).unwrap();
    assert_eq!(first["borrowed_count"], 1);
    assert_eq!(first["can_borrow"], false);

    let (status, _) = app
        .send(Method::POST, "/loans", Some(&token), Some(json!({ "book_id": Uuid::new_v4() })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog_management_is_admin_only() {
    let app = TestApp::new();
    let admin = app.token(admin());
    let token = app.token(member());

    let (status, body) = app
        .send(
            Method::POST,
            "/books",
            Some(&token),
            Some(json!({
                "title": "Romanceiro",
                "author": "Cecília Meireles",
                "description": "Inconfidência",
                "total_copies": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let (status, body) = app
        .send(
            Method::POST,
            "/books",
            Some(&admin),
            Some(json!({
                "title": "",
                "author": "Cecília Meireles",
                "description": "Inconfidência",
                "total_copies": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, _) = app.send(Method::GET, "/loans", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, "/admin/ledger", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_edit_and_delete_respect_open_loans() {
    let app = TestApp::new();
    let admin = app.token(admin());
    let book = app.create_book(&admin, "Viagem", 3).await;
    let book_id = book["id"].as_str().unwrap().to_string();

    let mut loan_ids = Vec::new();
    for _ in 0..2 {
        let token = app.token(member());
        let (_, loan) = app
            .send(Method::POST, "/loans", Some(&token), Some(json!({ "book_id": book_id })))
            .await;
        loan_ids.push(loan["id"].as_str().unwrap().to_string());
    }

    let edit = |total: i32| {
        json!({
            "title": "Viagem",
            "author": "Cecília Meireles",
            "description": "Primeiro livro premiado",
            "total_copies": total
        })
    };

    let (status, body) = app
        .send(Method::PUT, &format!("/books/{}", book_id), Some(&admin), Some(edit(1)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "BelowBorrowedCount");

    let (status, body) = app
        .send(Method::PUT, &format!("/books/{}", book_id), Some(&admin), Some(edit(5)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_copies"], 5);
    assert_eq!(body["available_copies"], 3);

    let (status, body) = app
        .send(Method::DELETE, &format!("/books/{}", book_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "HasActiveLoans");

    let (status, board) = app.send(Method::GET, "/loans", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["stats"]["active_loans"], 2);
    assert_eq!(board["loans"].as_array().unwrap().len(), 2);

    for loan_id in &loan_ids {
        let (status, _) = app
            .send(Method::POST, &format!("/loans/{}/return", loan_id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = app
        .send(Method::DELETE, &format!("/books/{}", book_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(Method::GET, &format!("/books/{}", book_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, audit) = app.send(Method::GET, "/admin/ledger", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit["checked_books"], 0);
    assert_eq!(audit["discrepancies"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_loans_are_private_to_their_borrower() {
    let app = TestApp::new();
    let admin_token = app.token(admin());
    let owner = member();
    let owner_token = app.token(owner);
    let stranger_token = app.token(member());

    let book = app.create_book(&admin_token, "Criança, Meu Amor", 2).await;
    let (_, loan) = app
        .send(Method::POST, "/loans", Some(&owner_token), Some(json!({ "book_id": book["id"] })))
        .await;
    let loan_id = loan["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(Method::GET, &format!("/loans/{}", loan_id), Some(&stranger_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::GET, &format!("/users/{}/loans", owner.user_id), Some(&stranger_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::POST, &format!("/loans/{}/return", loan_id), Some(&stranger_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, details) = app
        .send(Method::GET, &format!("/loans/{}", loan_id), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["user_id"], owner.user_id.to_string());

    let (status, listed) = app
        .send(Method::GET, &format!("/users/{}/loans", owner.user_id), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}
