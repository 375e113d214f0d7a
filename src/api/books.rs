//! Book (catalog) endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::book::{Book, BookFields, BookStats, BookView},
    AppState,
};

use super::AuthenticatedUser;

/// List the catalog with availability for the caller
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Books ordered by title", body = Vec<BookView>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<BookView>>> {
    let books = state.services.catalog.list_books(&principal).await?;
    Ok(Json(books))
}

/// Copy totals across the catalog
#[utoipa::path(
    get,
    path = "/books/stats",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Catalog totals", body = BookStats)
    )
)]
pub async fn get_book_stats(
    State(state): State<AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
) -> AppResult<Json<BookStats>> {
    let stats = state.services.catalog.stats().await?;
    Ok(Json(stats))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = BookFields,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(fields): Json<BookFields>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state
        .services
        .coordinator
        .create_book(&principal, fields, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    request_body = BookFields,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Fewer copies than are on loan")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(fields): Json<BookFields>,
) -> AppResult<Json<Book>> {
    let updated = state
        .services
        .coordinator
        .update_book(&principal, id, fields, Utc::now())
        .await?;
    Ok(Json(updated))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has active loans")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.coordinator.delete_book(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
