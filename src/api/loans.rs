//! Loan management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::loan::{Loan, LoanDetails, ReturnReceipt},
    services::loans::ActiveLoansReport,
    AppState,
};

use super::AuthenticatedUser;

/// Create loan request
#[derive(Deserialize, ToSchema)]
pub struct CreateLoanRequest {
    /// Book to borrow; the loan is opened for the caller
    pub book_id: Uuid,
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Already borrowed, loan limit reached or no copies available")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state
        .services
        .coordinator
        .borrow(&principal, request.book_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnReceipt),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> AppResult<Json<ReturnReceipt>> {
    let receipt = state
        .services
        .coordinator
        .return_loan(&principal, loan_id, Utc::now())
        .await?;
    Ok(Json(receipt))
}

/// Active loans of the caller
#[utoipa::path(
    get,
    path = "/loans/me",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's active loans", body = Vec<LoanDetails>)
    )
)]
pub async fn get_my_loans(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state
        .services
        .loans
        .get_user_loans(&principal, principal.user_id, Utc::now())
        .await?;
    Ok(Json(loans))
}

/// Get loans for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's active loans", body = Vec<LoanDetails>),
        (status = 403, description = "Not the user or an admin")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state
        .services
        .loans
        .get_user_loans(&principal, user_id, Utc::now())
        .await?;
    Ok(Json(loans))
}

/// Get a loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 403, description = "Not the borrower or an admin"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state
        .services
        .loans
        .get_loan(&principal, loan_id, Utc::now())
        .await?;
    Ok(Json(loan))
}

/// All active loans with due-soon and overdue counters
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active loan board", body = ActiveLoansReport),
        (status = 403, description = "Admin only")
    )
)]
pub async fn list_active_loans(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ActiveLoansReport>> {
    let report = state
        .services
        .loans
        .get_active_loans(&principal, Utc::now())
        .await?;
    Ok(Json(report))
}
