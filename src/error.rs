//! Error types for Biblioteca server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable numeric error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    DbFailure = 3,
    NotFound = 4,
    Forbidden = 5,
    BadValue = 6,
    DuplicateLoan = 7,
    MaxBorrowsReached = 8,
    NoCopiesAvailable = 9,
    AlreadyReturned = 10,
    BelowBorrowedCount = 11,
    HasActiveLoans = 12,
    LedgerCorruption = 13,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User already has an active loan for book {book_id}")]
    DuplicateLoan { book_id: uuid::Uuid },

    #[error("Loan limit reached ({active}/{limit})")]
    LoanLimitExceeded { active: i64, limit: i64 },

    #[error("No copies of book {book_id} are available")]
    NoCopiesAvailable { book_id: uuid::Uuid },

    #[error("Loan {loan_id} was already returned")]
    AlreadyReturned { loan_id: uuid::Uuid },

    #[error("Cannot reduce total copies to {requested}: {borrowed} copies are on loan")]
    BelowBorrowedCount { requested: i32, borrowed: i32 },

    #[error("Book {book_id} has {active} active loan(s)")]
    HasActiveLoans { book_id: uuid::Uuid, active: i64 },

    #[error("Ledger corruption: {0}")]
    LedgerCorruption(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Numeric code sent to clients for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) => ErrorCode::NotAuthenticated,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::InvalidInput(_) => ErrorCode::BadValue,
            AppError::DuplicateLoan { .. } => ErrorCode::DuplicateLoan,
            AppError::LoanLimitExceeded { .. } => ErrorCode::MaxBorrowsReached,
            AppError::NoCopiesAvailable { .. } => ErrorCode::NoCopiesAvailable,
            AppError::AlreadyReturned { .. } => ErrorCode::AlreadyReturned,
            AppError::BelowBorrowedCount { .. } => ErrorCode::BelowBorrowedCount,
            AppError::HasActiveLoans { .. } => ErrorCode::HasActiveLoans,
            AppError::LedgerCorruption(_) => ErrorCode::LedgerCorruption,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::DuplicateLoan { .. }
            | AppError::LoanLimitExceeded { .. }
            | AppError::NoCopiesAvailable { .. }
            | AppError::AlreadyReturned { .. }
            | AppError::BelowBorrowedCount { .. }
            | AppError::HasActiveLoans { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::LedgerCorruption(msg) => {
                tracing::error!("Ledger corruption detected: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Inventory ledger is inconsistent".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
