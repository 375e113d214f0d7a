//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub loan_date: DateTime<Utc>,
    /// Fixed at creation, never moved
    pub return_deadline: DateTime<Utc>,
    pub returned: bool,
}

/// Loan joined with the book it references
#[derive(Debug, Clone, FromRow)]
pub struct LoanWithBook {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub book_title: String,
    pub book_author: String,
    pub book_cover_image_url: Option<String>,
}

/// Deadline status of a loan, recomputed on every read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    OnTrack,
    DueSoon,
    Overdue,
    Returned,
}

/// Short book info embedded in loan listings
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanBook {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub cover_image_url: Option<String>,
}

/// Loan with full details for display
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub days_remaining: i64,
    pub status: LoanStatus,
    pub book: Option<LoanBook>,
}

/// Counters for the active-loan board
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct LoanStats {
    pub total_loans: i64,
    pub active_loans: i64,
    pub due_soon_loans: i64,
    pub overdue_loans: i64,
}

/// Outcome of closing a loan
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnReceipt {
    pub loan: Loan,
    pub returned_at: DateTime<Utc>,
    pub late: bool,
}
