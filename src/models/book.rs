//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Book record as stored.
///
/// `available_copies` is the inventory ledger counter: `total_copies - available_copies`
/// must always equal the number of unreturned loans on the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover_image_url: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently out on loan, as recorded by the ledger
    pub fn borrowed_count(&self) -> i32 {
        self.total_copies - self.available_copies
    }
}

/// Editable book fields, used for both creation and update
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BookFields {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub cover_image_url: Option<String>,
    #[validate(range(min = 1, message = "A book needs at least one copy"))]
    pub total_copies: i32,
}

impl BookFields {
    /// Trim text fields; a blank cover URL means "no cover"
    pub fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            description: self.description.trim().to_string(),
            cover_image_url: self
                .cover_image_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            total_copies: self.total_copies,
        }
    }
}

/// Book as shown in the catalog to a given caller
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookView {
    #[serde(flatten)]
    pub book: Book,
    pub borrowed_count: i32,
    /// A copy is free and the caller is under the loan cap
    pub can_borrow: bool,
}

/// Catalog-wide copy totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BookStats {
    pub total_books: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub borrowed_copies: i64,
}

/// One row of a ledger snapshot: a book and its unreturned loan count
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    #[sqlx(flatten)]
    pub book: Book,
    pub active_loans: i64,
}

/// A book whose counters disagree with its open loans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LedgerDiscrepancy {
    pub book_id: Uuid,
    pub title: String,
    pub total_copies: i32,
    pub available_copies: i32,
    pub borrowed_count: i32,
    pub active_loans: i64,
}

/// Result of a full ledger audit
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LedgerAudit {
    pub checked_books: usize,
    pub discrepancies: Vec<LedgerDiscrepancy>,
}
