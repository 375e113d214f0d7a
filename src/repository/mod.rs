//! Repository layer: the transactional store behind the loan engine.
//!
//! Every write goes through a [`StoreTx`] opened by the consistency coordinator.
//! A transaction that is dropped without [`StoreTx::commit`] leaves no trace.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{Book, LedgerEntry},
        loan::{Loan, LoanWithBook},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Durable store holding books and loans
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction for one logical state transition
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>>;

    /// All books ordered by title
    async fn list_books(&self) -> AppResult<Vec<Book>>;

    async fn get_loan(&self, id: Uuid) -> AppResult<Option<Loan>>;

    /// Unreturned loans, newest first, optionally restricted to one user
    async fn list_active_loans(&self, user_id: Option<Uuid>) -> AppResult<Vec<LoanWithBook>>;

    async fn count_active_loans_by_user(&self, user_id: Uuid) -> AppResult<i64>;

    /// Every loan ever recorded, returned or not
    async fn count_loans(&self) -> AppResult<i64>;

    /// Every book together with its unreturned loan count, read in one consistent view
    async fn ledger_snapshot(&self) -> AppResult<Vec<LedgerEntry>>;

    /// Connectivity check
    async fn ping(&self) -> AppResult<()>;
}

/// One open transaction.
///
/// `*_for_update` reads hold the record exclusively until commit or drop, so the
/// state they return stays valid for the rest of the transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreTx: Send {
    /// Serialize with every other transaction that holds this user's lock
    async fn lock_user(&mut self, user_id: Uuid) -> AppResult<()>;

    async fn book_for_update(&mut self, id: Uuid) -> AppResult<Option<Book>>;

    async fn loan_for_update(&mut self, id: Uuid) -> AppResult<Option<Loan>>;

    /// The unreturned loan of `user_id` on `book_id`, if any
    async fn find_active_loan(&mut self, user_id: Uuid, book_id: Uuid) -> AppResult<Option<Loan>>;

    async fn count_active_loans_by_user(&mut self, user_id: Uuid) -> AppResult<i64>;

    async fn count_active_loans_by_book(&mut self, book_id: Uuid) -> AppResult<i64>;

    async fn insert_book(&mut self, book: &Book) -> AppResult<()>;

    async fn update_book(&mut self, book: &Book) -> AppResult<()>;

    /// Remove a book; its loans, all returned by then, are kept as history
    async fn delete_book(&mut self, id: Uuid) -> AppResult<()>;

    /// Fails with `DuplicateLoan` if the pair already has an unreturned loan
    async fn insert_loan(&mut self, loan: &Loan) -> AppResult<()>;

    /// Flip `returned` from false to true; fails with `AlreadyReturned` otherwise
    async fn mark_returned(&mut self, loan_id: Uuid) -> AppResult<()>;

    async fn commit(&mut self) -> AppResult<()>;
}
