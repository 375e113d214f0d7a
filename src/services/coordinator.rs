//! Consistency coordinator: the only path that writes books and loans.
//!
//! Each operation runs in one store transaction. It locks the records it touches
//! (user, then book; or loan, then book), checks that the book's ledger agrees with
//! its open loans, validates preconditions, and commits the loan change together
//! with the ledger change. Any error before commit drops the transaction, so a
//! rejected request leaves nothing behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFields, LedgerAudit, LedgerDiscrepancy},
        loan::{Loan, ReturnReceipt},
        user::{Operation, Principal},
    },
    repository::{Store, StoreTx},
    services::{catalog, ledger, loans},
};

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn Store>,
    policy: LoansConfig,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>, policy: LoansConfig) -> Self {
        Self { store, policy }
    }

    /// Lock a book and check its counters against its open loans
    async fn lock_book(&self, tx: &mut dyn StoreTx, book_id: Uuid) -> AppResult<Book> {
        let book = tx
            .book_for_update(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        let active = tx.count_active_loans_by_book(book_id).await?;
        ledger::verify(&book, active)?;
        Ok(book)
    }

    /// Borrow a copy of `book_id` for the caller
    pub async fn borrow(
        &self,
        principal: &Principal,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Loan> {
        principal.authorize(Operation::Borrow)?;
        let user_id = principal.user_id;

        let mut tx = self.store.begin().await?;
        tx.lock_user(user_id).await?;
        let mut book = self.lock_book(tx.as_mut(), book_id).await?;

        let existing = tx.find_active_loan(user_id, book_id).await?;
        let active = tx.count_active_loans_by_user(user_id).await?;
        loans::check_can_open(&self.policy, book_id, existing.as_ref(), active)?;

        let available = ledger::decrement_available(&mut book)?;
        book.updated_at = now;
        let loan = loans::new_loan(&self.policy, user_id, book_id, now);

        tx.insert_loan(&loan).await?;
        tx.update_book(&book).await?;
        tx.commit().await?;

        tracing::info!(
            "Loan {} opened: user={} book={} available={} deadline={}",
            loan.id, user_id, book_id, available, loan.return_deadline
        );
        Ok(loan)
    }

    /// Return a borrowed copy; the caller must own the loan or be an admin
    pub async fn return_loan(
        &self,
        principal: &Principal,
        loan_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ReturnReceipt> {
        let mut tx = self.store.begin().await?;
        let mut loan = tx
            .loan_for_update(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;
        loans::check_can_close(&loan, principal)?;

        let mut book = match self.lock_book(tx.as_mut(), loan.book_id).await {
            Err(AppError::NotFound(_)) => {
                return Err(AppError::LedgerCorruption(format!(
                    "active loan {} references missing book {}",
                    loan.id, loan.book_id
                )))
            }
            other => other?,
        };

        let available = ledger::increment_available(&mut book)?;
        book.updated_at = now;

        tx.mark_returned(loan.id).await?;
        tx.update_book(&book).await?;
        tx.commit().await?;

        loan.returned = true;
        let late = loans::days_remaining(&loan, now) < 0;
        tracing::info!(
            "Loan {} returned: user={} book={} available={} late={}",
            loan.id, loan.user_id, loan.book_id, available, late
        );
        Ok(ReturnReceipt {
            loan,
            returned_at: now,
            late,
        })
    }

    /// Add a book to the catalog
    pub async fn create_book(
        &self,
        principal: &Principal,
        fields: BookFields,
        now: DateTime<Utc>,
    ) -> AppResult<Book> {
        principal.authorize(Operation::ManageCatalog)?;
        let book = catalog::new_book(fields, now)?;

        let mut tx = self.store.begin().await?;
        tx.insert_book(&book).await?;
        tx.commit().await?;

        tracing::info!("Catalog create: book id={} copies={}", book.id, book.total_copies);
        Ok(book)
    }

    /// Edit a book; changing the copy count keeps every borrowed copy accounted for
    pub async fn update_book(
        &self,
        principal: &Principal,
        book_id: Uuid,
        fields: BookFields,
        now: DateTime<Utc>,
    ) -> AppResult<Book> {
        principal.authorize(Operation::ManageCatalog)?;
        let fields = catalog::validate_fields(fields)?;

        let mut tx = self.store.begin().await?;
        let mut book = self.lock_book(tx.as_mut(), book_id).await?;
        catalog::apply_edit(&mut book, fields, now)?;
        tx.update_book(&book).await?;
        tx.commit().await?;

        tracing::info!(
            "Catalog update: book id={} total={} available={}",
            book.id, book.total_copies, book.available_copies
        );
        Ok(book)
    }

    /// Remove a book that has no copies on loan; returned loans stay on record
    pub async fn delete_book(&self, principal: &Principal, book_id: Uuid) -> AppResult<()> {
        principal.authorize(Operation::ManageCatalog)?;

        let mut tx = self.store.begin().await?;
        let book = tx
            .book_for_update(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        let active = tx.count_active_loans_by_book(book_id).await?;
        if active > 0 {
            return Err(AppError::HasActiveLoans { book_id, active });
        }
        ledger::verify(&book, active)?;

        tx.delete_book(book_id).await?;
        tx.commit().await?;

        tracing::info!("Catalog delete: book id={}", book_id);
        Ok(())
    }

    /// Compare every book's counters against its open loans
    pub async fn audit_ledger(&self, principal: &Principal) -> AppResult<LedgerAudit> {
        principal.authorize(Operation::AuditLedger)?;

        let entries = self.store.ledger_snapshot().await?;
        let checked_books = entries.len();
        let discrepancies: Vec<LedgerDiscrepancy> = entries
            .into_iter()
            .filter(|e| !ledger::is_consistent(&e.book, e.active_loans))
            .map(|e| LedgerDiscrepancy {
                book_id: e.book.id,
                borrowed_count: e.book.borrowed_count(),
                title: e.book.title,
                total_copies: e.book.total_copies,
                available_copies: e.book.available_copies,
                active_loans: e.active_loans,
            })
            .collect();

        for d in &discrepancies {
            tracing::error!(
                "Ledger audit: book {} records {} borrowed copies ({} of {} available) but has {} active loans",
                d.book_id, d.borrowed_count, d.available_copies, d.total_copies, d.active_loans
            );
        }

        Ok(LedgerAudit {
            checked_books,
            discrepancies,
        })
    }
}
