//! Inventory ledger: the per-book available-copy counter.
//!
//! These functions only mutate a `Book` the caller has already locked inside a
//! store transaction; persisting the result is the coordinator's job. Counter
//! states that can only arise from a broken transaction boundary are reported as
//! `LedgerCorruption`, never clamped.

use crate::{
    error::{AppError, AppResult},
    models::book::Book,
};

fn check_bounds(book: &Book) -> AppResult<()> {
    if book.available_copies < 0 || book.available_copies > book.total_copies {
        return Err(AppError::LedgerCorruption(format!(
            "book {} has {} available of {} total copies",
            book.id, book.available_copies, book.total_copies
        )));
    }
    Ok(())
}

/// Take one copy off the shelf; returns the new available count
pub fn decrement_available(book: &mut Book) -> AppResult<i32> {
    check_bounds(book)?;
    if book.available_copies == 0 {
        return Err(AppError::NoCopiesAvailable { book_id: book.id });
    }
    book.available_copies -= 1;
    Ok(book.available_copies)
}

/// Put one copy back on the shelf; returns the new available count
pub fn increment_available(book: &mut Book) -> AppResult<i32> {
    check_bounds(book)?;
    if book.available_copies >= book.total_copies {
        return Err(AppError::LedgerCorruption(format!(
            "returning a copy of book {} would exceed its {} total copies",
            book.id, book.total_copies
        )));
    }
    book.available_copies += 1;
    Ok(book.available_copies)
}

/// Change the number of owned copies, keeping the borrowed count unchanged
pub fn resize(book: &mut Book, new_total: i32) -> AppResult<()> {
    check_bounds(book)?;
    let borrowed = book.borrowed_count();
    if new_total < borrowed {
        return Err(AppError::BelowBorrowedCount {
            requested: new_total,
            borrowed,
        });
    }
    book.total_copies = new_total;
    book.available_copies = new_total - borrowed;
    Ok(())
}

/// The ledger must agree with the number of unreturned loans on the book
pub fn verify(book: &Book, active_loans: i64) -> AppResult<()> {
    check_bounds(book)?;
    if i64::from(book.borrowed_count()) != active_loans {
        return Err(AppError::LedgerCorruption(format!(
            "book {} records {} borrowed copies but has {} active loans",
            book.id,
            book.borrowed_count(),
            active_loans
        )));
    }
    Ok(())
}

/// True when the book's counters and its loans agree
pub fn is_consistent(book: &Book, active_loans: i64) -> bool {
    verify(book, active_loans).is_ok()
}
