//! In-process store.
//!
//! A transaction holds the store-wide mutex from `begin` until it is committed or
//! dropped, so transactions are fully serialized. Writes go straight to the tables
//! and record the prior value of each touched record; dropping an uncommitted
//! transaction replays that log backwards, so a transaction costs only what it
//! touches.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, LedgerEntry},
        loan::{Loan, LoanWithBook},
    },
};

#[derive(Debug, Default)]
struct Tables {
    books: HashMap<Uuid, Book>,
    loans: HashMap<Uuid, Loan>,
}

impl Tables {
    fn active_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values().filter(|l| !l.returned)
    }

    fn count_active_by_user(&self, user_id: Uuid) -> i64 {
        self.active_loans().filter(|l| l.user_id == user_id).count() as i64
    }

    fn count_active_by_book(&self, book_id: Uuid) -> i64 {
        self.active_loans().filter(|l| l.book_id == book_id).count() as i64
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with records, written as-is without any ledger checks
    pub fn with_records(books: Vec<Book>, loans: Vec<Loan>) -> Self {
        let tables = Tables {
            books: books.into_iter().map(|b| (b.id, b)).collect(),
            loans: loans.into_iter().map(|l| (l.id, l)).collect(),
        };
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            undo: Vec::new(),
        }))
    }

    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>> {
        Ok(self.tables.lock().await.books.get(&id).cloned())
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let tables = self.tables.lock().await;
        let mut books: Vec<Book> = tables.books.values().cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books)
    }

    async fn get_loan(&self, id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self.tables.lock().await.loans.get(&id).cloned())
    }

    async fn list_active_loans(&self, user_id: Option<Uuid>) -> AppResult<Vec<LoanWithBook>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<LoanWithBook> = tables
            .active_loans()
            .filter(|l| user_id.map_or(true, |u| l.user_id == u))
            .filter_map(|l| {
                tables.books.get(&l.book_id).map(|b| LoanWithBook {
                    loan: l.clone(),
                    book_title: b.title.clone(),
                    book_author: b.author.clone(),
                    book_cover_image_url: b.cover_image_url.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.loan.loan_date.cmp(&a.loan.loan_date));
        Ok(rows)
    }

    async fn count_active_loans_by_user(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(self.tables.lock().await.count_active_by_user(user_id))
    }

    async fn count_loans(&self) -> AppResult<i64> {
        Ok(self.tables.lock().await.loans.len() as i64)
    }

    async fn ledger_snapshot(&self) -> AppResult<Vec<LedgerEntry>> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<LedgerEntry> = tables
            .books
            .values()
            .map(|b| LedgerEntry {
                book: b.clone(),
                active_loans: tables.count_active_by_book(b.id),
            })
            .collect();
        entries.sort_by(|a, b| a.book.title.cmp(&b.book.title));
        Ok(entries)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Prior value of a record touched by an open transaction
#[derive(Debug)]
enum Undo {
    Book(Uuid, Option<Book>),
    Loan(Uuid, Option<Loan>),
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<Tables>>,
    undo: Vec<Undo>,
}

impl MemoryTx {
    fn tables(&mut self) -> AppResult<&mut Tables> {
        self.guard
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))
    }

    fn put_book(&mut self, book: Book) -> AppResult<()> {
        let prior = self.tables()?.books.insert(book.id, book.clone());
        self.undo.push(Undo::Book(book.id, prior));
        Ok(())
    }

    fn put_loan(&mut self, loan: Loan) -> AppResult<()> {
        let prior = self.tables()?.loans.insert(loan.id, loan.clone());
        self.undo.push(Undo::Loan(loan.id, prior));
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        let Some(tables) = self.guard.as_deref_mut() else {
            return;
        };
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Book(id, Some(book)) => {
                    tables.books.insert(id, book);
                }
                Undo::Book(id, None) => {
                    tables.books.remove(&id);
                }
                Undo::Loan(id, Some(loan)) => {
                    tables.loans.insert(id, loan);
                }
                Undo::Loan(id, None) => {
                    tables.loans.remove(&id);
                }
            }
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_user(&mut self, _user_id: Uuid) -> AppResult<()> {
        // The store-wide guard already excludes every other transaction.
        self.tables().map(|_| ())
    }

    async fn book_for_update(&mut self, id: Uuid) -> AppResult<Option<Book>> {
        Ok(self.tables()?.books.get(&id).cloned())
    }

    async fn loan_for_update(&mut self, id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self.tables()?.loans.get(&id).cloned())
    }

    async fn find_active_loan(&mut self, user_id: Uuid, book_id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self
            .tables()?
            .active_loans()
            .find(|l| l.user_id == user_id && l.book_id == book_id)
            .cloned())
    }

    async fn count_active_loans_by_user(&mut self, user_id: Uuid) -> AppResult<i64> {
        Ok(self.tables()?.count_active_by_user(user_id))
    }

    async fn count_active_loans_by_book(&mut self, book_id: Uuid) -> AppResult<i64> {
        Ok(self.tables()?.count_active_by_book(book_id))
    }

    async fn insert_book(&mut self, book: &Book) -> AppResult<()> {
        if self.tables()?.books.contains_key(&book.id) {
            return Err(AppError::Internal(format!("Book {} already exists", book.id)));
        }
        self.put_book(book.clone())
    }

    async fn update_book(&mut self, book: &Book) -> AppResult<()> {
        if !self.tables()?.books.contains_key(&book.id) {
            return Err(AppError::NotFound(format!("Book with id {} not found", book.id)));
        }
        self.put_book(book.clone())
    }

    async fn delete_book(&mut self, id: Uuid) -> AppResult<()> {
        let removed = self.tables()?.books.remove(&id);
        match removed {
            Some(prior) => {
                self.undo.push(Undo::Book(id, Some(prior)));
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Book with id {} not found", id))),
        }
    }

    async fn insert_loan(&mut self, loan: &Loan) -> AppResult<()> {
        let duplicate = !loan.returned
            && self
                .tables()?
                .active_loans()
                .any(|l| l.user_id == loan.user_id && l.book_id == loan.book_id);
        if duplicate {
            return Err(AppError::DuplicateLoan { book_id: loan.book_id });
        }
        self.put_loan(loan.clone())
    }

    async fn mark_returned(&mut self, loan_id: Uuid) -> AppResult<()> {
        let current = self.tables()?.loans.get(&loan_id).cloned();
        match current {
            Some(loan) if loan.returned => Err(AppError::AlreadyReturned { loan_id }),
            Some(loan) => self.put_loan(Loan {
                returned: true,
                ..loan
            }),
            None => Err(AppError::NotFound(format!("Loan with id {} not found", loan_id))),
        }
    }

    async fn commit(&mut self) -> AppResult<()> {
        self.guard
            .take()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))?;
        self.undo.clear();
        Ok(())
    }
}
