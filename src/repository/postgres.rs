//! PostgreSQL store.
//!
//! Books and loans are locked with `SELECT ... FOR UPDATE`; per-user checks take a
//! transaction-scoped advisory lock keyed on the user id. Callers lock in the order
//! user -> book or loan -> book.

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, LedgerEntry},
        loan::{Loan, LoanWithBook},
    },
};

const BOOK_COLUMNS: &str = "id, title, author, description, cover_image_url, \
                            total_copies, available_copies, created_at, updated_at";

const LOAN_COLUMNS: &str = "id, user_id, book_id, loan_date, return_deadline, returned";

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books ORDER BY title", BOOK_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn get_loan(&self, id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn list_active_loans(&self, user_id: Option<Uuid>) -> AppResult<Vec<LoanWithBook>> {
        let rows = sqlx::query_as::<_, LoanWithBook>(
            r#"
            SELECT l.id, l.user_id, l.book_id, l.loan_date, l.return_deadline, l.returned,
                   b.title AS book_title, b.author AS book_author,
                   b.cover_image_url AS book_cover_image_url
            FROM loans l
            JOIN books b ON b.id = l.book_id
            WHERE NOT l.returned
              AND ($1::uuid IS NULL OR l.user_id = $1)
            ORDER BY l.loan_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_active_loans_by_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE user_id = $1 AND NOT returned")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_loans(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn ledger_snapshot(&self) -> AppResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT b.id, b.title, b.author, b.description, b.cover_image_url,
                   b.total_copies, b.available_copies, b.created_at, b.updated_at,
                   (SELECT COUNT(*) FROM loans l WHERE l.book_id = b.id AND NOT l.returned)
                       AS active_loans
            FROM books b
            ORDER BY b.title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Open PostgreSQL transaction; rolled back by sqlx when dropped uncommitted
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))
    }
}

/// Unique violations on the active-loan index surface as `DuplicateLoan`
fn map_loan_insert_error(e: sqlx::Error, book_id: Uuid) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return AppError::DuplicateLoan { book_id };
        }
    }
    AppError::Database(e)
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_user(&mut self, user_id: Uuid) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn book_for_update(&mut self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(book)
    }

    async fn loan_for_update(&mut self, id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(loan)
    }

    async fn find_active_loan(&mut self, user_id: Uuid, book_id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE user_id = $1 AND book_id = $2 AND NOT returned",
            LOAN_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(loan)
    }

    async fn count_active_loans_by_user(&mut self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE user_id = $1 AND NOT returned")
                .bind(user_id)
                .fetch_one(self.conn()?)
                .await?;
        Ok(count)
    }

    async fn count_active_loans_by_book(&mut self, book_id: Uuid) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE book_id = $1 AND NOT returned")
                .bind(book_id)
                .fetch_one(self.conn()?)
                .await?;
        Ok(count)
    }

    async fn insert_book(&mut self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, description, cover_image_url,
                               total_copies, available_copies, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.cover_image_url)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn update_book(&mut self, book: &Book) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $2, author = $3, description = $4, cover_image_url = $5,
                total_copies = $6, available_copies = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.cover_image_url)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.updated_at)
        .execute(self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", book.id)));
        }
        Ok(())
    }

    async fn delete_book(&mut self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    async fn insert_loan(&mut self, loan: &Loan) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loans (id, user_id, book_id, loan_date, return_deadline, returned)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(loan.id)
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.loan_date)
        .bind(loan.return_deadline)
        .bind(loan.returned)
        .execute(self.conn()?)
        .await
        .map_err(|e| map_loan_insert_error(e, loan.book_id))?;
        Ok(())
    }

    async fn mark_returned(&mut self, loan_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("UPDATE loans SET returned = TRUE WHERE id = $1 AND NOT returned")
            .bind(loan_id)
            .execute(self.conn()?)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::AlreadyReturned { loan_id });
        }
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))?;
        tx.commit().await?;
        Ok(())
    }
}
