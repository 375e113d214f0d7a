//! Catalog management: book validation and edits, and the catalog read side.
//!
//! Writes are applied by the coordinator; the functions here only build or modify
//! an in-memory `Book`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFields, BookStats, BookView},
        user::Principal,
    },
    repository::Store,
    services::ledger,
};

/// Validate and normalize submitted fields
pub fn validate_fields(fields: BookFields) -> AppResult<BookFields> {
    let fields = fields.normalized();
    fields.validate()?;
    Ok(fields)
}

/// A new book with every copy on the shelf
pub fn new_book(fields: BookFields, now: DateTime<Utc>) -> AppResult<Book> {
    let fields = validate_fields(fields)?;
    Ok(Book {
        id: Uuid::new_v4(),
        title: fields.title,
        author: fields.author,
        description: fields.description,
        cover_image_url: fields.cover_image_url,
        total_copies: fields.total_copies,
        available_copies: fields.total_copies,
        created_at: now,
        updated_at: now,
    })
}

/// Apply an edit to a locked book; copy count changes go through the ledger
pub fn apply_edit(book: &mut Book, fields: BookFields, now: DateTime<Utc>) -> AppResult<()> {
    let fields = validate_fields(fields)?;
    if fields.total_copies != book.total_copies {
        ledger::resize(book, fields.total_copies)?;
    }
    book.title = fields.title;
    book.author = fields.author;
    book.description = fields.description;
    book.cover_image_url = fields.cover_image_url;
    book.updated_at = now;
    Ok(())
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    policy: LoansConfig,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, policy: LoansConfig) -> Self {
        Self { store, policy }
    }

    /// All books, with whether the caller could borrow each one right now
    pub async fn list_books(&self, principal: &Principal) -> AppResult<Vec<BookView>> {
        let books = self.store.list_books().await?;
        let active = self
            .store
            .count_active_loans_by_user(principal.user_id)
            .await?;
        let under_cap = active < self.policy.max_active_loans;

        Ok(books
            .into_iter()
            .map(|book| BookView {
                borrowed_count: book.borrowed_count(),
                can_borrow: under_cap && book.available_copies > 0,
                book,
            })
            .collect())
    }

    /// Get book by ID
    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Copy totals across the catalog
    pub async fn stats(&self) -> AppResult<BookStats> {
        let books = self.store.list_books().await?;
        Ok(books.iter().fold(BookStats::default(), |mut acc, b| {
            acc.total_books += 1;
            acc.total_copies += i64::from(b.total_copies);
            acc.available_copies += i64::from(b.available_copies);
            acc.borrowed_copies += i64::from(b.borrowed_count());
            acc
        }))
    }
}
