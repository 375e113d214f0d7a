//! Biblioteca: school library catalog and loan tracker
//!
//! A REST JSON server for browsing books, borrowing and returning copies, and
//! managing the catalog. Every change to a book's available copies happens in the
//! same transaction as the loan change that causes it.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
