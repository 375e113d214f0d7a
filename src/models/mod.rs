//! Data models for Biblioteca

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookFields, BookStats, BookView};
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use user::{Operation, Principal, Role, UserClaims};
