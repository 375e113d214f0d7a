//! Loan lifecycle: borrowing rules, deadlines, overdue status, and the loan read side.
//!
//! A `(user, book)` pair moves NoLoan -> Active -> Returned. Opening and closing a
//! loan are checked here and applied by the coordinator.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanBook, LoanDetails, LoanStats, LoanStatus, LoanWithBook},
        user::{Operation, Principal},
    },
    repository::Store,
};

/// Preconditions for opening a loan, in the order they are reported
pub fn check_can_open(
    policy: &LoansConfig,
    book_id: Uuid,
    existing: Option<&Loan>,
    active_loans: i64,
) -> AppResult<()> {
    if existing.is_some() {
        return Err(AppError::DuplicateLoan { book_id });
    }
    if active_loans >= policy.max_active_loans {
        return Err(AppError::LoanLimitExceeded {
            active: active_loans,
            limit: policy.max_active_loans,
        });
    }
    Ok(())
}

/// New active loan starting at `now`
pub fn new_loan(policy: &LoansConfig, user_id: Uuid, book_id: Uuid, now: DateTime<Utc>) -> Loan {
    Loan {
        id: Uuid::new_v4(),
        user_id,
        book_id,
        loan_date: now,
        return_deadline: now + Duration::days(policy.loan_duration_days),
        returned: false,
    }
}

/// Preconditions for closing `loan` on behalf of `principal`
pub fn check_can_close(loan: &Loan, principal: &Principal) -> AppResult<()> {
    if loan.returned {
        return Err(AppError::AlreadyReturned { loan_id: loan.id });
    }
    principal.authorize(Operation::ReturnLoan {
        owner: loan.user_id,
    })
}

/// Whole days until the deadline, rounded down (negative once overdue)
pub fn days_remaining(loan: &Loan, now: DateTime<Utc>) -> i64 {
    let gap = loan.return_deadline - now;
    // num_days truncates toward zero; step down for a partial negative day
    let days = gap.num_days();
    if gap < Duration::days(days) {
        days - 1
    } else {
        days
    }
}

pub fn status(policy: &LoansConfig, loan: &Loan, now: DateTime<Utc>) -> LoanStatus {
    if loan.returned {
        return LoanStatus::Returned;
    }
    match days_remaining(loan, now) {
        d if d < 0 => LoanStatus::Overdue,
        d if d <= policy.due_soon_days => LoanStatus::DueSoon,
        _ => LoanStatus::OnTrack,
    }
}

pub fn details(policy: &LoansConfig, loan: Loan, book: Option<LoanBook>, now: DateTime<Utc>) -> LoanDetails {
    LoanDetails {
        days_remaining: days_remaining(&loan, now),
        status: status(policy, &loan, now),
        loan,
        book,
    }
}

fn details_from_row(policy: &LoansConfig, row: LoanWithBook, now: DateTime<Utc>) -> LoanDetails {
    let book = LoanBook {
        id: row.loan.book_id,
        title: row.book_title,
        author: row.book_author,
        cover_image_url: row.book_cover_image_url,
    };
    details(policy, row.loan, Some(book), now)
}

/// Active-loan board shown to administrators
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ActiveLoansReport {
    pub loans: Vec<LoanDetails>,
    pub stats: LoanStats,
}

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn Store>,
    policy: LoansConfig,
}

impl LoansService {
    pub fn new(store: Arc<dyn Store>, policy: LoansConfig) -> Self {
        Self { store, policy }
    }

    /// Active loans of a user
    pub async fn get_user_loans(
        &self,
        principal: &Principal,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        principal.authorize(Operation::ViewLoans { owner: user_id })?;

        let rows = self.store.list_active_loans(Some(user_id)).await?;
        Ok(rows
            .into_iter()
            .map(|row| details_from_row(&self.policy, row, now))
            .collect())
    }

    /// Get a single loan
    pub async fn get_loan(
        &self,
        principal: &Principal,
        loan_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<LoanDetails> {
        let loan = self
            .store
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;
        principal.authorize(Operation::ViewLoans { owner: loan.user_id })?;

        let book = self.store.get_book(loan.book_id).await?.map(|b| LoanBook {
            id: b.id,
            title: b.title,
            author: b.author,
            cover_image_url: b.cover_image_url,
        });
        Ok(details(&self.policy, loan, book, now))
    }

    /// Every active loan with due-soon and overdue counters
    pub async fn get_active_loans(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> AppResult<ActiveLoansReport> {
        principal.authorize(Operation::ViewAllLoans)?;

        let loans: Vec<LoanDetails> = self
            .store
            .list_active_loans(None)
            .await?
            .into_iter()
            .map(|row| details_from_row(&self.policy, row, now))
            .collect();

        let count = |s: LoanStatus| loans.iter().filter(|l| l.status == s).count() as i64;
        let stats = LoanStats {
            total_loans: self.store.count_loans().await?,
            active_loans: loans.len() as i64,
            due_soon_loans: count(LoanStatus::DueSoon),
            overdue_loans: count(LoanStatus::Overdue),
        };

        Ok(ActiveLoansReport { loans, stats })
    }
}
