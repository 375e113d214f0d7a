//! Inventory ledger audit endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, models::book::LedgerAudit, AppState};

use super::AuthenticatedUser;

/// Check every book's available copies against its open loans
#[utoipa::path(
    get,
    path = "/admin/ledger",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Audit report", body = LedgerAudit),
        (status = 403, description = "Admin only")
    )
)]
pub async fn audit_ledger(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<LedgerAudit>> {
    let audit = state.services.coordinator.audit_ledger(&principal).await?;
    Ok(Json(audit))
}
