//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, ledger, loans};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Biblioteca API",
        version = "0.1.0",
        description = "School library catalog and loan tracker REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book_stats,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Loans
        loans::create_loan,
        loans::return_loan,
        loans::get_my_loans,
        loans::get_user_loans,
        loans::get_loan,
        loans::list_active_loans,
        // Administration
        ledger::audit_ledger,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookFields,
            crate::models::book::BookView,
            crate::models::book::BookStats,
            crate::models::book::LedgerAudit,
            crate::models::book::LedgerDiscrepancy,
            // Loans
            loans::CreateLoanRequest,
            crate::models::loan::Loan,
            crate::models::loan::LoanBook,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanStats,
            crate::models::loan::ReturnReceipt,
            crate::services::loans::ActiveLoansReport,
            // Users
            crate::models::user::Role,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "loans", description = "Borrowing and returning books"),
        (name = "admin", description = "Inventory ledger administration")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
