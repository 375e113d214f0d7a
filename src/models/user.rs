//! Caller identity: role, bearer-token claims and capability checks

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// User role as issued by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Something a caller wants to do; checked once per request by [`Principal::authorize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Borrow a book for oneself
    Borrow,
    /// Close a loan held by `owner`
    ReturnLoan { owner: Uuid },
    /// Create, edit or delete catalog entries
    ManageCatalog,
    /// Read the loans of `owner`
    ViewLoans { owner: Uuid },
    /// Read every active loan in the library
    ViewAllLoans,
    /// Run the inventory ledger audit
    AuditLedger,
}

/// An authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Capability check for `operation`
    pub fn authorize(&self, operation: Operation) -> Result<(), AppError> {
        let allowed = match operation {
            Operation::Borrow => true,
            Operation::ReturnLoan { owner } | Operation::ViewLoans { owner } => {
                self.is_admin() || owner == self.user_id
            }
            Operation::ManageCatalog | Operation::ViewAllLoans | Operation::AuditLedger => {
                self.is_admin()
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} {} may not perform {:?}",
                self.role, self.user_id, operation
            )))
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: Uuid,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Claims for `principal`, valid for `ttl` from now
    pub fn for_principal(principal: Principal, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: principal.user_id.to_string(),
            user_id: principal.user_id,
            role: principal.role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.user_id, self.role)
    }
}
