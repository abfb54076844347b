use thiserror::Error;

use crate::token::TokenError;

/// Per-request authentication/authorization failures.
///
/// Display strings are for logs. What a client sees comes from
/// [`AuthError::public_message`], which never says which credential check
/// failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no bearer token presented")]
    TokenMissing,

    #[error("bearer token is malformed")]
    TokenMalformed,

    #[error("bearer token has expired")]
    TokenExpired,

    #[error("bearer token signature is invalid")]
    TokenInvalidSignature,

    #[error("role is not recognized")]
    RoleUnrecognized,

    #[error("role is not allowed on this route")]
    RoleNotAllowed,

    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("csrf token missing")]
    CsrfMissing,

    #[error("csrf token invalid")]
    CsrfInvalid,
}

/// HTTP-agnostic response class for an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 429
    TooManyRequests,
}

impl AuthError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            AuthError::TokenMissing
            | AuthError::TokenMalformed
            | AuthError::TokenExpired
            | AuthError::TokenInvalidSignature => StatusClass::Unauthorized,
            AuthError::RoleUnrecognized
            | AuthError::RoleNotAllowed
            | AuthError::TenantMismatch
            | AuthError::CsrfMissing
            | AuthError::CsrfInvalid => StatusClass::Forbidden,
            AuthError::RateLimited { .. } => StatusClass::TooManyRequests,
        }
    }

    /// Machine-readable code for response bodies.
    ///
    /// All credential failures share `unauthorized`.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::TokenMissing
            | AuthError::TokenMalformed
            | AuthError::TokenExpired
            | AuthError::TokenInvalidSignature => "unauthorized",
            AuthError::RoleUnrecognized | AuthError::RoleNotAllowed => "forbidden",
            AuthError::TenantMismatch => "tenant_mismatch",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::CsrfMissing => "csrf_missing",
            AuthError::CsrfInvalid => "csrf_invalid",
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            AuthError::TokenMissing => "authentication required".to_string(),
            AuthError::TokenMalformed
            | AuthError::TokenExpired
            | AuthError::TokenInvalidSignature => "invalid credentials".to_string(),
            AuthError::RoleUnrecognized | AuthError::RoleNotAllowed => {
                "insufficient permissions".to_string()
            }
            AuthError::TenantMismatch => "tenant mismatch".to_string(),
            AuthError::RateLimited { retry_after_secs } => format!(
                "too many requests; retry after {} seconds",
                retry_after_secs
            ),
            AuthError::CsrfMissing => "missing CSRF token".to_string(),
            AuthError::CsrfInvalid => "invalid CSRF token".to_string(),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::InvalidSignature => AuthError::TokenInvalidSignature,
            TokenError::Malformed | TokenError::InvalidTimeWindow | TokenError::Signing(_) => {
                AuthError::TokenMalformed
            }
        }
    }
}
