//! Errors for lookups and input that sit outside the auth decision.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failures raised by identifiers and resource directories.
///
/// Authentication and authorization failures are `agencyportal_auth::AuthError`;
/// nothing here should be reported as 401 or 403.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Request payload rejected, e.g. an unknown policy status.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Blank tenant, user or resource id.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// No row with that id. Only reachable once tenant scope has passed.
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
