use agencyportal_core::{TenantId, UserId};

use crate::Role;

/// A fully authorized caller.
///
/// Only [`RequestAuthenticator`](crate::RequestAuthenticator) builds one;
/// handlers read identity from here and never from raw headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub tenant_id: Option<TenantId>,
    /// Digest of the bearer token; CSRF tokens are bound to it.
    pub session_id: String,
}
