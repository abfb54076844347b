use agencyportal_auth::{Principal, Role};
use agencyportal_core::{TenantId, UserId};

/// Authorized caller for a request.
///
/// Inserted by the route guard; handlers never look at raw auth headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    principal: Principal,
}

impl AuthContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> &UserId {
        &self.principal.user_id
    }

    pub fn email(&self) -> &str {
        &self.principal.email
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.principal.tenant_id.as_ref()
    }

    /// Session the caller's CSRF tokens are bound to.
    pub fn session_id(&self) -> &str {
        &self.principal.session_id
    }
}

/// Best-effort client address, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

impl ClientAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
