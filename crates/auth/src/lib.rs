//! `agencyportal-auth` — authentication and tenant-isolation core.
//!
//! Decoupled from HTTP and storage: time is always passed in, and shared
//! state lives behind the store traits in [`store`].

pub mod authenticator;
pub mod claims;
pub mod csrf;
pub mod error;
pub mod principal;
pub mod rate_limit;
pub mod roles;
pub mod store;
pub mod tenant;
pub mod token;

pub use authenticator::{
    AuthRequest, AuthStage, Rejection, RequestAuthenticator, RouteRequirements, TenantTarget,
};
pub use claims::{validate_claims, ClaimsError, SessionClaims};
pub use csrf::{is_safe_method, CsrfCandidates, CsrfGuard, IssuedCsrfToken};
pub use error::{AuthError, StatusClass};
pub use principal::Principal;
pub use rate_limit::{
    client_address, login_fingerprint, RateLimitDecision, RateLimitPolicy, RateLimitStatus,
    RateLimiter,
};
pub use roles::{
    is_allowed, normalize, resolve_claimed_role, resolve_redirect_target, MissingRolePolicy, Role,
    RoleSet, UnrecognizedRole,
};
pub use store::{
    Bucket, BucketStore, CsrfRecord, CsrfStore, InMemoryBucketStore, InMemoryCsrfStore, Sweep,
};
pub use tenant::{decide, ResourceTenants, TenantDecision, TenantMismatch};
pub use token::{MissingSigningSecret, SigningSecret, TokenError, TokenService};
