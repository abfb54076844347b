//! Single request-entry decision.
//!
//! `Unauthenticated → TokenVerified → RoleChecked → TenantScoped →
//! (CsrfChecked if mutating) → Authorized`. Any failed transition ends in a
//! [`Rejection`]; there are no retries and no partial authorization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use agencyportal_core::ResourceId;

use crate::csrf::{is_safe_method, CsrfCandidates, CsrfGuard};
use crate::roles::{is_allowed, resolve_claimed_role, MissingRolePolicy, RoleSet};
use crate::store::{CsrfStore, InMemoryCsrfStore};
use crate::tenant::{decide, ResourceTenants, TenantDecision};
use crate::token::TokenService;
use crate::{AuthError, Principal};

/// Last state a request reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Unauthenticated,
    TokenVerified,
    RoleChecked,
    TenantScoped,
    CsrfChecked,
    Authorized,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("request rejected after {stage:?}: {error}")]
pub struct Rejection {
    pub stage: AuthStage,
    pub error: AuthError,
}

impl Rejection {
    fn at(stage: AuthStage, error: AuthError) -> Self {
        Self { stage, error }
    }
}

/// What the transport layer pulled out of the request.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub method: &'a str,
    pub bearer: Option<&'a str>,
    pub csrf: CsrfCandidates<'a>,
}

/// Whose tenant the request touches.
#[derive(Clone, Copy)]
pub enum TenantTarget<'a> {
    /// No specific resource; the caller acts inside its own tenant.
    Own,
    /// A stored resource, looked up only after the token and role checks pass.
    Resource {
        id: &'a ResourceId,
        owners: &'a dyn ResourceTenants,
    },
}

/// What a route demands of its callers.
#[derive(Clone, Copy)]
pub struct RouteRequirements<'a> {
    pub allowed: &'a RoleSet,
    pub target: TenantTarget<'a>,
}

pub struct RequestAuthenticator<C = InMemoryCsrfStore> {
    tokens: Arc<TokenService>,
    csrf: Arc<CsrfGuard<C>>,
    missing_role: MissingRolePolicy,
}

impl<C> Clone for RequestAuthenticator<C> {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            csrf: self.csrf.clone(),
            missing_role: self.missing_role,
        }
    }
}

impl<C: CsrfStore> RequestAuthenticator<C> {
    pub fn new(
        tokens: Arc<TokenService>,
        csrf: Arc<CsrfGuard<C>>,
        missing_role: MissingRolePolicy,
    ) -> Self {
        Self {
            tokens,
            csrf,
            missing_role,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn csrf(&self) -> &CsrfGuard<C> {
        &self.csrf
    }

    pub fn missing_role(&self) -> MissingRolePolicy {
        self.missing_role
    }

    /// Shared handle to the guard, for the sweep worker.
    pub fn csrf_handle(&self) -> Arc<CsrfGuard<C>> {
        self.csrf.clone()
    }

    pub fn authenticate(
        &self,
        req: &AuthRequest<'_>,
        route: &RouteRequirements<'_>,
        now: DateTime<Utc>,
    ) -> Result<Principal, Rejection> {
        use AuthStage::*;

        let token = req
            .bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(Rejection::at(Unauthenticated, AuthError::TokenMissing))?;

        let claims = self
            .tokens
            .verify(token, now)
            .map_err(|e| Rejection::at(Unauthenticated, e.into()))?;

        let role = resolve_claimed_role(claims.role.as_deref(), self.missing_role)
            .map_err(|_| Rejection::at(TokenVerified, AuthError::RoleUnrecognized))?;
        if !is_allowed(role, route.allowed) {
            return Err(Rejection::at(TokenVerified, AuthError::RoleNotAllowed));
        }

        let resource_tenant = match route.target {
            TenantTarget::Own => claims.tenant_id.clone(),
            TenantTarget::Resource { id, owners } => owners.tenant_of(id),
        };
        if let TenantDecision::Deny(_) =
            decide(role, claims.tenant_id.as_ref(), resource_tenant.as_ref())
        {
            return Err(Rejection::at(RoleChecked, AuthError::TenantMismatch));
        }

        let session_id = TokenService::session_id(token);

        let passed = if is_safe_method(req.method) {
            TenantScoped
        } else {
            let presented = req
                .csrf
                .select()
                .ok_or(Rejection::at(TenantScoped, AuthError::CsrfMissing))?;
            if !self.csrf.verify(presented, &session_id, now) {
                return Err(Rejection::at(TenantScoped, AuthError::CsrfInvalid));
            }
            CsrfChecked
        };

        tracing::debug!(
            user_id = %claims.sub,
            role = %role,
            last_check = ?passed,
            stage = ?Authorized,
            "request authorized"
        );

        Ok(Principal {
            user_id: claims.sub,
            email: claims.email,
            role,
            tenant_id: claims.tenant_id,
            session_id,
        })
    }
}
