//! Tenant isolation: the single place that decides cross-tenant access.

use std::sync::Arc;

use thiserror::Error;

use agencyportal_core::{ResourceId, TenantId};

use crate::Role;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("tenant mismatch")]
pub struct TenantMismatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantDecision {
    Allow,
    Deny(TenantMismatch),
}

impl TenantDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, TenantDecision::Allow)
    }
}

/// Decide whether a caller may touch a resource owned by `resource_tenant`.
///
/// - super-admin: always allowed (universal bypass)
/// - every other role: exact equality of non-blank tenant ids
/// - a missing id on either side denies
pub fn decide(
    caller_role: Role,
    caller_tenant: Option<&TenantId>,
    resource_tenant: Option<&TenantId>,
) -> TenantDecision {
    if caller_role.is_super_admin() {
        return TenantDecision::Allow;
    }

    match (present(caller_tenant), present(resource_tenant)) {
        (Some(caller), Some(resource)) if caller == resource => TenantDecision::Allow,
        _ => TenantDecision::Deny(TenantMismatch),
    }
}

fn present(id: Option<&TenantId>) -> Option<&TenantId> {
    id.filter(|t| !t.as_str().trim().is_empty())
}

/// Owner lookup for tenant-scoped resources.
///
/// Implemented by whatever datastore adapter owns the resource rows.
pub trait ResourceTenants: Send + Sync {
    /// Tenant owning `id`, or `None` if the resource does not exist.
    fn tenant_of(&self, id: &ResourceId) -> Option<TenantId>;
}

impl<S> ResourceTenants for Arc<S>
where
    S: ResourceTenants + ?Sized,
{
    fn tenant_of(&self, id: &ResourceId) -> Option<TenantId> {
        (**self).tenant_of(id)
    }
}
