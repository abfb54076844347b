//! Insurance policy rows: the tenant-owned resource behind `/policies/:id`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use agencyportal_auth::ResourceTenants;
use agencyportal_core::{DomainError, DomainResult, ResourceId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Pending,
    Active,
    Lapsed,
    Cancelled,
}

impl core::str::FromStr for PolicyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PolicyStatus::Pending),
            "active" => Ok(PolicyStatus::Active),
            "lapsed" => Ok(PolicyStatus::Lapsed),
            "cancelled" => Ok(PolicyStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "status must be one of: pending, active, lapsed, cancelled (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: ResourceId,
    #[serde(rename = "tenantId")]
    pub tenant_id: TenantId,
    #[serde(rename = "policyNumber")]
    pub policy_number: String,
    #[serde(rename = "holderName")]
    pub holder_name: String,
    pub status: PolicyStatus,
}

/// Policy storage abstraction.
///
/// Tenant isolation is enforced before any of these are called; the
/// directory itself only stores rows.
pub trait PolicyDirectory: ResourceTenants {
    fn get(&self, id: &ResourceId) -> Option<PolicyRecord>;
    fn upsert(&self, record: PolicyRecord);
    fn update_status(&self, id: &ResourceId, status: PolicyStatus) -> DomainResult<PolicyRecord>;
    fn delete(&self, id: &ResourceId) -> DomainResult<PolicyRecord>;
}

impl<S> PolicyDirectory for Arc<S>
where
    S: PolicyDirectory + ?Sized,
{
    fn get(&self, id: &ResourceId) -> Option<PolicyRecord> {
        (**self).get(id)
    }

    fn upsert(&self, record: PolicyRecord) {
        (**self).upsert(record)
    }

    fn update_status(&self, id: &ResourceId, status: PolicyStatus) -> DomainResult<PolicyRecord> {
        (**self).update_status(id, status)
    }

    fn delete(&self, id: &ResourceId) -> DomainResult<PolicyRecord> {
        (**self).delete(id)
    }
}

/// In-memory policy rows for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPolicyDirectory {
    inner: RwLock<HashMap<ResourceId, PolicyRecord>>,
}

impl InMemoryPolicyDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceTenants for InMemoryPolicyDirectory {
    fn tenant_of(&self, id: &ResourceId) -> Option<TenantId> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).map(|p| p.tenant_id.clone())
    }
}

impl PolicyDirectory for InMemoryPolicyDirectory {
    fn get(&self, id: &ResourceId) -> Option<PolicyRecord> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned()
    }

    fn upsert(&self, record: PolicyRecord) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(record.id.clone(), record);
    }

    fn update_status(&self, id: &ResourceId, status: PolicyStatus) -> DomainResult<PolicyRecord> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let record = map.get_mut(id).ok_or_else(DomainError::not_found)?;
        record.status = status;
        Ok(record.clone())
    }

    fn delete(&self, id: &ResourceId) -> DomainResult<PolicyRecord> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(id).ok_or_else(DomainError::not_found)
    }
}
