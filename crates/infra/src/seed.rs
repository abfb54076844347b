//! JSON seed data for local runs.
//!
//! Production users and policies live in the hosted datastore; this only
//! gives the in-memory directories something to serve.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use agencyportal_core::{TenantId, UserId};

use crate::credentials::{DirectoryError, InMemoryCredentialDirectory};
use crate::policies::{PolicyDirectory, PolicyRecord};

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    /// Generated when absent.
    pub id: Option<UserId>,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub policies: Vec<PolicyRecord>,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("reading seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl SeedData {
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Hash passwords with `cost` and populate both directories.
    pub fn apply<P: PolicyDirectory>(
        self,
        users: &InMemoryCredentialDirectory,
        policies: &P,
        cost: u32,
    ) -> Result<(), SeedError> {
        let (user_count, policy_count) = (self.users.len(), self.policies.len());

        for u in self.users {
            users.register(
                u.id.unwrap_or_else(UserId::generate),
                &u.email,
                &u.password,
                u.role.as_deref(),
                u.tenant_id,
                cost,
            )?;
        }
        for p in self.policies {
            policies.upsert(p);
        }

        tracing::info!(users = user_count, policies = policy_count, "seed data applied");
        Ok(())
    }
}
