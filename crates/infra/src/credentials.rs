//! Credential lookup for the login flow.
//!
//! The real user table lives in the hosted datastore; this is the interface
//! the API consumes plus an in-memory implementation for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agencyportal_core::{TenantId, UserId};

/// A stored user as the login flow sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    /// Raw role spelling as stored; normalized at the auth boundary.
    pub role: Option<String>,
    pub tenant_id: Option<TenantId>,
    /// bcrypt hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl UserRecord {
    /// Check a plaintext password against the stored hash.
    ///
    /// An unparseable hash counts as a mismatch.
    pub fn verify_password(&self, password: &str) -> bool {
        match bcrypt::verify(password, &self.password_hash) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(user_id = %self.id, error = %e, "stored password hash is unusable");
                false
            }
        }
    }
}

/// Hash checked when no account matches the email, so an unknown email
/// costs the same bcrypt work as a wrong password.
#[derive(Debug, Clone)]
pub struct DecoyHash(String);

impl DecoyHash {
    pub fn new(cost: u32) -> Result<Self, DirectoryError> {
        bcrypt::hash("decoy", cost)
            .map(Self)
            .map_err(|e| DirectoryError::Hash(e.to_string()))
    }

    /// Spend one verification on `password`. Never matches.
    pub fn burn(&self, password: &str) {
        let _ = bcrypt::verify(password, &self.0);
    }

    pub fn cost(&self) -> Option<u32> {
        self.0.split('$').nth(2)?.parse().ok()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("email already registered: {0}")]
    Duplicate(String),
}

pub trait CredentialDirectory: Send + Sync {
    /// Case-insensitive lookup by email.
    fn find_by_email(&self, email: &str) -> Option<UserRecord>;
}

impl<S> CredentialDirectory for Arc<S>
where
    S: CredentialDirectory + ?Sized,
{
    fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        (**self).find_by_email(email)
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// In-memory credential directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCredentialDirectory {
    inner: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryCredentialDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: UserRecord) -> Result<(), DirectoryError> {
        let key = email_key(&record.email);
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&key) {
            return Err(DirectoryError::Duplicate(key));
        }
        map.insert(key, record);
        Ok(())
    }

    /// Hash `password` with `cost` and register the user.
    pub fn register(
        &self,
        id: UserId,
        email: &str,
        password: &str,
        role: Option<&str>,
        tenant_id: Option<TenantId>,
        cost: u32,
    ) -> Result<UserRecord, DirectoryError> {
        let password_hash =
            bcrypt::hash(password, cost).map_err(|e| DirectoryError::Hash(e.to_string()))?;
        let record = UserRecord {
            id,
            email: email.trim().to_string(),
            role: role.map(str::to_string),
            tenant_id,
            password_hash,
        };
        self.insert(record.clone())?;
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialDirectory for InMemoryCredentialDirectory {
    fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&email_key(email)).cloned()
    }
}
