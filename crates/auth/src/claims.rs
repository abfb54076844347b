use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agencyportal_core::{TenantId, UserId};

/// Session token claims.
///
/// Created at login, never mutated. The role is carried raw; normalization
/// happens at the authentication boundary so that legacy spellings minted by
/// older issuers keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject / user identifier. Older issuers wrote it as `id`.
    #[serde(alias = "id")]
    pub sub: UserId,

    pub email: String,

    /// Raw role spelling as issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Tenant (agency) the session acts within.
    #[serde(rename = "tenantId", default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Build claims valid for `ttl` starting at `now`.
    ///
    /// Timestamps are truncated to whole seconds (the wire resolution), so a
    /// verified token yields claims equal to the ones that were issued.
    pub fn new(
        sub: UserId,
        email: impl Into<String>,
        role: Option<String>,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let issued_at = truncate_to_seconds(now);
        Self {
            sub,
            email: email.into(),
            role,
            tenant_id,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// Whole seconds of validity left at `now` (0 once expired).
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.expires_at - now).num_seconds()).unwrap_or(0)
    }
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Check the time window of a claim set.
///
/// Expiry is inclusive: a token whose `exp` equals `now` is already expired.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), ClaimsError> {
    if claims.expires_at <= claims.issued_at {
        return Err(ClaimsError::InvalidTimeWindow);
    }
    if claims.expires_at <= now {
        return Err(ClaimsError::Expired);
    }
    Ok(())
}
