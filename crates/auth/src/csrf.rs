//! Per-session anti-forgery tokens for state-changing requests.
//!
//! Tokens are not single-use: a token stays valid for its session until the
//! TTL runs out, no matter how many requests present it.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

use crate::store::{CsrfRecord, CsrfStore, InMemoryCsrfStore, Sweep};

const TOKEN_BYTES: usize = 32;

/// Transport names for the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_FIELD: &str = "_csrf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCsrfToken {
    pub token: String,
    pub expires_in_secs: u64,
}

pub struct CsrfGuard<S = InMemoryCsrfStore> {
    ttl: Duration,
    store: S,
}

impl CsrfGuard<InMemoryCsrfStore> {
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(ttl, InMemoryCsrfStore::new())
    }
}

impl<S: CsrfStore> CsrfGuard<S> {
    pub fn new(ttl: Duration, store: S) -> Self {
        Self { ttl, store }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mint a fresh token bound to `session_id`.
    pub fn issue(&self, session_id: &str, now: DateTime<Utc>) -> IssuedCsrfToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.store.insert(
            token.clone(),
            CsrfRecord {
                session_id: session_id.to_string(),
                created_at: now,
            },
        );

        IssuedCsrfToken {
            token,
            expires_in_secs: u64::try_from(self.ttl.num_seconds()).unwrap_or(0),
        }
    }

    /// Check `token` for `session_id` at `now`.
    ///
    /// An expired token is removed as a side effect, whichever session
    /// presented it.
    pub fn verify(&self, token: &str, session_id: &str, now: DateTime<Utc>) -> bool {
        let Some(record) = self.store.get(token) else {
            return false;
        };

        if now >= record.created_at + self.ttl {
            self.store.remove(token);
            tracing::debug!("purged expired csrf token on verification");
            return false;
        }

        record.session_id == session_id
    }
}

impl<S: CsrfStore> Sweep for CsrfGuard<S> {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.store.evict_created_before(now - self.ttl)
    }
}

/// Read-only methods never need a CSRF token.
pub fn is_safe_method(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "OPTIONS" | "TRACE"
    )
}

/// Every place a client may put its CSRF token.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfCandidates<'a> {
    pub header: Option<&'a str>,
    pub cookie: Option<&'a str>,
    pub query: Option<&'a str>,
    pub body: Option<&'a str>,
}

impl<'a> CsrfCandidates<'a> {
    /// First non-blank token in header > cookie > query > body order.
    pub fn select(&self) -> Option<&'a str> {
        [self.header, self.cookie, self.query, self.body]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
    }
}
