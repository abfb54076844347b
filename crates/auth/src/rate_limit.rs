//! Fixed-window rate limiting keyed by client fingerprint.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};

use crate::store::{BucketStore, InMemoryBucketStore, Sweep};

/// Window size and request budget for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// Brute-force protection for credential checks.
    pub fn login() -> Self {
        Self::new(5, Duration::minutes(15))
    }

    /// General authenticated API traffic.
    pub fn api() -> Self {
        Self::new(100, Duration::minutes(1))
    }

    /// Destructive or otherwise sensitive operations.
    pub fn sensitive() -> Self {
        Self::new(10, Duration::hours(1))
    }
}

/// Snapshot of a bucket after a check, used for `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(RateLimitStatus),
    Limited {
        retry_after_secs: u64,
        status: RateLimitStatus,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed(_))
    }

    pub fn status(&self) -> &RateLimitStatus {
        match self {
            RateLimitDecision::Allowed(status) => status,
            RateLimitDecision::Limited { status, .. } => status,
        }
    }
}

pub struct RateLimiter<S = InMemoryBucketStore> {
    name: &'static str,
    policy: RateLimitPolicy,
    store: S,
}

impl RateLimiter<InMemoryBucketStore> {
    pub fn in_memory(name: &'static str, policy: RateLimitPolicy) -> Self {
        Self::new(name, policy, InMemoryBucketStore::new())
    }
}

impl<S: BucketStore> RateLimiter<S> {
    pub fn new(name: &'static str, policy: RateLimitPolicy, store: S) -> Self {
        Self { name, policy, store }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Count one request for `fingerprint` and decide whether it may proceed.
    ///
    /// Requests past the budget are still counted; they are what keeps the
    /// bucket limited until the window rolls over.
    pub fn check(&self, fingerprint: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let bucket = self.store.hit(fingerprint, now, self.policy.window);
        let status = RateLimitStatus {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests.saturating_sub(bucket.count),
            reset_at: bucket.reset_at,
        };

        if bucket.count <= self.policy.max_requests {
            return RateLimitDecision::Allowed(status);
        }

        let retry_after_secs = ceil_secs(bucket.reset_at - now).max(1);
        tracing::warn!(
            limiter = self.name,
            fingerprint = %fingerprint,
            count = bucket.count,
            retry_after_secs,
            "rate limit exceeded"
        );
        RateLimitDecision::Limited {
            retry_after_secs,
            status,
        }
    }

    /// Forget a fingerprint's bucket (e.g. after a successful login).
    ///
    /// Returns the full budget the fingerprint now has.
    pub fn reset(&self, fingerprint: &str, now: DateTime<Utc>) -> RateLimitStatus {
        self.store.reset(fingerprint);
        RateLimitStatus {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests,
            reset_at: now + self.policy.window,
        }
    }
}

impl<S: BucketStore> Sweep for RateLimiter<S> {
    fn name(&self) -> &'static str {
        self.name
    }

    /// A bucket is dropped once a full further window has passed since it
    /// reset; by then its next hit would start a fresh window anyway.
    fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.store.evict_idle(now - self.policy.window)
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let ms = d.num_milliseconds().max(0);
    u64::try_from((ms + 999) / 1000).unwrap_or(0)
}

/// Best-effort client address.
///
/// Prefers the first hop of `X-Forwarded-For`, then `X-Real-IP`, then the
/// socket peer. Falls back to `"unknown"` so the request is still limited
/// (sharing a bucket with other unidentifiable callers).
pub fn client_address(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    let forwarded = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = real_ip.map(str::trim).filter(|v| !v.is_empty());

    forwarded
        .or(real)
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Fingerprint for login-shaped requests: address plus attempted identity.
///
/// Salting with the identifier keeps one attacker from exhausting a shared
/// address's budget for every account behind it.
pub fn login_fingerprint(address: &str, identifier: &str) -> String {
    format!("login:{}:{}", address, identifier.trim().to_lowercase())
}
