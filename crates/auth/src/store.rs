//! Keyed, TTL-evicting state behind the rate limiter and CSRF guard.
//!
//! Both stores are traits so a shared external store (keyed by fingerprint
//! or token) can replace the in-process maps without touching call sites.
//! Each method is one atomic operation from the caller's point of view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Fixed-window counter for one fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

pub trait BucketStore: Send + Sync {
    /// Count one request against `key`.
    ///
    /// If the key has no bucket, or its window has ended (`now >= reset_at`),
    /// a fresh window `[now, now + window)` is started first. Returns the
    /// bucket after incrementing.
    fn hit(&self, key: &str, now: DateTime<Utc>, window: Duration) -> Bucket;

    fn peek(&self, key: &str) -> Option<Bucket>;

    fn reset(&self, key: &str);

    /// Drop buckets whose window ended before `idle_before`.
    fn evict_idle(&self, idle_before: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> BucketStore for Arc<S>
where
    S: BucketStore + ?Sized,
{
    fn hit(&self, key: &str, now: DateTime<Utc>, window: Duration) -> Bucket {
        (**self).hit(key, now, window)
    }

    fn peek(&self, key: &str) -> Option<Bucket> {
        (**self).peek(key)
    }

    fn reset(&self, key: &str) {
        (**self).reset(key)
    }

    fn evict_idle(&self, idle_before: DateTime<Utc>) -> usize {
        (**self).evict_idle(idle_before)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// CSRF token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

pub trait CsrfStore: Send + Sync {
    fn insert(&self, token: String, record: CsrfRecord);

    fn get(&self, token: &str) -> Option<CsrfRecord>;

    fn remove(&self, token: &str) -> Option<CsrfRecord>;

    /// Drop records created before `cutoff`.
    fn evict_created_before(&self, cutoff: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> CsrfStore for Arc<S>
where
    S: CsrfStore + ?Sized,
{
    fn insert(&self, token: String, record: CsrfRecord) {
        (**self).insert(token, record)
    }

    fn get(&self, token: &str) -> Option<CsrfRecord> {
        (**self).get(token)
    }

    fn remove(&self, token: &str) -> Option<CsrfRecord> {
        (**self).remove(token)
    }

    fn evict_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        (**self).evict_created_before(cutoff)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// Periodic cleanup hook, driven by a background worker.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Remove entries that are no longer useful at `now`; returns how many.
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

// A panic while holding the lock must not disable limiting for everyone
// else, so poisoned maps are taken over as-is.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process bucket map for single-instance deployments.
#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    inner: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BucketStore for InMemoryBucketStore {
    fn hit(&self, key: &str, now: DateTime<Utc>, window: Duration) -> Bucket {
        let mut map = lock(&self.inner);
        let bucket = map.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            reset_at: now + window,
        });
        if now >= bucket.reset_at {
            *bucket = Bucket {
                count: 0,
                reset_at: now + window,
            };
        }
        bucket.count = bucket.count.saturating_add(1);
        *bucket
    }

    fn peek(&self, key: &str) -> Option<Bucket> {
        lock(&self.inner).get(key).copied()
    }

    fn reset(&self, key: &str) {
        lock(&self.inner).remove(key);
    }

    fn evict_idle(&self, idle_before: DateTime<Utc>) -> usize {
        let mut map = lock(&self.inner);
        let before = map.len();
        map.retain(|_, b| b.reset_at >= idle_before);
        before - map.len()
    }

    fn len(&self) -> usize {
        lock(&self.inner).len()
    }
}

/// In-process CSRF token map for single-instance deployments.
#[derive(Debug, Default)]
pub struct InMemoryCsrfStore {
    inner: Mutex<HashMap<String, CsrfRecord>>,
}

impl InMemoryCsrfStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CsrfStore for InMemoryCsrfStore {
    fn insert(&self, token: String, record: CsrfRecord) {
        lock(&self.inner).insert(token, record);
    }

    fn get(&self, token: &str) -> Option<CsrfRecord> {
        lock(&self.inner).get(token).cloned()
    }

    fn remove(&self, token: &str) -> Option<CsrfRecord> {
        lock(&self.inner).remove(token)
    }

    fn evict_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut map = lock(&self.inner);
        let before = map.len();
        map.retain(|_, r| r.created_at >= cutoff);
        before - map.len()
    }

    fn len(&self) -> usize {
        lock(&self.inner).len()
    }
}
