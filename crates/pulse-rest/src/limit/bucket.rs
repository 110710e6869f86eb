//! Rate-limit bucket registry
//!
//! Buckets are created lazily and keyed provisionally by the route's
//! local key until a response reveals the server's bucket id, at which
//! point the route is re-bound. Holding a [`Permit`] holds the bucket's
//! lock, so requests sharing a bucket are serialized and never race on
//! stale quota.

use crate::headers::RateLimitHeaders;
use crate::route::Route;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Quota state for one bucket
#[derive(Debug)]
struct BucketState {
    /// Requests left in the current window; decremented speculatively on
    /// reserve, overwritten by every authoritative update
    remaining: u32,
    /// Advertised window quota
    limit: u32,
    /// When the window resets; `None` until the server has told us
    reset_at: Option<Instant>,
}

impl BucketState {
    fn optimistic() -> Self {
        Self {
            remaining: 1,
            limit: 1,
            reset_at: None,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    state: Arc<Mutex<BucketState>>,
    last_used: parking_lot::Mutex<Instant>,
}

impl Bucket {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(BucketState::optimistic())),
            last_used: parking_lot::Mutex::new(Instant::now()),
        })
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

/// Exclusive reservation on a bucket
///
/// Dropping the permit releases the bucket for the next request.
pub struct Permit {
    bucket_id: String,
    guard: OwnedMutexGuard<BucketState>,
}

impl Permit {
    /// Bucket this permit belongs to (provisional until a response has
    /// revealed the server's id)
    #[must_use]
    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    /// How long to wait before the request may be issued
    ///
    /// `None` means the request can go now: either quota remains, or the
    /// window has lapsed, or this bucket has never seen an authoritative
    /// update and is allowed through optimistically.
    #[must_use]
    pub fn ready_in(&self) -> Option<Duration> {
        if self.guard.remaining > 0 {
            return None;
        }
        let reset_at = self.guard.reset_at?;
        let now = Instant::now();
        (reset_at > now).then(|| reset_at - now)
    }

    /// Refill the window after waiting out the reset
    pub fn refill(&mut self) {
        self.guard.remaining = self.guard.limit;
        self.guard.reset_at = None;
    }

    /// Speculatively consume one unit of quota
    pub fn consume(&mut self) {
        self.guard.remaining = self.guard.remaining.saturating_sub(1);
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> u32 {
        self.guard.remaining
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("bucket_id", &self.bucket_id)
            .field("remaining", &self.guard.remaining)
            .finish()
    }
}

/// Registry of rate-limit buckets
///
/// Owns the only mapping from routes to buckets; nothing outside this
/// module mutates quota state.
#[derive(Debug, Default)]
pub struct BucketRegistry {
    /// Local route key to server bucket id, learned from responses
    routes: DashMap<String, String>,
    /// Buckets by id (a local route key until the server id is known)
    buckets: DashMap<String, Arc<Bucket>>,
}

impl BucketRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the bucket for a route
    ///
    /// Waits until no other request holds the same bucket. The returned
    /// permit reports any quota wait via [`Permit::ready_in`].
    pub async fn acquire(&self, route: &Route) -> Permit {
        let route_key = route.bucket_key();
        let bucket_id = self
            .routes
            .get(&route_key)
            .map(|bound| bound.clone())
            .unwrap_or(route_key);

        let bucket = self
            .buckets
            .entry(bucket_id.clone())
            .or_insert_with(Bucket::new)
            .clone();
        bucket.touch();

        let guard = bucket.state.clone().lock_owned().await;
        Permit { bucket_id, guard }
    }

    /// Record an authoritative update from response headers
    ///
    /// Overwrites any speculative quota state and re-binds the route when
    /// the server reveals its bucket id.
    pub fn record(&self, route: &Route, permit: &mut Permit, headers: &RateLimitHeaders) {
        if let Some(limit) = headers.limit {
            permit.guard.limit = limit;
        }
        if let Some(remaining) = headers.remaining {
            permit.guard.remaining = remaining;
        }
        if let Some(reset_after) = headers.reset_after {
            permit.guard.reset_at = Some(Instant::now() + reset_after);
        }

        if let Some(server_bucket) = &headers.bucket {
            if *server_bucket != permit.bucket_id {
                self.bind(route, permit, server_bucket);
            }
        }
    }

    /// Point a route at its server-revealed bucket
    fn bind(&self, route: &Route, permit: &Permit, server_bucket: &str) {
        let route_key = route.bucket_key();

        tracing::debug!(
            route = %route,
            bucket = %server_bucket,
            "Route bound to rate-limit bucket"
        );

        // Carry the provisional bucket (and its lock) over to the server
        // id so in-flight serialization is preserved; if another route
        // already bound this id, its bucket wins and ours is retired.
        if let Some(provisional) = self.buckets.get(&permit.bucket_id).map(|b| b.clone()) {
            self.buckets
                .entry(server_bucket.to_string())
                .or_insert(provisional);
        }
        self.routes.insert(route_key.clone(), server_bucket.to_string());
        if route_key != server_bucket {
            self.buckets.remove(&route_key);
        }
    }

    /// Number of live buckets
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that have not been touched for `max_idle`
    ///
    /// Buckets currently reserved by a permit are never evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.idle_for() <= max_idle || bucket.state.try_lock().is_err());
        self.routes.retain(|_, bucket_id| self.buckets.contains_key(bucket_id));

        let evicted = before - self.buckets.len();
        if evicted > 0 {
            tracing::debug!(evicted = evicted, "Evicted idle rate-limit buckets");
        }
        evicted
    }
}
