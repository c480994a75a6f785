//! Route rate limiting.
//!
//! Every REST route is serialized through a lock. Until the server reveals
//! which bucket a route belongs to, the lock is keyed by the route itself;
//! afterwards by the bucket hash, so routes sharing a bucket share a lock.
//! A global gate, when tripped, holds back every request.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

/// Exclusive access to a route's bucket for one request.
///
/// Dropping the guard releases the bucket.
#[derive(Debug)]
pub struct RouteGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl RouteGuard {
    /// The bucket key the lock was taken under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Keep the bucket locked for `delay`, then release it.
    ///
    /// Used when the server reports the bucket as exhausted.
    pub fn release_after(self, delay: Duration) {
        trace!(bucket = %self.key, ?delay, "Holding exhausted bucket");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            drop(self);
        });
    }
}

/// Per-bucket locks plus the global gate.
pub struct RateLimiter {
    /// Route key to bucket hash, learned from responses.
    buckets: DashMap<String, String>,
    /// Bucket hash (or route key while unknown) to lock.
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// `true` while the global limit is in effect.
    global: watch::Sender<bool>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            locks: DashMap::new(),
            global: watch::channel(false).0,
        }
    }

    /// The bucket hash learned for a route, if any.
    #[must_use]
    pub fn bucket(&self, route: &str) -> Option<String> {
        self.buckets.get(route).map(|hash| hash.value().clone())
    }

    fn lock_key(&self, route: &str) -> String {
        self.bucket(route).unwrap_or_else(|| route.to_string())
    }

    /// The lock currently guarding a route.
    #[must_use]
    pub fn lock_for(&self, route: &str) -> Arc<Mutex<()>> {
        let key = self.lock_key(route);
        Arc::clone(self.locks.entry(key).or_default().value())
    }

    /// Wait for the global gate and then for the route's bucket.
    pub async fn acquire(&self, route: &str) -> RouteGuard {
        loop {
            self.wait_global().await;

            let key = self.lock_key(route);
            let lock = self.lock_for(route);
            let guard = Arc::clone(&lock).lock_owned().await;

            // The route may have joined another bucket while queued.
            if !Arc::ptr_eq(&lock, &self.lock_for(route)) {
                trace!(route, "Route moved to another bucket, locking again");
                continue;
            }

            // The gate may have been tripped while queued on the bucket.
            self.wait_global().await;
            return RouteGuard { key, _guard: guard };
        }
    }

    /// Record the bucket hash a response revealed for a route.
    ///
    /// A lock created under the route key moves to the hash, unless
    /// another route already created one there.
    pub fn record_bucket(&self, route: &str, hash: &str) {
        if self.bucket(route).as_deref() == Some(hash) {
            return;
        }

        debug!(route, bucket = hash, "Learned rate limit bucket");
        self.buckets.insert(route.to_string(), hash.to_string());
        if let Some((_, lock)) = self.locks.remove(route) {
            self.locks.entry(hash.to_string()).or_insert(lock);
        }
    }

    /// Block every request until [`reset_global`](Self::reset_global).
    pub fn trip_global(&self) {
        self.global.send_replace(true);
    }

    pub fn reset_global(&self) {
        self.global.send_replace(false);
    }

    #[must_use]
    pub fn is_global_tripped(&self) -> bool {
        *self.global.borrow()
    }

    async fn wait_global(&self) {
        let mut gate = self.global.subscribe();
        let _ = gate.wait_for(|tripped| !*tripped).await;
    }

    /// Forget all buckets and locks and open the global gate.
    pub fn clear(&self) {
        self.buckets.clear();
        self.locks.clear();
        self.reset_global();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.buckets.len())
            .field("locks", &self.locks.len())
            .field("global", &self.is_global_tripped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    const GET_USER: &str = "GET /users/{user_id}";
    const GET_ME: &str = "GET /users/@me";

    #[test]
    fn test_unknown_route_uses_route_key() {
        let limiter = RateLimiter::new();
        assert!(Arc::ptr_eq(&limiter.lock_for(GET_USER), &limiter.lock_for(GET_USER)));
        assert!(!Arc::ptr_eq(&limiter.lock_for(GET_USER), &limiter.lock_for(GET_ME)));
    }

    #[test]
    fn test_bucket_aliasing() {
        let limiter = RateLimiter::new();
        let before = limiter.lock_for(GET_USER);

        limiter.record_bucket(GET_USER, "abcd");
        limiter.record_bucket(GET_ME, "abcd");

        let user = limiter.lock_for(GET_USER);
        let me = limiter.lock_for(GET_ME);
        assert!(Arc::ptr_eq(&user, &me));
        // The fallback lock was re-keyed, not replaced.
        assert!(Arc::ptr_eq(&before, &user));
        assert_eq!(limiter.bucket(GET_ME).as_deref(), Some("abcd"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aliased_routes_contend() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.record_bucket(GET_USER, "abcd");
        limiter.record_bucket(GET_ME, "abcd");

        let guard = limiter.acquire(GET_USER).await;
        assert_eq!(guard.key(), "abcd");
        assert!(timeout(Duration::from_secs(5), limiter.acquire(GET_ME))
            .await
            .is_err());

        drop(guard);
        assert!(timeout(Duration::from_secs(5), limiter.acquire(GET_ME))
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_follows_route_into_shared_bucket() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.record_bucket(GET_USER, "abcd");

        let fallback = limiter.acquire(GET_ME).await;
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let guard = limiter.acquire(GET_ME).await;
                guard.key().to_string()
            })
        };
        sleep(Duration::from_millis(10)).await;

        // GET_ME joins a bucket that already has a lock of its own.
        limiter.record_bucket(GET_ME, "abcd");
        let shared = limiter.acquire(GET_USER).await;
        drop(fallback);

        sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        drop(shared);
        let key = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should take the shared bucket")
            .unwrap();
        assert_eq!(key, "abcd");
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_gate_dominates() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.trip_global();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let _guard = limiter.acquire("GET /never/used").await;
            })
        };

        sleep(Duration::from_secs(30)).await;
        assert!(!waiter.is_finished());

        limiter.reset_global();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("acquire should proceed after reset")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_holds_bucket() {
        let limiter = Arc::new(RateLimiter::new());
        limiter
            .acquire(GET_USER)
            .await
            .release_after(Duration::from_secs(3));

        assert!(timeout(Duration::from_secs(2), limiter.acquire(GET_USER))
            .await
            .is_err());
        assert!(timeout(Duration::from_secs(2), limiter.acquire(GET_USER))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_clear() {
        let limiter = RateLimiter::new();
        limiter.record_bucket(GET_USER, "abcd");
        limiter.trip_global();
        limiter.clear();

        assert!(limiter.bucket(GET_USER).is_none());
        assert!(!limiter.is_global_tripped());
        let _guard = limiter.acquire(GET_USER).await;
    }
}
