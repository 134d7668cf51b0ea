/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Expiry-aware single-flight cache

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{OnceCell, RwLock};

type Slot<T, E> = OnceCell<Result<(T, Option<SystemTime>), E>>;

/// Cache for a value that expires
///
/// At most one load runs at a time. Callers that arrive while a load is in flight wait for it and
/// receive its outcome, including its error. If the caller driving the load is dropped, one of the
/// waiting callers takes the load over.
///
/// Failed loads are never served to a caller that arrives after the failure: the next call to
/// [`ExpiringCache::yield_or_clear_if_expired`] evicts them.
pub(crate) struct ExpiringCache<T, E> {
    // Values are considered expired `buffer_time` before their expiry
    buffer_time: Duration,
    value: Arc<RwLock<Slot<T, E>>>,
}

impl<T, E> Clone for ExpiringCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            buffer_time: self.buffer_time,
            value: self.value.clone(),
        }
    }
}

impl<T, E> fmt::Debug for ExpiringCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("buffer_time", &self.buffer_time)
            .finish()
    }
}

impl<T, E> ExpiringCache<T, E>
where
    T: Clone,
    E: Clone,
{
    pub(crate) fn new(buffer_time: Duration) -> Self {
        ExpiringCache {
            buffer_time,
            value: Arc::new(RwLock::new(OnceCell::new())),
        }
    }

    /// Returns the cached value whether or not it has expired
    #[cfg(test)]
    pub(crate) async fn get(&self) -> Option<T> {
        match self.value.read().await.get() {
            Some(Ok((value, _expiry))) => Some(value.clone()),
            _ => None,
        }
    }

    /// Return the cached value, or wait for the load in flight, or run `f` to load a new one
    ///
    /// `f` returns the value and its expiry. A value without an expiry never expires.
    pub(crate) async fn get_or_load<F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Option<SystemTime>), E>>,
    {
        let lock = self.value.read().await;
        let future = lock.get_or_init(f);
        match future.await {
            Ok((value, _expiry)) => Ok(value.clone()),
            Err(err) => Err(err.clone()),
        }
    }

    /// Drop the cached value so that the next load starts over
    pub(crate) async fn invalidate(&self) {
        *self.value.write().await = OnceCell::new();
    }

    /// Return the cached value if it is still fresh at `now`
    ///
    /// An expired value or a failed load is evicted so that the next
    /// [`get_or_load`](ExpiringCache::get_or_load) starts a new load. An empty slot is left
    /// alone: a load may be in flight.
    pub(crate) async fn yield_or_clear_if_expired(&self, now: SystemTime) -> Option<T> {
        match self.value.read().await.get() {
            None => return None,
            Some(Ok((value, expiry))) if !expired(*expiry, self.buffer_time, now) => {
                return Some(value.clone())
            }
            Some(_) => {}
        }

        let mut lock = self.value.write().await;
        // Another caller may already have cleared the slot and stored a fresh value
        let stale = match lock.get() {
            Some(Ok((_, expiry))) => expired(*expiry, self.buffer_time, now),
            Some(Err(_)) => true,
            None => false,
        };
        if stale {
            *lock = OnceCell::new();
        }
        None
    }
}

fn expired(expiry: Option<SystemTime>, buffer_time: Duration, now: SystemTime) -> bool {
    match expiry {
        None => false,
        Some(expiry) => match expiry.checked_sub(buffer_time) {
            Some(refresh_at) => now >= refresh_at,
            None => true,
        },
    }
}

#[cfg(test)]
mod test {
    use super::{expired, ExpiringCache};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tokio::sync::Notify;

    fn epoch_secs(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn expired_check() {
        let buffer = Duration::from_secs(10);
        assert!(expired(Some(epoch_secs(100)), buffer, epoch_secs(1000)));
        assert!(expired(Some(epoch_secs(100)), buffer, epoch_secs(90)));
        assert!(!expired(Some(epoch_secs(100)), buffer, epoch_secs(89)));
        assert!(!expired(None, buffer, epoch_secs(u32::MAX as u64)));
    }

    #[tokio::test]
    async fn cache_clears_if_expired_only() {
        let cache: ExpiringCache<&str, ()> = ExpiringCache::new(Duration::from_secs(10));
        assert_eq!(None, cache.yield_or_clear_if_expired(epoch_secs(10)).await);

        let value = cache
            .get_or_load(|| async { Ok(("one", Some(epoch_secs(100)))) })
            .await
            .unwrap();
        assert_eq!("one", value);

        assert_eq!(
            Some("one"),
            cache.yield_or_clear_if_expired(epoch_secs(10)).await
        );
        // inside the buffer
        assert_eq!(None, cache.yield_or_clear_if_expired(epoch_secs(95)).await);
        assert_eq!(None, cache.get().await);
    }

    #[tokio::test]
    async fn values_without_expiry_never_expire() {
        let cache: ExpiringCache<&str, ()> = ExpiringCache::new(Duration::from_secs(10));
        cache
            .get_or_load(|| async { Ok(("forever", None)) })
            .await
            .unwrap();
        assert_eq!(
            Some("forever"),
            cache.yield_or_clear_if_expired(epoch_secs(u32::MAX as u64)).await
        );
    }

    #[tokio::test]
    async fn failures_are_evicted() {
        let cache: ExpiringCache<&str, &str> = ExpiringCache::new(Duration::from_secs(10));
        let err = cache
            .get_or_load(|| async { Err("boom") })
            .await
            .expect_err("load failed");
        assert_eq!("boom", err);

        assert_eq!(None, cache.yield_or_clear_if_expired(epoch_secs(0)).await);
        let value = cache
            .get_or_load(|| async { Ok(("recovered", None)) })
            .await
            .unwrap();
        assert_eq!("recovered", value);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let cache: ExpiringCache<usize, &str> = ExpiringCache::new(Duration::from_secs(10));
        let loads = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let loads = loads.clone();
            let release = release.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_load(|| async move {
                        let n = loads.fetch_add(1, Ordering::SeqCst) + 1;
                        release.notified().await;
                        Ok((n, None))
                    })
                    .await
            }));
        }
        // wait until one loader is parked
        while loads.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        release.notify_one();
        for task in tasks {
            assert_eq!(Ok(1), task.await.unwrap());
        }
        assert_eq!(1, loads.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failure() {
        let cache: ExpiringCache<usize, &str> = ExpiringCache::new(Duration::from_secs(10));
        let loads = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let loads = loads.clone();
            let release = release.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_load(|| async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Err("failed")
                    })
                    .await
            }));
        }
        while loads.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        release.notify_one();
        for task in tasks {
            assert_eq!(Err("failed"), task.await.unwrap());
        }
        assert_eq!(1, loads.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropped_loader_is_taken_over() {
        let cache: ExpiringCache<&str, ()> = ExpiringCache::new(Duration::from_secs(10));
        let stuck = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_load(|| std::future::pending()),
        )
        .await;
        assert!(stuck.is_err());

        let value = cache
            .get_or_load(|| async { Ok(("second", None)) })
            .await
            .unwrap();
        assert_eq!("second", value);
    }
}
