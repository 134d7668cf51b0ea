/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Lazy, caching, credentials provider implementation

use crate::meta::cache::ExpiringCache;
use crate::provider::credentials::{
    self, future, CredentialsError, ProvideCredentials, SharedCredentialsProvider,
};
use crate::timeout::Timeout;
use crate::Credentials;
use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep, TokioSleep};
use aws_smithy_async::time::{SharedTimeSource, SystemTimeSource};
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_BUFFER_TIME: Duration = Duration::from_secs(10);

/// `LazyCachingCredentialsProvider` implements [`ProvideCredentials`] by caching
/// credentials that it loads by calling a user-provided [`ProvideCredentials`] implementation.
///
/// For example, you can provide an [`ProvideCredentials`] implementation that calls
/// AWS STS's AssumeRole operation to get temporary credentials, and `LazyCachingCredentialsProvider`
/// will cache those credentials until they expire.
///
/// Callers that arrive while credentials are being loaded wait for that load rather than starting
/// their own. A failed or timed out load is returned to every caller that waited on it and is never
/// cached. Credentials without an expiry are cached forever.
#[derive(Debug)]
pub struct LazyCachingCredentialsProvider {
    time: SharedTimeSource,
    sleeper: SharedAsyncSleep,
    cache: ExpiringCache<Credentials, CredentialsError>,
    loader: SharedCredentialsProvider,
    load_timeout: Duration,
}

impl LazyCachingCredentialsProvider {
    fn new(
        time: SharedTimeSource,
        sleeper: SharedAsyncSleep,
        loader: SharedCredentialsProvider,
        load_timeout: Duration,
        buffer_time: Duration,
    ) -> Self {
        LazyCachingCredentialsProvider {
            time,
            sleeper,
            cache: ExpiringCache::new(buffer_time),
            loader,
            load_timeout,
        }
    }

    /// Returns a new `Builder` that can be used to construct the `LazyCachingCredentialsProvider`.
    pub fn builder() -> builder::Builder {
        builder::Builder::new()
    }

    async fn credentials(&self) -> credentials::Result {
        let now = self.time.now();
        // Attempt to get cached credentials, or clear the cache if they're expired
        if let Some(credentials) = self.cache.yield_or_clear_if_expired(now).await {
            debug!("loaded credentials from cache");
            return Ok(credentials);
        }

        // If we didn't get credentials from the cache, then we need to try and load.
        // There may be other threads also loading simultaneously, but this is OK
        // since the futures are not eagerly executed, and the cache will only run one
        // of them.
        let future = Timeout::new(
            self.loader.provide_credentials(),
            self.sleeper.sleep(self.load_timeout),
        );
        let load_timeout = self.load_timeout;
        let start_time = self.time.now();
        let result = self
            .cache
            .get_or_load(|| {
                let span = info_span!("lazy_load_credentials");
                async move {
                    let credentials = future
                        .await
                        .map_err(|_| CredentialsError::provider_timed_out(load_timeout))??;
                    let expiry = credentials.expiry();
                    Ok((credentials, expiry))
                }
                .instrument(span)
            })
            .await;
        debug!(
            load_time = ?self.time.now().duration_since(start_time).unwrap_or_default(),
            "caching provider finished loading credentials"
        );
        result
    }
}

impl ProvideCredentials for LazyCachingCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.credentials())
    }
}

/// Builder for [`LazyCachingCredentialsProvider`]
pub mod builder {
    use super::{LazyCachingCredentialsProvider, DEFAULT_BUFFER_TIME, DEFAULT_LOAD_TIMEOUT};
    use crate::provider::credentials::{ProvideCredentials, SharedCredentialsProvider};
    use crate::provider_config::ProviderConfig;
    use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep};
    use aws_smithy_async::time::{SharedTimeSource, TimeSource};
    use std::time::Duration;

    /// Builder for constructing a [`LazyCachingCredentialsProvider`].
    ///
    /// # Examples
    ///
    /// ```
    /// use aws_credential_providers::Credentials;
    /// use aws_credential_providers::meta::credentials::provide_credentials_fn;
    /// use aws_credential_providers::meta::credentials::LazyCachingCredentialsProvider;
    /// use std::time::Duration;
    ///
    /// let provider = LazyCachingCredentialsProvider::builder()
    ///     .load_timeout(Duration::from_secs(30))
    ///     .build(provide_credentials_fn(|| async {
    ///         // An async process to retrieve credentials would go here:
    ///         Ok(Credentials::from_keys("example", "example", None))
    ///     }));
    /// ```
    #[derive(Debug, Default)]
    pub struct Builder {
        sleep: Option<SharedAsyncSleep>,
        time_source: Option<SharedTimeSource>,
        load_timeout: Option<Duration>,
        buffer_time: Option<Duration>,
    }

    impl Builder {
        /// Creates a new builder
        pub fn new() -> Self {
            Default::default()
        }

        /// Override configuration for the [Builder]
        pub fn configure(mut self, config: &ProviderConfig) -> Self {
            self.sleep = Some(config.sleep());
            self.time_source = Some(config.time_source());
            self
        }

        /// Implementation of [`AsyncSleep`] to use for timeouts.
        pub fn sleep(mut self, sleep: impl AsyncSleep + 'static) -> Self {
            self.sleep = Some(SharedAsyncSleep::new(sleep));
            self
        }

        /// Time source used to decide whether cached credentials have expired
        pub fn time_source(mut self, time_source: impl TimeSource + 'static) -> Self {
            self.time_source = Some(SharedTimeSource::new(time_source));
            self
        }

        /// Timeout for the given [`ProvideCredentials`] implementation.
        ///
        /// Defaults to 5 seconds.
        pub fn load_timeout(mut self, timeout: Duration) -> Self {
            self.load_timeout = Some(timeout);
            self
        }

        /// Amount of time before the actual credential expiration time
        /// where credentials are considered expired.
        ///
        /// For example, if credentials are expiring in 15 minutes, and the buffer time is 10 seconds,
        /// then any requests made after 14 minutes and 50 seconds will load new credentials.
        ///
        /// Defaults to 10 seconds.
        pub fn buffer_time(mut self, buffer_time: Duration) -> Self {
            self.buffer_time = Some(buffer_time);
            self
        }

        /// Creates the [`LazyCachingCredentialsProvider`], caching the credentials of `loader`
        pub fn build(
            self,
            loader: impl ProvideCredentials + 'static,
        ) -> LazyCachingCredentialsProvider {
            LazyCachingCredentialsProvider::new(
                self.time_source.unwrap_or_else(super::default_time_source),
                self.sleep.unwrap_or_else(super::default_sleep),
                SharedCredentialsProvider::new(loader),
                self.load_timeout.unwrap_or(DEFAULT_LOAD_TIMEOUT),
                self.buffer_time.unwrap_or(DEFAULT_BUFFER_TIME),
            )
        }
    }
}

fn default_time_source() -> SharedTimeSource {
    SharedTimeSource::new(SystemTimeSource::new())
}

fn default_sleep() -> SharedAsyncSleep {
    SharedAsyncSleep::new(TokioSleep::new())
}

#[cfg(test)]
mod test {
    use super::{LazyCachingCredentialsProvider, DEFAULT_BUFFER_TIME, DEFAULT_LOAD_TIMEOUT};
    use crate::meta::credentials::provide_credentials_fn;
    use crate::provider::credentials::{self, CredentialsError, ProvideCredentials};
    use crate::time_source::TestingTimeSource;
    use crate::Credentials;
    use aws_smithy_async::rt::sleep::TokioSleep;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tracing::info;
    use tracing_test::traced_test;

    fn test_provider(
        time: TestingTimeSource,
        load_list: Vec<credentials::Result>,
    ) -> LazyCachingCredentialsProvider {
        let load_list = Arc::new(Mutex::new(load_list));
        LazyCachingCredentialsProvider::builder()
            .time_source(time)
            .sleep(TokioSleep::new())
            .load_timeout(DEFAULT_LOAD_TIMEOUT)
            .buffer_time(DEFAULT_BUFFER_TIME)
            .build(provide_credentials_fn(move || {
                let list = load_list.clone();
                async move {
                    let next = list.lock().unwrap().remove(0);
                    info!("refreshing the credentials to {:?}", next);
                    next
                }
            }))
    }

    fn epoch_secs(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn credentials(expired_secs: u64) -> Credentials {
        Credentials::new("test", "test", None, Some(epoch_secs(expired_secs)), "test")
    }

    async fn expect_creds(expired_secs: u64, provider: &LazyCachingCredentialsProvider) {
        let creds = provider
            .provide_credentials()
            .await
            .expect("expected credentials");
        assert_eq!(Some(epoch_secs(expired_secs)), creds.expiry());
    }

    #[traced_test]
    #[tokio::test]
    async fn initial_populate_credentials() {
        let time = TestingTimeSource::new(epoch_secs(100));
        let provider = LazyCachingCredentialsProvider::builder()
            .time_source(time)
            .build(provide_credentials_fn(|| async {
                info!("refreshing the credentials");
                Ok(credentials(1000))
            }));
        assert_eq!(
            epoch_secs(1000),
            provider
                .provide_credentials()
                .await
                .unwrap()
                .expiry()
                .unwrap()
        );
    }

    #[traced_test]
    #[tokio::test]
    async fn reload_expired_credentials() {
        let time = TestingTimeSource::new(epoch_secs(100));
        let provider = test_provider(
            time.clone(),
            vec![
                Ok(credentials(1000)),
                Ok(credentials(2000)),
                Ok(credentials(3000)),
            ],
        );

        expect_creds(1000, &provider).await;
        expect_creds(1000, &provider).await;
        time.set_time(epoch_secs(1500));
        expect_creds(2000, &provider).await;
        expect_creds(2000, &provider).await;
        time.set_time(epoch_secs(2500));
        expect_creds(3000, &provider).await;
        expect_creds(3000, &provider).await;
    }

    #[traced_test]
    #[tokio::test]
    async fn reload_inside_buffer_window() {
        let time = TestingTimeSource::new(epoch_secs(100));
        let provider = test_provider(
            time.clone(),
            vec![Ok(credentials(1000)), Ok(credentials(2000))],
        );
        expect_creds(1000, &provider).await;
        // 5 seconds before expiry is inside the 10 second buffer
        time.set_time(epoch_secs(995));
        expect_creds(2000, &provider).await;
    }

    #[traced_test]
    #[tokio::test]
    async fn load_failed_error() {
        let time = TestingTimeSource::new(epoch_secs(100));
        let provider = test_provider(
            time.clone(),
            vec![
                Ok(credentials(1000)),
                Err(CredentialsError::not_loaded("failed")),
                Ok(credentials(2000)),
            ],
        );

        expect_creds(1000, &provider).await;
        time.set_time(epoch_secs(1500));
        assert!(provider.provide_credentials().await.is_err());
        // failures are not cached
        expect_creds(2000, &provider).await;
    }

    #[traced_test]
    #[tokio::test]
    async fn credentials_without_expiry_are_never_reloaded() {
        let time = TestingTimeSource::new(epoch_secs(100));
        let provider = test_provider(
            time.clone(),
            vec![Ok(Credentials::from_keys("akid", "secret", None))],
        );
        provider.provide_credentials().await.unwrap();
        time.set_time(epoch_secs(u32::MAX as u64));
        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!("akid", creds.access_key_id());
    }

    #[traced_test]
    #[test]
    fn load_contention() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .worker_threads(16)
            .build()
            .unwrap();

        let time = TestingTimeSource::new(epoch_secs(0));
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let provider = Arc::new(
            LazyCachingCredentialsProvider::builder()
                .time_source(time)
                .sleep(TokioSleep::new())
                .build(provide_credentials_fn(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(credentials(1000))
                    }
                })),
        );

        let values = rt.block_on(async {
            let mut tasks = Vec::new();
            for _ in 0..50 {
                let provider = provider.clone();
                tasks.push(tokio::spawn(async move {
                    provider.provide_credentials().await.unwrap()
                }));
            }
            let mut values = Vec::new();
            for task in tasks {
                values.push(task.await.unwrap());
            }
            values
        });
        assert_eq!(1, loads.load(Ordering::SeqCst));
        assert!(values.iter().all(|creds| creds.expiry() == Some(epoch_secs(1000))));
    }

    #[tokio::test(start_paused = true)]
    async fn load_timeout() {
        let time = TestingTimeSource::new(epoch_secs(100));
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let provider = LazyCachingCredentialsProvider::builder()
            .time_source(time)
            .sleep(TokioSleep::new())
            .load_timeout(Duration::from_secs(5))
            .build(provide_credentials_fn(move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    Ok(credentials(1000))
                }
            }));

        let err = provider.provide_credentials().await.expect_err("timed out");
        assert!(
            matches!(err, CredentialsError::ProviderTimedOut(_)),
            "expected timeout, got {:?}",
            err
        );
        // the timeout was not cached
        expect_creds(1000, &provider).await;
        assert_eq!(2, attempts.load(Ordering::SeqCst));
    }
}
