/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Bounded retries for the HTTP calls made by credential providers.

use crate::connector::ConnectorError;
use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep};
use aws_smithy_types::retry::{ErrorKind, RetryKind};
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

pub use aws_smithy_types::retry::RetryConfig;

/// `b * 2^(attempt - 1)` seconds with `b` drawn from `[0, 1)`, capped at the max backoff
fn backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = fastrand::f64();
    let exp = 2_f64.powi(attempt.saturating_sub(1) as i32);
    let secs = (base * config.initial_backoff().as_secs_f64() * exp)
        .min(config.max_backoff().as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Retry classification for a raw HTTP exchange
///
/// The following are retryable:
/// - Socket errors
/// - Networking timeouts
/// - 5xx errors
/// - 429 errors
pub(crate) fn classify_http(
    response: &Result<http::Response<Bytes>, ConnectorError>,
) -> RetryKind {
    match response {
        Err(err) if err.is_timeout() || err.is_io() => RetryKind::Error(ErrorKind::TransientError),
        Err(_) => RetryKind::UnretryableFailure,
        Ok(response) if response.status().as_u16() == 429 => {
            RetryKind::Error(ErrorKind::ThrottlingError)
        }
        Ok(response) if response.status().is_server_error() => {
            RetryKind::Error(ErrorKind::ServerError)
        }
        Ok(response) if response.status().is_success() => RetryKind::Unnecessary,
        Ok(_) => RetryKind::UnretryableFailure,
    }
}

/// Run `attempt` until `classify` says the result is final or attempts are exhausted
///
/// The last result is returned as-is, so callers observe the terminal error.
pub(crate) async fn retry<T, E, F, Fut, C>(
    config: &RetryConfig,
    sleep: &SharedAsyncSleep,
    mut attempt: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&Result<T, E>) -> RetryKind,
{
    let mut attempts = 1;
    loop {
        let result = attempt().await;
        match classify(&result) {
            RetryKind::Error(kind) if attempts < config.max_attempts() => {
                let delay = backoff(config, attempts);
                tracing::debug!(attempts, kind = ?kind, backoff = ?delay, "retrying request");
                sleep.sleep(delay).await;
                attempts += 1;
            }
            RetryKind::Error(kind) => {
                tracing::debug!(attempts, kind = ?kind, "retry attempts exhausted");
                return result;
            }
            _ => return result,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{backoff, classify_http, retry, RetryConfig};
    use crate::connector::ConnectorError;
    use aws_smithy_async::rt::sleep::{SharedAsyncSleep, TokioSleep};
    use aws_smithy_types::retry::{ErrorKind, RetryKind};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn status(code: u16) -> Result<http::Response<Bytes>, ConnectorError> {
        Ok(http::Response::builder()
            .status(code)
            .body(Bytes::new())
            .unwrap())
    }

    #[test]
    fn classification() {
        assert_eq!(RetryKind::Unnecessary, classify_http(&status(200)));
        assert_eq!(RetryKind::UnretryableFailure, classify_http(&status(404)));
        assert_eq!(
            RetryKind::Error(ErrorKind::ServerError),
            classify_http(&status(503))
        );
        assert_eq!(
            RetryKind::Error(ErrorKind::ThrottlingError),
            classify_http(&status(429))
        );
        assert_eq!(
            RetryKind::Error(ErrorKind::TransientError),
            classify_http(&Err(ConnectorError::io("reset")))
        );
        assert_eq!(
            RetryKind::UnretryableFailure,
            classify_http(&Err(ConnectorError::user("bad request")))
        );
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig::standard()
            .with_initial_backoff(Duration::from_secs(10))
            .with_max_backoff(Duration::from_secs(3));
        for attempt in 1..6 {
            assert!(backoff(&config, attempt) <= Duration::from_secs(3));
        }
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::standard().with_initial_backoff(Duration::ZERO);
        let sleep = SharedAsyncSleep::new(TokioSleep::new());
        let result = retry(
            &config,
            &sleep,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { status(500) }
            },
            classify_http,
        )
        .await;
        assert_eq!(500, result.unwrap().status().as_u16());
        assert_eq!(3, calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn disabled_config_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let sleep = SharedAsyncSleep::new(TokioSleep::new());
        let result = retry(
            &RetryConfig::disabled(),
            &sleep,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { status(503) }
            },
            classify_http,
        )
        .await;
        assert_eq!(503, result.unwrap().status().as_u16());
        assert_eq!(1, calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn success_stops_retrying() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::standard().with_initial_backoff(Duration::ZERO);
        let sleep = SharedAsyncSleep::new(TokioSleep::new());
        let result = retry(
            &config,
            &sleep,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        status(503)
                    } else {
                        status(200)
                    }
                }
            },
            classify_http,
        )
        .await;
        assert_eq!(200, result.unwrap().status().as_u16());
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }
}
