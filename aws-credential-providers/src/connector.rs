/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Functionality related to creating new HTTP Connectors
//!
//! Providers that talk to a metadata service or an AWS endpoint send requests through a
//! [`DynConnector`]: a type-erased, cloneable `tower` service from `http::Request<Bytes>` to
//! `http::Response<Bytes>`. Any `tower::Service` with those types can be used, which makes it
//! straightforward to substitute a fake in tests.

use bytes::Bytes;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use tower::util::BoxCloneService;
use tower::ServiceExt;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

type BoxConnector = BoxCloneService<http::Request<Bytes>, http::Response<Bytes>, ConnectorError>;

/// Type-erased HTTP connector
///
/// `BoxCloneService` is `Send` but not `Sync`. Providers must be both, so the boxed service sits
/// behind a mutex and every request is sent on a fresh clone of it.
#[derive(Clone)]
pub struct DynConnector(Arc<Mutex<BoxConnector>>);

impl fmt::Debug for DynConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynConnector").finish()
    }
}

impl DynConnector {
    /// Wrap any suitable `tower` service as a [`DynConnector`]
    pub fn new<S>(service: S) -> Self
    where
        S: tower::Service<
                http::Request<Bytes>,
                Response = http::Response<Bytes>,
                Error = ConnectorError,
            > + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Self(Arc::new(Mutex::new(BoxCloneService::new(service))))
    }

    fn service(&self) -> BoxConnector {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[derive(Debug)]
enum ConnectorErrorKind {
    /// A timeout occurred while processing the request
    Timeout,

    /// A user-caused error (e.g., invalid HTTP request)
    User,

    /// Socket/IO error
    Io,

    /// An unclassified error
    Other,
}

/// Error from the underlying Connector
///
/// Connector exists to attach a kind to what would otherwise be an opaque `Box<dyn Error>` that
/// comes off a dynamic connector. The attached kind is used to determine what retry behavior
/// should occur (if any).
#[derive(Debug)]
pub struct ConnectorError {
    kind: ConnectorErrorKind,
    source: BoxError,
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConnectorErrorKind::Timeout => write!(f, "timeout: {}", self.source),
            ConnectorErrorKind::User => write!(f, "user error: {}", self.source),
            ConnectorErrorKind::Io => write!(f, "io error: {}", self.source),
            ConnectorErrorKind::Other => write!(f, "other: {}", self.source),
        }
    }
}

impl Error for ConnectorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl ConnectorError {
    /// Construct a [`ConnectorError`] from an error caused by a timeout
    pub fn timeout(source: impl Into<BoxError>) -> Self {
        Self {
            kind: ConnectorErrorKind::Timeout,
            source: source.into(),
        }
    }

    /// Construct a [`ConnectorError`] from an error caused by the user (e.g. invalid HTTP request)
    pub fn user(source: impl Into<BoxError>) -> Self {
        Self {
            kind: ConnectorErrorKind::User,
            source: source.into(),
        }
    }

    /// Construct a [`ConnectorError`] from an IO related error (e.g. socket hangup)
    pub fn io(source: impl Into<BoxError>) -> Self {
        Self {
            kind: ConnectorErrorKind::Io,
            source: source.into(),
        }
    }

    /// Construct a [`ConnectorError`] from an unclassified error
    pub fn other(source: impl Into<BoxError>) -> Self {
        Self {
            kind: ConnectorErrorKind::Other,
            source: source.into(),
        }
    }

    /// Returns true if the error is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ConnectorErrorKind::Io)
    }

    /// Returns true if the error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ConnectorErrorKind::Timeout)
    }

    /// Returns true if the error is a user-caused error (e.g., invalid HTTP request)
    pub fn is_user(&self) -> bool {
        matches!(self.kind, ConnectorErrorKind::User)
    }
}

/// Error returned when a provider needs HTTP but no connector is available
#[derive(Debug)]
pub(crate) struct NoConnector;

impl fmt::Display for NoConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No HTTP connector was available. Enable the `rustls` crate feature or set a connector to fix this.")
    }
}

impl Error for NoConnector {}

/// Send `request` through `connector`
pub(crate) async fn send(
    connector: &DynConnector,
    request: http::Request<Bytes>,
) -> Result<http::Response<Bytes>, ConnectorError> {
    connector.service().oneshot(request).await
}

/// Returns the default HTTPS connector, or `None` if no TLS feature is enabled
#[cfg(feature = "rustls")]
pub fn default_connector() -> Option<DynConnector> {
    Some(hyper_impls::https())
}

/// Returns the default HTTPS connector, or `None` if no TLS feature is enabled
#[cfg(not(feature = "rustls"))]
pub fn default_connector() -> Option<DynConnector> {
    None
}

#[cfg(feature = "rustls")]
mod hyper_impls {
    use super::{ConnectorError, DynConnector};
    use bytes::Bytes;
    use std::error::Error;

    pub(super) fn https() -> DynConnector {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = hyper::Client::builder().build::<_, hyper::Body>(https);
        DynConnector::new(tower::service_fn(move |request: http::Request<Bytes>| {
            let client = client.clone();
            async move {
                let (parts, body) = request.into_parts();
                let request = http::Request::from_parts(parts, hyper::Body::from(body));
                let response = client.request(request).await.map_err(to_connector_error)?;
                let (parts, body) = response.into_parts();
                let body = hyper::body::to_bytes(body)
                    .await
                    .map_err(to_connector_error)?;
                Ok(http::Response::from_parts(parts, body))
            }
        }))
    }

    fn to_connector_error(err: hyper::Error) -> ConnectorError {
        if find_source::<std::io::Error>(&err)
            .map(|io| io.kind() == std::io::ErrorKind::TimedOut)
            .unwrap_or(false)
        {
            ConnectorError::timeout(err)
        } else if err.is_user() {
            ConnectorError::user(err)
        } else if err.is_closed()
            || err.is_canceled()
            || err.is_connect()
            || err.is_incomplete_message()
            || find_source::<std::io::Error>(&err).is_some()
        {
            ConnectorError::io(err)
        } else {
            ConnectorError::other(err)
        }
    }

    fn find_source<'a, E: Error + 'static>(err: &'a (dyn Error + 'static)) -> Option<&'a E> {
        let mut next = Some(err);
        while let Some(err) = next {
            if let Some(matching_err) = err.downcast_ref::<E>() {
                return Some(matching_err);
            }
            next = err.source();
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    //! Connectors useful for testing.

    use super::{ConnectorError, DynConnector};
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    /// A basic test connection. It will:
    /// - Respond to requests with a preloaded series of responses
    /// - Record requests for future examination
    #[derive(Clone, Debug)]
    pub(crate) struct TestConnection {
        responses: Arc<Mutex<Vec<Result<http::Response<Bytes>, String>>>>,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    /// A request as seen by [`TestConnection`]
    #[derive(Clone, Debug)]
    pub(crate) struct RecordedRequest {
        pub(crate) method: http::Method,
        pub(crate) uri: http::Uri,
        pub(crate) headers: http::HeaderMap,
        pub(crate) body: Bytes,
    }

    impl RecordedRequest {
        pub(crate) fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).and_then(|v| v.to_str().ok())
        }
    }

    impl TestConnection {
        pub(crate) fn new(mut responses: Vec<Result<http::Response<Bytes>, String>>) -> Self {
            responses.reverse();
            Self {
                responses: Arc::new(Mutex::new(responses)),
                requests: Default::default(),
            }
        }

        pub(crate) fn connector(&self) -> DynConnector {
            let this = self.clone();
            DynConnector::new(tower::service_fn(move |request: http::Request<Bytes>| {
                let this = this.clone();
                async move {
                    let (parts, body) = request.into_parts();
                    this.requests.lock().unwrap().push(RecordedRequest {
                        method: parts.method,
                        uri: parts.uri,
                        headers: parts.headers,
                        body,
                    });
                    match this.responses.lock().unwrap().pop() {
                        Some(Ok(response)) => Ok(response),
                        Some(Err(message)) => Err(ConnectorError::io(message)),
                        None => Err(ConnectorError::other("No more data")),
                    }
                }
            }))
        }

        pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    pub(crate) fn response(status: u16, body: &str) -> Result<http::Response<Bytes>, String> {
        Ok(http::Response::builder()
            .status(status)
            .body(Bytes::from(body.to_string()))
            .unwrap())
    }

    /// A connector whose requests never complete
    pub(crate) fn never() -> DynConnector {
        DynConnector::new(tower::service_fn(|_request: http::Request<Bytes>| async {
            std::future::pending::<Result<http::Response<Bytes>, ConnectorError>>().await
        }))
    }
}
