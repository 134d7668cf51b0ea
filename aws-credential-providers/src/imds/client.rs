/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Raw IMDSv2 Client
//!
//! Client for direct access to IMDSv2. Every request carries a session token obtained with a
//! `PUT` to `/latest/api/token`. Tokens are cached and refreshed shortly before they expire.

use crate::connector::{send, ConnectorError, DynConnector, NoConnector};
use crate::meta::cache::ExpiringCache;
use crate::os_shim::Env;
use crate::provider_config::ProviderConfig;
use crate::retry::{classify_http, retry, RetryConfig};
use crate::timeout::Timeout;
use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep};
use aws_smithy_async::time::SharedTimeSource;
use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(21_600);
const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(120);
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

const X_AWS_EC2_METADATA_TOKEN_TTL_SECONDS: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const X_AWS_EC2_METADATA_TOKEN: &str = "x-aws-ec2-metadata-token";

const ENV_ENDPOINT: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
const ENV_ENDPOINT_MODE: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT_MODE";

const TOKEN_PATH: &str = "/latest/api/token";

/// IMDSv2 Client
///
/// Client for IMDSv2. This client handles fetching tokens, retrying on failure, and token
/// caching according to the specified token TTL.
///
/// # Client Configuration
/// The IMDS client can load configuration explicitly, via environment variables, or via
/// [`ProviderConfig`].
///
/// - Explicit configuration with [`Builder::endpoint`] or [`Builder::endpoint_mode`]
/// - `AWS_EC2_METADATA_SERVICE_ENDPOINT`: a complete endpoint URI
/// - `AWS_EC2_METADATA_SERVICE_ENDPOINT_MODE`: `IPv4` (the default, `http://169.254.169.254`)
///   or `IPv6` (`http://[fd00:ec2::254]`)
///
/// # Usage
/// ```no_run
/// # async fn docs() -> Result<(), Box<dyn std::error::Error>> {
/// use aws_credential_providers::imds::client::Client;
/// let client = Client::builder().build()?;
/// let ami_id = client
///     .get("/latest/meta-data/ami-id")
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    endpoint: Uri,
    connector: Option<DynConnector>,
    sleep: SharedAsyncSleep,
    time_source: SharedTimeSource,
    retry_config: RetryConfig,
    request_timeout: Duration,
    token_ttl: Duration,
    token: ExpiringCache<String, ImdsError>,
}

impl Client {
    /// IMDS client builder
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Retrieve information from IMDS
    ///
    /// This method will handle loading and caching a session token, combining the `path` with the
    /// configured IMDS endpoint, and retrying potential errors.
    ///
    /// For more information about IMDSv2 methods and functionality, see
    /// [Instance metadata and user data](https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/ec2-instance-metadata.html)
    pub async fn get(&self, path: &str) -> Result<String, ImdsError> {
        let uri = self.uri(path)?;
        let connector = self.connector()?;
        // a rejected token is discarded and fetched once more
        let mut token_attempts = 0;
        let response = loop {
            token_attempts += 1;
            let token = self.token().await?;
            let response = retry(
                &self.retry_config,
                &self.sleep,
                || self.dispatch(connector, metadata_request(&uri, &token)),
                classify_http,
            )
            .await
            .map_err(|err| ImdsError::IoError(Arc::new(err)))?;
            if response.status() == StatusCode::UNAUTHORIZED && token_attempts < 2 {
                tracing::debug!("IMDS rejected the session token; fetching a new one");
                self.token.invalidate().await;
                continue;
            }
            break response;
        };

        if !response.status().is_success() {
            return Err(ImdsError::ErrorResponse(Ec2MetadataError::new(
                response.status(),
                status_message(response.status()),
            )));
        }
        String::from_utf8(response.into_body().to_vec())
            .map_err(|err| ImdsError::Unexpected(Arc::new(err)))
    }

    async fn dispatch(
        &self,
        connector: &DynConnector,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, ConnectorError> {
        let sleep = self.sleep.sleep(self.request_timeout);
        match Timeout::new(send(connector, request), sleep).await {
            Ok(result) => result,
            Err(timed_out) => Err(ConnectorError::timeout(timed_out)),
        }
    }

    fn uri(&self, path: &str) -> Result<Uri, ImdsError> {
        let base = self.endpoint.to_string();
        format!("{}{}", base.trim_end_matches('/'), path)
            .parse::<Uri>()
            .map_err(|err| ImdsError::Unexpected(Arc::new(err)))
    }

    fn connector(&self) -> Result<&DynConnector, ImdsError> {
        self.connector
            .as_ref()
            .ok_or_else(|| ImdsError::Unexpected(Arc::new(NoConnector)))
    }

    async fn token(&self) -> Result<String, ImdsError> {
        let now = self.time_source.now();
        if let Some(token) = self.token.yield_or_clear_if_expired(now).await {
            return Ok(token);
        }
        self.token.get_or_load(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<(String, Option<std::time::SystemTime>), ImdsError> {
        let uri = self.uri(TOKEN_PATH)?;
        let connector = self.connector()?;
        let ttl = self.token_ttl.as_secs();
        tracing::debug!(ttl, "fetching IMDS session token");
        let response = retry(
            &self.retry_config,
            &self.sleep,
            || self.dispatch(connector, token_request(&uri, ttl)),
            classify_http,
        )
        .await
        .map_err(|err| ImdsError::IoError(Arc::new(err)))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(ImdsError::FailedToLoadToken(Ec2MetadataError::new(
                status,
                "Request forbidden: IMDS is disabled or the caller has insufficient permissions.",
            )));
        }
        if !status.is_success() {
            return Err(ImdsError::FailedToLoadToken(Ec2MetadataError::new(
                status,
                "Failed to retrieve IMDS token",
            )));
        }

        let ttl = response
            .headers()
            .get(X_AWS_EC2_METADATA_TOKEN_TTL_SECONDS)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                ImdsError::Unexpected(Arc::new(TokenResponseError(
                    "token response did not contain a valid TTL header",
                )))
            })?;
        let token = String::from_utf8(response.into_body().to_vec())
            .map_err(|err| ImdsError::Unexpected(Arc::new(err)))?;
        let expiry = self
            .time_source
            .now()
            .checked_add(Duration::from_secs(ttl))
            .ok_or_else(|| {
                ImdsError::Unexpected(Arc::new(TokenResponseError(
                    "token TTL header is out of range",
                )))
            })?;
        Ok((token, Some(expiry)))
    }
}

fn status_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

fn token_request(uri: &Uri, ttl: u64) -> http::Request<Bytes> {
    let mut request = http::Request::new(Bytes::new());
    *request.method_mut() = Method::PUT;
    *request.uri_mut() = uri.clone();
    request.headers_mut().insert(
        X_AWS_EC2_METADATA_TOKEN_TTL_SECONDS,
        http::HeaderValue::from(ttl),
    );
    request
}

fn metadata_request(uri: &Uri, token: &str) -> http::Request<Bytes> {
    let mut request = http::Request::new(Bytes::new());
    *request.uri_mut() = uri.clone();
    // tokens are opaque ASCII; an invalid token is left off and IMDS answers 401
    if let Ok(value) = http::HeaderValue::from_str(token) {
        request
            .headers_mut()
            .insert(X_AWS_EC2_METADATA_TOKEN, value);
    }
    request
}

/// A non-success response from the metadata service
#[derive(Debug, Clone)]
pub struct Ec2MetadataError {
    status: StatusCode,
    message: String,
}

impl Ec2MetadataError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// HTTP status returned by IMDS
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Description of the failure
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Ec2MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for Ec2MetadataError {}

#[derive(Debug)]
struct TokenResponseError(&'static str);

impl fmt::Display for TokenResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for TokenResponseError {}

/// An error retrieving metadata from IMDS
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ImdsError {
    /// An IMDSv2 Token could not be loaded
    ///
    /// Requests to IMDS must be accompanied by a token obtained via a `PUT` request. This is handled
    /// transparently by the [`Client`].
    FailedToLoadToken(Ec2MetadataError),

    /// The `/latest/api/token` call succeeded, but a later request for metadata returned an error
    ErrorResponse(Ec2MetadataError),

    /// IO Error
    ///
    /// An error occurred communicating with IMDS
    IoError(Arc<ConnectorError>),

    /// An unexpected error occurred communicating with IMDS
    Unexpected(Arc<dyn Error + Send + Sync + 'static>),
}

impl ImdsError {
    /// Status of the failed response, if IMDS responded at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ImdsError::FailedToLoadToken(err) | ImdsError::ErrorResponse(err) => Some(err.status),
            _ => None,
        }
    }
}

impl fmt::Display for ImdsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImdsError::FailedToLoadToken(err) => {
                write!(f, "failed to load IMDS session token: {}", err)
            }
            ImdsError::ErrorResponse(err) => {
                write!(f, "error retrieving instance metadata: {}", err)
            }
            ImdsError::IoError(_) => {
                write!(f, "an IO error occurred communicating with IMDS")
            }
            ImdsError::Unexpected(_) => {
                write!(f, "an unexpected error occurred communicating with IMDS")
            }
        }
    }
}

impl Error for ImdsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImdsError::FailedToLoadToken(err) | ImdsError::ErrorResponse(err) => Some(err),
            ImdsError::IoError(err) => Some(err.as_ref()),
            ImdsError::Unexpected(err) => Some(err.as_ref() as _),
        }
    }
}

/// IMDS endpoint mode
///
/// IMDS can be accessed with an IPv4 or IPv6 endpoint. The default is IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointMode {
    /// IPv4 IMDS endpoint: `http://169.254.169.254`
    IpV4,
    /// IPv6 IMDS endpoint: `http://[fd00:ec2::254]`
    IpV6,
}

impl EndpointMode {
    fn endpoint(&self) -> &'static str {
        match self {
            EndpointMode::IpV4 => "http://169.254.169.254",
            EndpointMode::IpV6 => "http://[fd00:ec2::254]",
        }
    }
}

impl std::str::FromStr for EndpointMode {
    type Err = BuildError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            _ if value.eq_ignore_ascii_case("ipv4") => Ok(EndpointMode::IpV4),
            _ if value.eq_ignore_ascii_case("ipv6") => Ok(EndpointMode::IpV6),
            other => Err(BuildError::InvalidEndpointMode(other.to_string())),
        }
    }
}

/// Error constructing an IMDS client
#[derive(Debug)]
#[non_exhaustive]
pub enum BuildError {
    /// The endpoint mode was not `IPv4` or `IPv6`
    InvalidEndpointMode(String),

    /// The endpoint was not a valid URI
    InvalidEndpointUri {
        /// The rejected endpoint
        uri: String,
        /// Parse failure
        source: http::uri::InvalidUri,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidEndpointMode(mode) => write!(
                f,
                "`{}` is not a valid endpoint mode. Valid values are [`IPv4`, `IPv6`]",
                mode
            ),
            BuildError::InvalidEndpointUri { uri, .. } => {
                write!(f, "endpoint must be a valid URI, found `{}`", uri)
            }
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::InvalidEndpointMode(_) => None,
            BuildError::InvalidEndpointUri { source, .. } => Some(source),
        }
    }
}

/// IMDS client builder
#[derive(Debug, Default)]
pub struct Builder {
    config: Option<ProviderConfig>,
    endpoint: Option<String>,
    mode: Option<EndpointMode>,
    token_ttl: Option<Duration>,
    retry_config: Option<RetryConfig>,
    request_timeout: Option<Duration>,
}

impl Builder {
    /// Override the configuration for this client
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Override the endpoint for the [`Client`]
    ///
    /// By default, the client will resolve an endpoint from the environment and the endpoint mode.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Override the endpoint mode for [`Client`]
    ///
    /// * When set to [`IpV4`](EndpointMode::IpV4), the endpoint will be `http://169.254.169.254`.
    /// * When set to [`IpV6`](EndpointMode::IpV6), the endpoint will be `http://[fd00:ec2::254]`.
    pub fn endpoint_mode(mut self, mode: EndpointMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Override the time-to-live for the session token
    ///
    /// Requests to IMDS utilize a session token for authentication. By default, session tokens last
    /// for 6 hours. When the TTL for the token expires, a new token must be retrieved from the
    /// metadata service.
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    /// Override the retry behavior, by default 3 attempts
    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }

    /// Override the timeout of each individual request, by default 1 second
    ///
    /// IMDS is a local service: a request that takes longer usually means that no metadata
    /// service is reachable.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build an IMDSv2 Client
    pub fn build(self) -> Result<Client, BuildError> {
        let config = self.config.unwrap_or_default();
        let endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None => resolve_endpoint(&config.env(), self.mode)?,
        };
        let endpoint = endpoint
            .parse::<Uri>()
            .map_err(|source| BuildError::InvalidEndpointUri {
                uri: endpoint.clone(),
                source,
            })?;
        Ok(Client {
            endpoint,
            connector: config.connector().cloned(),
            sleep: config.sleep(),
            time_source: config.time_source(),
            retry_config: self
                .retry_config
                .unwrap_or_else(|| RetryConfig::standard().with_max_attempts(DEFAULT_ATTEMPTS)),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            token_ttl: self.token_ttl.unwrap_or(DEFAULT_TOKEN_TTL),
            token: ExpiringCache::new(TOKEN_REFRESH_BUFFER),
        })
    }
}

fn resolve_endpoint(env: &Env, mode: Option<EndpointMode>) -> Result<String, BuildError> {
    if let Some(endpoint) = env.get_non_blank(ENV_ENDPOINT) {
        return Ok(endpoint);
    }
    let mode = match mode {
        Some(mode) => mode,
        None => match env.get_non_blank(ENV_ENDPOINT_MODE) {
            Some(mode) => mode.parse()?,
            None => EndpointMode::IpV4,
        },
    };
    Ok(mode.endpoint().to_string())
}
