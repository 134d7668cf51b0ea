/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials from a local container metadata service
//!
//! This provider is frequently used with an AWS-provided credentials service such as Amazon
//! Container Service (ECS) or EKS Pod Identity. However, it is possible to use environment
//! variables to configure this provider to use any local metadata service.
//!
//! Configuration, in order of precedence:
//! 1. `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI`: a path appended to `http://169.254.170.2`
//! 2. `AWS_CONTAINER_CREDENTIALS_FULL_URI`: a complete URI. Unless it uses `https`, the host must
//!    be one of the allowed metadata addresses or a name that resolves only to loopback addresses.
//!
//! An authorization token is read from the file named by `AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE`
//! or, when that is unset, from `AWS_CONTAINER_AUTHORIZATION_TOKEN`.

use crate::connector::{send, ConnectorError, DynConnector, NoConnector};
use crate::json_credentials::{parse_json_credentials, JsonCredentials, RefreshableCredentials};
use crate::os_shim::{Env, Fs};
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::retry::{classify_http, retry, RetryConfig};
use crate::Credentials;
use aws_smithy_async::rt::sleep::SharedAsyncSleep;
use bytes::Bytes;
use http::Uri;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

const PROVIDER_NAME: &str = "EcsContainer";

const ENV_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
const ENV_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
const ENV_AUTHORIZATION_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";
const ENV_AUTHORIZATION_TOKEN_FILE: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE";

const BASE_HOST: &str = "http://169.254.170.2";

/// Hosts a plain `http` full URI may point at
const ALLOWED_HOSTS: &[IpAddr] = &[
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
    // ECS
    IpAddr::V4(Ipv4Addr::new(169, 254, 170, 2)),
    // EKS pod identity
    IpAddr::V4(Ipv4Addr::new(169, 254, 170, 23)),
    IpAddr::V6(Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x23)),
];

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Future returned by [`ResolveDns::resolve_dns`]
pub type DnsFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<IpAddr>, BoxError>> + Send + 'a>>;

/// Resolve a hostname to its IP addresses
///
/// Used to check that a full URI naming a host by DNS name only reaches loopback addresses.
pub trait ResolveDns: Send + Sync + fmt::Debug {
    /// Resolve `name`
    fn resolve_dns<'a>(&'a self, name: &'a str) -> DnsFuture<'a>;
}

/// DNS resolution through `tokio::net::lookup_host`
#[derive(Debug, Clone, Default)]
pub struct TokioDns;

impl ResolveDns for TokioDns {
    fn resolve_dns<'a>(&'a self, name: &'a str) -> DnsFuture<'a> {
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((name, 0)).await?;
            Ok(addrs.map(|addr| addr.ip()).collect())
        })
    }
}

/// Credential provider for a local container metadata service
#[derive(Debug)]
pub struct EcsCredentialsProvider {
    env: Env,
    fs: Fs,
    connector: Option<DynConnector>,
    sleep: SharedAsyncSleep,
    retry_config: RetryConfig,
    dns: Arc<dyn ResolveDns>,
}

impl EcsCredentialsProvider {
    /// Builder for [`EcsCredentialsProvider`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Load credentials from the container metadata service
    pub async fn credentials(&self) -> provider::Result {
        let uri = self.uri().await.map_err(|err| {
            tracing::debug!(err = %err, "container credentials are not configured");
            CredentialsError::invalid_configuration(err)
        })?;
        let token = self.auth_token().await?;
        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| CredentialsError::invalid_configuration(NoConnector))?;

        tracing::debug!(uri = %uri, "retrieving container credentials");
        let response = retry(
            &self.retry_config,
            &self.sleep,
            || send(connector, credentials_request(&uri, token.as_deref())),
            classify_http,
        )
        .await
        .map_err(|err| {
            tracing::warn!(err = %err, "failed to obtain credentials from container metadata service");
            CredentialsError::provider_error(EcsError::Dispatch(err))
        })?;
        let creds = parse_response(response)?;
        tracing::debug!(expiration = ?creds.expiry(), "obtained credentials from container metadata service");
        Ok(creds)
    }

    async fn uri(&self) -> Result<Uri, EcsConfigurationError> {
        if let Some(relative) = self.env.get_non_blank(ENV_RELATIVE_URI) {
            return format!("{}{}", BASE_HOST, relative)
                .parse::<Uri>()
                .map_err(|err| EcsConfigurationError::InvalidRelativeUri {
                    uri: relative,
                    err: err.into(),
                });
        }
        match self.env.get_non_blank(ENV_FULL_URI) {
            Some(full) => validate_full_uri(&full, self.dns.as_ref()).await,
            None => Err(EcsConfigurationError::NotConfigured),
        }
    }

    async fn auth_token(&self) -> Result<Option<String>, CredentialsError> {
        let token = match self.env.get_non_blank(ENV_AUTHORIZATION_TOKEN_FILE) {
            Some(path) => {
                let contents = self.fs.read_to_end(&path).await.map_err(|err| {
                    tracing::warn!(path = %path, err = %err, "could not read token file");
                    CredentialsError::provider_error(EcsError::TokenFile(err))
                })?;
                String::from_utf8(contents).map_err(|err| {
                    CredentialsError::provider_error(EcsError::TokenFile(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        err,
                    )))
                })?
            }
            None => match self.env.get_non_blank(ENV_AUTHORIZATION_TOKEN) {
                Some(token) => token,
                None => return Ok(None),
            },
        };
        if token.contains(|c: char| c == '\r' || c == '\n') {
            return Err(CredentialsError::provider_error(EcsError::InvalidToken));
        }
        Ok(Some(token))
    }
}

impl ProvideCredentials for EcsCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(
            self.credentials()
                .instrument(tracing::debug_span!("load_credentials", provider = PROVIDER_NAME)),
        )
    }
}

fn credentials_request(uri: &Uri, token: Option<&str>) -> http::Request<Bytes> {
    let mut request = http::Request::new(Bytes::new());
    *request.uri_mut() = uri.clone();
    let headers = request.headers_mut();
    headers.insert(
        http::header::ACCEPT,
        http::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        http::header::ACCEPT_ENCODING,
        http::HeaderValue::from_static("identity"),
    );
    // CR and LF were rejected already; any remaining invalid byte drops the header and the
    // service answers with an authorization error.
    if let Some(value) = token.and_then(|token| http::HeaderValue::from_str(token).ok()) {
        headers.insert(http::header::AUTHORIZATION, value);
    }
    request
}

fn parse_response(response: http::Response<Bytes>) -> provider::Result {
    let status = response.status();
    let is_json = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);
    let body = std::str::from_utf8(response.body())
        .map_err(CredentialsError::unhandled)?;

    if !status.is_success() {
        let error = match parse_json_credentials(body) {
            Ok(JsonCredentials::Error { code, message }) if is_json => EcsError::Service {
                code: code.into_owned(),
                message: message.into_owned(),
            },
            _ => EcsError::Status(status),
        };
        tracing::warn!(status = %status, "container metadata service returned an error");
        return Err(CredentialsError::provider_error(error));
    }

    match parse_json_credentials(body).map_err(CredentialsError::unhandled)? {
        JsonCredentials::RefreshableCredentials(RefreshableCredentials {
            access_key_id,
            secret_access_key,
            session_token,
            expiration,
            account_id,
        }) => {
            let mut builder = Credentials::builder()
                .access_key_id(access_key_id)
                .secret_access_key(secret_access_key)
                .session_token(session_token)
                .expiry(expiration)
                .provider_name(PROVIDER_NAME);
            builder.set_account_id(account_id.map(Into::into));
            Ok(builder.build())
        }
        JsonCredentials::Error { .. } => {
            Err(CredentialsError::provider_error(EcsError::UnexpectedFormat))
        }
    }
}

/// Validate that `uri` may be used as a full provider URI
///
/// Either:
/// 1. The URI uses `https`
/// 2. The URI host is an allowed metadata address. A hostname is resolved and ALL resolved
///    addresses must be loopback addresses.
async fn validate_full_uri(uri: &str, dns: &dyn ResolveDns) -> Result<Uri, EcsConfigurationError> {
    let invalid = |err: BoxError| EcsConfigurationError::InvalidFullUri {
        uri: uri.to_string(),
        err,
    };
    let parsed = uri.parse::<Uri>().map_err(|err| invalid(err.into()))?;
    if parsed.scheme() == Some(&http::uri::Scheme::HTTPS) {
        return Ok(parsed);
    }
    let host = parsed
        .host()
        .ok_or_else(|| invalid("URI did not contain a host".into()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(addr) = host.parse::<IpAddr>() {
        return if ALLOWED_HOSTS.contains(&addr) {
            Ok(parsed)
        } else {
            Err(EcsConfigurationError::DisallowedHost {
                uri: uri.to_string(),
            })
        };
    }

    let addrs = dns
        .resolve_dns(host)
        .await
        .map_err(|err| EcsConfigurationError::DnsLookupFailed {
            uri: uri.to_string(),
            err,
        })?;
    if !addrs.is_empty() && addrs.iter().all(IpAddr::is_loopback) {
        Ok(parsed)
    } else {
        tracing::warn!(addrs = ?addrs, "full URI hostname did not resolve to loopback");
        Err(EcsConfigurationError::NotLoopback {
            uri: uri.to_string(),
        })
    }
}

#[derive(Debug)]
enum EcsConfigurationError {
    NotConfigured,
    InvalidRelativeUri { uri: String, err: BoxError },
    InvalidFullUri { uri: String, err: BoxError },
    DisallowedHost { uri: String },
    DnsLookupFailed { uri: String, err: BoxError },
    NotLoopback { uri: String },
}

impl fmt::Display for EcsConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsConfigurationError::NotConfigured => {
                write!(f, "Container credentials URI not set")
            }
            EcsConfigurationError::InvalidRelativeUri { uri, err } => {
                write!(f, "Invalid relativeUri `{}`: {}", uri, err)
            }
            EcsConfigurationError::InvalidFullUri { uri, err } => {
                write!(f, "Invalid fullUri `{}`: {}", uri, err)
            }
            EcsConfigurationError::DisallowedHost { uri } => {
                let allowed: Vec<_> = ALLOWED_HOSTS.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "The container credentials full URI ({}) has an invalid host. Host can only be one of [{}].",
                    uri,
                    allowed.join(", ")
                )
            }
            EcsConfigurationError::DnsLookupFailed { uri, err } => write!(
                f,
                "The container credentials full URI ({}) is specified via a hostname whose IP address(es) could not be resolved. {}",
                uri, err
            ),
            EcsConfigurationError::NotLoopback { uri } => write!(
                f,
                "The container credentials full URI ({}) is specified via a hostname whose IP address(es) do not resolve to the loopback device.",
                uri
            ),
        }
    }
}

impl Error for EcsConfigurationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EcsConfigurationError::InvalidRelativeUri { err, .. }
            | EcsConfigurationError::InvalidFullUri { err, .. }
            | EcsConfigurationError::DnsLookupFailed { err, .. } => Some(err.as_ref() as _),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum EcsError {
    TokenFile(std::io::Error),
    InvalidToken,
    Dispatch(ConnectorError),
    Service { code: String, message: String },
    Status(http::StatusCode),
    UnexpectedFormat,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::TokenFile(_) => write!(f, "Could not read token file."),
            EcsError::InvalidToken => write!(f, "Token contains illegal line break sequence."),
            EcsError::Dispatch(err) => write!(
                f,
                "Failed to get credentials from container metadata service: {}",
                err
            ),
            EcsError::Service { code, message } => write!(
                f,
                "Error retrieving credentials from container service: code={}; message={}",
                code, message
            ),
            EcsError::Status(status) => write!(
                f,
                "Error retrieving credentials from container service: HTTP {}",
                status
            ),
            EcsError::UnexpectedFormat => {
                write!(f, "HTTP credentials response was not of expected format")
            }
        }
    }
}

impl Error for EcsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EcsError::TokenFile(err) => Some(err),
            EcsError::Dispatch(err) => Some(err),
            _ => None,
        }
    }
}

/// Builder for [`EcsCredentialsProvider`]
#[derive(Default, Debug)]
pub struct Builder {
    config: Option<ProviderConfig>,
    retry_config: Option<RetryConfig>,
    dns: Option<Arc<dyn ResolveDns>>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Override the retry behavior of the metadata request
    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }

    /// Override the DNS resolver used to validate full URI hostnames
    pub fn dns(mut self, dns: impl ResolveDns + 'static) -> Self {
        self.dns = Some(Arc::new(dns));
        self
    }

    /// Build the provider
    pub fn build(self) -> EcsCredentialsProvider {
        let config = self.config.unwrap_or_default();
        EcsCredentialsProvider {
            env: config.env(),
            fs: config.fs(),
            connector: config.connector().cloned(),
            sleep: config.sleep(),
            retry_config: self.retry_config.unwrap_or_else(RetryConfig::standard),
            dns: self.dns.unwrap_or_else(|| Arc::new(TokioDns)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{validate_full_uri, DnsFuture, EcsCredentialsProvider, ResolveDns};
    use crate::connector::test_util::{response, TestConnection};
    use crate::os_shim::{Env, Fs};
    use crate::provider::credentials::{CredentialsError, ProvideCredentials};
    use crate::provider_config::ProviderConfig;
    use crate::retry::RetryConfig;
    use bytes::Bytes;
    use std::net::IpAddr;
    use std::time::{Duration, UNIX_EPOCH};
    use tracing_test::traced_test;

    const CREDS: &str = r#"{
        "AccessKeyId" : "AKID",
        "SecretAccessKey" : "SECRET",
        "Token" : "TOKEN....=",
        "AccountId" : "123456789012",
        "Expiration" : "2009-02-13T23:31:30Z"
    }"#;

    #[derive(Debug)]
    struct FakeDns(Vec<IpAddr>);

    impl ResolveDns for FakeDns {
        fn resolve_dns<'a>(&'a self, _name: &'a str) -> DnsFuture<'a> {
            let addrs = self.0.clone();
            Box::pin(async move { Ok(addrs) })
        }
    }

    #[derive(Debug)]
    struct PanicDns;

    impl ResolveDns for PanicDns {
        fn resolve_dns<'a>(&'a self, name: &'a str) -> DnsFuture<'a> {
            panic!("unexpected DNS lookup of {}", name)
        }
    }

    fn provider(env: &[(&str, &str)], fs: Fs, conn: &TestConnection) -> EcsCredentialsProvider {
        EcsCredentialsProvider::builder()
            .configure(
                &ProviderConfig::no_configuration()
                    .with_env(Env::from_slice(env))
                    .with_fs(fs)
                    .with_connector(conn.connector()),
            )
            .retry_config(RetryConfig::standard().with_initial_backoff(Duration::ZERO))
            .dns(FakeDns(vec![]))
            .build()
    }

    fn json_response(status: u16, body: &str) -> Result<http::Response<Bytes>, String> {
        Ok(http::Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Bytes::from(body.to_string()))
            .unwrap())
    }

    #[tokio::test]
    async fn full_uri_host_allow_list() {
        for uri in [
            "http://127.0.0.1/creds",
            "https://127.0.0.1/creds",
            "http://[::1]:8080/creds",
            "http://169.254.170.2/creds",
            "http://169.254.170.23/v1/credentials",
            "http://[fd00:ec2::23]/v1/credentials",
            "https://192.168.1.1/creds",
            "https://my-credentials-service.example.com/creds",
        ] {
            assert!(
                validate_full_uri(uri, &PanicDns).await.is_ok(),
                "{} should be allowed",
                uri
            );
        }
        let err = validate_full_uri("http://192.168.1.1/creds", &PanicDns)
            .await
            .expect_err("not an allowed host");
        assert!(err.to_string().contains("has an invalid host"), "{}", err);
        assert!(validate_full_uri("http://169.254.169.254/creds", &PanicDns)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn hostnames_must_resolve_to_loopback() {
        let loopback = FakeDns(vec!["127.0.0.1".parse().unwrap(), "::1".parse().unwrap()]);
        assert!(validate_full_uri("http://localhost/creds", &loopback)
            .await
            .is_ok());

        let mixed = FakeDns(vec!["127.0.0.1".parse().unwrap(), "10.0.0.1".parse().unwrap()]);
        let err = validate_full_uri("http://localhost/creds", &mixed)
            .await
            .expect_err("not loopback");
        assert!(err.to_string().contains("do not resolve to the loopback device"));

        assert!(validate_full_uri("http://localhost/creds", &FakeDns(vec![]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn uri_not_set() {
        let conn = TestConnection::new(vec![]);
        let provider = provider(
            &[("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "  ")],
            Fs::from_slice(&[]),
            &conn,
        );
        let err = provider.provide_credentials().await.expect_err("no uri");
        assert!(matches!(err, CredentialsError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("Container credentials URI not set"));
        assert!(conn.requests().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn relative_uri_with_token() {
        let conn = TestConnection::new(vec![json_response(200, CREDS)]);
        let provider = provider(
            &[
                ("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "/credentials?id=1"),
                ("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/ignored"),
                ("AWS_CONTAINER_AUTHORIZATION_TOKEN", "Basic password"),
            ],
            Fs::from_slice(&[]),
            &conn,
        );
        let creds = provider.provide_credentials().await.expect("valid creds");
        assert_eq!("AKID", creds.access_key_id());
        assert_eq!(Some("TOKEN....="), creds.session_token());
        assert_eq!(Some(UNIX_EPOCH + Duration::from_secs(1234567890)), creds.expiry());
        assert_eq!(Some("123456789012"), creds.account_id().map(|id| id.as_str()));
        assert_eq!("EcsContainer", creds.provider_name());

        let requests = conn.requests();
        assert_eq!(1, requests.len());
        assert_eq!(
            "http://169.254.170.2/credentials?id=1",
            requests[0].uri.to_string()
        );
        assert_eq!(Some("Basic password"), requests[0].header("authorization"));
        assert_eq!(Some("application/json"), requests[0].header("accept"));
        assert_eq!(Some("identity"), requests[0].header("accept-encoding"));
        assert!(logs_contain("retrieving container credentials"));
    }

    #[tokio::test]
    async fn token_file_takes_precedence() {
        let conn = TestConnection::new(vec![json_response(200, CREDS)]);
        let provider = provider(
            &[
                ("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/creds"),
                ("AWS_CONTAINER_AUTHORIZATION_TOKEN", "from-env"),
                ("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE", "/token"),
            ],
            Fs::from_slice(&[("/token", "from-file")]),
            &conn,
        );
        provider.provide_credentials().await.expect("valid creds");
        assert_eq!(
            Some("from-file"),
            conn.requests()[0].header("authorization")
        );
    }

    #[tokio::test]
    async fn unreadable_token_file() {
        let conn = TestConnection::new(vec![]);
        let provider = provider(
            &[
                ("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/creds"),
                ("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE", "/missing"),
            ],
            Fs::from_slice(&[]),
            &conn,
        );
        let err = provider.provide_credentials().await.expect_err("no file");
        assert!(matches!(err, CredentialsError::ProviderError(_)));
        assert!(err.to_string().contains("Could not read token file."));
    }

    #[tokio::test]
    async fn token_with_line_break_is_rejected() {
        let conn = TestConnection::new(vec![]);
        let provider = provider(
            &[
                ("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/creds"),
                ("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE", "/token"),
            ],
            Fs::from_slice(&[("/token", "abc\r\nX-Injected: true")]),
            &conn,
        );
        let err = provider.provide_credentials().await.expect_err("bad token");
        assert!(err
            .to_string()
            .contains("Token contains illegal line break sequence."));
        assert!(conn.requests().is_empty());
    }

    #[tokio::test]
    async fn structured_error_response() {
        let conn = TestConnection::new(vec![json_response(
            400,
            r#"{"Code": "InvalidToken", "Message": "The token is not valid"}"#,
        )]);
        let provider = provider(
            &[("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/creds")],
            Fs::from_slice(&[]),
            &conn,
        );
        let err = provider.provide_credentials().await.expect_err("400");
        assert!(
            err.to_string().contains(
                "Error retrieving credentials from container service: code=InvalidToken; message=The token is not valid"
            ),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let conn = TestConnection::new(vec![
            response(500, "oops"),
            response(503, "oops"),
            response(502, "still broken"),
        ]);
        let provider = provider(
            &[("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/creds")],
            Fs::from_slice(&[]),
            &conn,
        );
        let err = provider.provide_credentials().await.expect_err("500s");
        assert_eq!(3, conn.requests().len());
        assert!(
            err.to_string().contains("HTTP 502 Bad Gateway"),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn retry_then_succeed() {
        let conn = TestConnection::new(vec![response(429, ""), json_response(200, CREDS)]);
        let provider = provider(
            &[("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/creds")],
            Fs::from_slice(&[]),
            &conn,
        );
        provider.provide_credentials().await.expect("valid creds");
        assert_eq!(0, conn.remaining());
    }

    #[tokio::test]
    async fn success_document_with_error_code() {
        let conn = TestConnection::new(vec![json_response(
            200,
            r#"{"Code": "Failure", "Message": "nope"}"#,
        )]);
        let provider = provider(
            &[("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1/creds")],
            Fs::from_slice(&[]),
            &conn,
        );
        let err = provider.provide_credentials().await.expect_err("error doc");
        assert!(err
            .to_string()
            .contains("HTTP credentials response was not of expected format"));
    }
}
