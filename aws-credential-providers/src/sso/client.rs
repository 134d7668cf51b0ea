/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Clients for the two SSO services used by the SSO providers
//!
//! - The SSO portal exchanges a bearer token for role credentials (`GetRoleCredentials`).
//! - SSO OIDC refreshes a cached bearer token (`CreateToken` with a `refresh_token` grant).
//!
//! Neither operation is signed, so [`HttpSsoClient`] implements both directly on top of the
//! configured HTTP connector. Callers may substitute their own implementations with
//! [`ProviderConfig::with_sso_portal_client`](crate::provider_config::ProviderConfig::with_sso_portal_client)
//! and [`ProviderConfig::with_sso_oidc_client`](crate::provider_config::ProviderConfig::with_sso_oidc_client).

use crate::connector::{send, ConnectorError, DynConnector, NoConnector};
use crate::json_credentials::{json_parse_loop, InvalidJsonCredentials};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::retry::{classify_http, retry, RetryConfig};
use aws_smithy_async::rt::sleep::SharedAsyncSleep;
use aws_smithy_json::deserialize::token::skip_value;
use aws_smithy_json::deserialize::{json_token_iter, Token};
use aws_smithy_json::serialize::JsonObjectWriter;
use aws_smithy_types::Number;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

const SSO_BEARER_TOKEN_HEADER: &str = "x-amz-sso_bearer_token";
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// Unreserved characters (RFC-3986 §2.3) pass through, everything else is encoded
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Input to the SSO portal `GetRoleCredentials` operation
#[derive(Clone)]
#[non_exhaustive]
pub struct GetRoleCredentialsRequest {
    /// Account to obtain credentials for
    pub account_id: String,
    /// Role to obtain credentials for
    pub role_name: String,
    /// Bearer token from the SSO cache
    pub access_token: String,
}

impl fmt::Debug for GetRoleCredentialsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetRoleCredentialsRequest")
            .field("account_id", &self.account_id)
            .field("role_name", &self.role_name)
            .field("access_token", &"** redacted **")
            .finish()
    }
}

/// Short-term credentials returned by the SSO portal
#[derive(Clone)]
pub struct RoleCredentials {
    access_key_id: String,
    secret_access_key: Zeroizing<String>,
    session_token: Zeroizing<String>,
    expiration: SystemTime,
}

impl fmt::Debug for RoleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl RoleCredentials {
    /// Create role credentials
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: SystemTime,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: Zeroizing::new(secret_access_key.into()),
            session_token: Zeroizing::new(session_token.into()),
            expiration,
        }
    }

    pub(crate) fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub(crate) fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub(crate) fn session_token(&self) -> &str {
        &self.session_token
    }

    pub(crate) fn expiration(&self) -> SystemTime {
        self.expiration
    }
}

/// Input to the SSO OIDC `CreateToken` operation, for the `refresh_token` grant
#[derive(Clone)]
#[non_exhaustive]
pub struct CreateTokenRequest {
    /// Client id of the registered client
    pub client_id: String,
    /// Client secret of the registered client
    pub client_secret: String,
    /// Refresh token from the SSO cache
    pub refresh_token: String,
    /// Always `refresh_token`
    pub grant_type: &'static str,
}

impl fmt::Debug for CreateTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateTokenRequest")
            .field("client_id", &self.client_id)
            .field("client_secret", &"** redacted **")
            .field("refresh_token", &"** redacted **")
            .field("grant_type", &self.grant_type)
            .finish()
    }
}

/// Output of the SSO OIDC `CreateToken` operation
#[derive(Clone)]
pub struct CreateTokenResponse {
    access_token: Zeroizing<String>,
    expires_in: Duration,
    refresh_token: Option<Zeroizing<String>>,
}

impl fmt::Debug for CreateTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateTokenResponse")
            .field("access_token", &"** redacted **")
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

impl CreateTokenResponse {
    /// Create a `CreateToken` response
    pub fn new(
        access_token: impl Into<String>,
        expires_in: Duration,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: Zeroizing::new(access_token.into()),
            expires_in,
            refresh_token: refresh_token.map(Zeroizing::new),
        }
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(crate) fn expires_in(&self) -> Duration {
        self.expires_in
    }

    pub(crate) fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().map(String::as_str)
    }
}

/// Error returned by an SSO portal or SSO OIDC client
#[derive(Debug)]
#[non_exhaustive]
pub enum SsoClientError {
    /// The service returned an error response
    Service {
        /// HTTP status of the response
        status: u16,
        /// Error code, e.g. `UnauthorizedException`
        code: Option<String>,
        /// Error message
        message: Option<String>,
    },

    /// The service response could not be parsed
    InvalidResponse(BoxError),

    /// The request could not be sent or the response could not be read
    Dispatch(BoxError),
}

impl SsoClientError {
    /// Wrap a transport failure
    pub fn dispatch(source: impl Into<BoxError>) -> Self {
        SsoClientError::Dispatch(source.into())
    }
}

impl fmt::Display for SsoClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsoClientError::Service {
                status,
                code,
                message,
            } => {
                write!(f, "service error (HTTP {})", status)?;
                if let Some(code) = code {
                    write!(f, ": {}", code)?;
                }
                if let Some(message) = message {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
            SsoClientError::InvalidResponse(_) => write!(f, "invalid response from service"),
            SsoClientError::Dispatch(_) => write!(f, "failed to dispatch request"),
        }
    }
}

impl Error for SsoClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SsoClientError::Service { .. } => None,
            SsoClientError::InvalidResponse(err) | SsoClientError::Dispatch(err) => {
                Some(err.as_ref() as _)
            }
        }
    }
}

/// Future returned by SSO client operations
pub type SsoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SsoClientError>> + Send + 'a>>;

/// The SSO portal operation used by [`SsoCredentialsProvider`](super::SsoCredentialsProvider)
pub trait SsoPortalClient: Send + Sync + fmt::Debug {
    /// Call `GetRoleCredentials` in `region`
    fn get_role_credentials<'a>(
        &'a self,
        region: &'a Region,
        request: GetRoleCredentialsRequest,
    ) -> SsoFuture<'a, RoleCredentials>;
}

/// The SSO OIDC operation used by [`SsoTokenProvider`](super::SsoTokenProvider)
pub trait SsoOidcClient: Send + Sync + fmt::Debug {
    /// Call `CreateToken` in `region`
    fn create_token<'a>(
        &'a self,
        region: &'a Region,
        request: CreateTokenRequest,
    ) -> SsoFuture<'a, CreateTokenResponse>;
}

/// Shared handle to an [`SsoPortalClient`]
#[derive(Clone, Debug)]
pub struct SharedSsoPortalClient(Arc<dyn SsoPortalClient>);

impl SharedSsoPortalClient {
    /// Wrap `client`
    pub fn new(client: impl SsoPortalClient + 'static) -> Self {
        Self(Arc::new(client))
    }
}

impl SsoPortalClient for SharedSsoPortalClient {
    fn get_role_credentials<'a>(
        &'a self,
        region: &'a Region,
        request: GetRoleCredentialsRequest,
    ) -> SsoFuture<'a, RoleCredentials> {
        self.0.get_role_credentials(region, request)
    }
}

/// Shared handle to an [`SsoOidcClient`]
#[derive(Clone, Debug)]
pub struct SharedSsoOidcClient(Arc<dyn SsoOidcClient>);

impl SharedSsoOidcClient {
    /// Wrap `client`
    pub fn new(client: impl SsoOidcClient + 'static) -> Self {
        Self(Arc::new(client))
    }
}

impl SsoOidcClient for SharedSsoOidcClient {
    fn create_token<'a>(
        &'a self,
        region: &'a Region,
        request: CreateTokenRequest,
    ) -> SsoFuture<'a, CreateTokenResponse> {
        self.0.create_token(region, request)
    }
}

/// SSO portal and SSO OIDC client that talks to the public regional endpoints
#[derive(Clone, Debug)]
pub struct HttpSsoClient {
    connector: Option<DynConnector>,
    sleep: SharedAsyncSleep,
    retry_config: RetryConfig,
}

impl HttpSsoClient {
    /// Create a client using the connector and sleep implementation of `config`
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            connector: config.connector().cloned(),
            sleep: config.sleep(),
            retry_config: RetryConfig::standard(),
        }
    }

    /// Override the retry behavior, by default 3 attempts
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    async fn call(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, SsoClientError> {
        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| SsoClientError::dispatch(NoConnector))?;
        let response = retry(
            &self.retry_config,
            &self.sleep,
            || send(connector, clone_request(&request)),
            classify_http,
        )
        .await
        .map_err(|err: ConnectorError| SsoClientError::dispatch(err))?;
        if !response.status().is_success() {
            return Err(service_error(&response));
        }
        Ok(response)
    }
}

impl SsoPortalClient for HttpSsoClient {
    fn get_role_credentials<'a>(
        &'a self,
        region: &'a Region,
        request: GetRoleCredentialsRequest,
    ) -> SsoFuture<'a, RoleCredentials> {
        Box::pin(async move {
            let response = self
                .call(role_credentials_request(region, &request)?)
                .await?;
            parse_role_credentials(response.body()).map_err(SsoClientError::InvalidResponse)
        })
    }
}

impl SsoOidcClient for HttpSsoClient {
    fn create_token<'a>(
        &'a self,
        region: &'a Region,
        request: CreateTokenRequest,
    ) -> SsoFuture<'a, CreateTokenResponse> {
        Box::pin(async move {
            let response = self.call(create_token_request(region, &request)?).await?;
            parse_create_token(response.body())
                .map_err(|err| SsoClientError::InvalidResponse(err.into()))
        })
    }
}

fn clone_request(request: &http::Request<Bytes>) -> http::Request<Bytes> {
    let mut cloned = http::Request::new(request.body().clone());
    *cloned.method_mut() = request.method().clone();
    *cloned.uri_mut() = request.uri().clone();
    *cloned.headers_mut() = request.headers().clone();
    cloned
}

fn role_credentials_request(
    region: &Region,
    request: &GetRoleCredentialsRequest,
) -> Result<http::Request<Bytes>, SsoClientError> {
    let uri = format!(
        "https://portal.sso.{}.amazonaws.com/federation/credentials?account_id={}&role_name={}",
        region,
        utf8_percent_encode(&request.account_id, QUERY_SET),
        utf8_percent_encode(&request.role_name, QUERY_SET),
    );
    http::Request::builder()
        .method(http::Method::GET)
        .uri(uri)
        .header(SSO_BEARER_TOKEN_HEADER, request.access_token.as_str())
        .body(Bytes::new())
        .map_err(SsoClientError::dispatch)
}

fn create_token_request(
    region: &Region,
    request: &CreateTokenRequest,
) -> Result<http::Request<Bytes>, SsoClientError> {
    let mut body = String::new();
    let mut writer = JsonObjectWriter::new(&mut body);
    writer.key("clientId").string(&request.client_id);
    writer.key("clientSecret").string(&request.client_secret);
    writer.key("grantType").string(request.grant_type);
    writer.key("refreshToken").string(&request.refresh_token);
    writer.finish();

    http::Request::builder()
        .method(http::Method::POST)
        .uri(format!("https://oidc.{}.amazonaws.com/token", region))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Bytes::from(body))
        .map_err(SsoClientError::dispatch)
}

/// Error code from `x-amzn-errortype`, else from the body. Messages only come from the body.
fn service_error(response: &http::Response<Bytes>) -> SsoClientError {
    let mut code = response
        .headers()
        .get(ERROR_TYPE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(':').next())
        .map(ToString::to_string);
    let mut message = None;
    let _ = json_parse_loop(response.body(), |key, value| {
        if let Token::ValueString { value, .. } = value {
            match key.as_ref() {
                "__type" | "code" | "error" if code.is_none() => {
                    code = Some(value.to_unescaped()?.into_owned())
                }
                "message" | "Message" | "error_description" => {
                    message = Some(value.to_unescaped()?.into_owned())
                }
                _ => {}
            }
        }
        Ok(())
    });
    tracing::debug!(status = %response.status(), code = ?code, "SSO service returned an error");
    SsoClientError::Service {
        status: response.status().as_u16(),
        code,
        message,
    }
}

fn epoch_millis(number: &Number) -> Option<SystemTime> {
    let millis = match number {
        Number::PosInt(millis) => *millis,
        Number::NegInt(_) => return None,
        Number::Float(millis) if millis.is_finite() && *millis >= 0.0 => *millis as u64,
        Number::Float(_) => return None,
    };
    UNIX_EPOCH.checked_add(Duration::from_millis(millis))
}

/// Parse a `GetRoleCredentials` response
///
/// ```json
/// {
///   "roleCredentials": {
///     "accessKeyId": "ASIARTESTID",
///     "secretAccessKey": "TESTSECRETKEY",
///     "sessionToken": "TESTSESSIONTOKEN",
///     "expiration": 1651516560000
///   }
/// }
/// ```
fn parse_role_credentials(body: &[u8]) -> Result<RoleCredentials, BoxError> {
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;
    let mut expiration = None;

    let mut tokens = json_token_iter(body).peekable();
    if !matches!(tokens.next().transpose()?, Some(Token::StartObject { .. })) {
        return Err("expected a JSON document starting with `{`".into());
    }
    loop {
        match tokens.next().transpose()? {
            Some(Token::EndObject { .. }) => break,
            Some(Token::ObjectKey { key, .. }) => {
                let key = key.to_unescaped()?;
                let is_object = matches!(tokens.peek(), Some(Ok(Token::StartObject { .. })));
                if key != "roleCredentials" || !is_object {
                    skip_value(&mut tokens)?;
                    continue;
                }
                tokens.next();
                loop {
                    match tokens.next().transpose()? {
                        Some(Token::EndObject { .. }) => break,
                        Some(Token::ObjectKey { key, .. }) => {
                            let key = key.to_unescaped()?;
                            match (key.as_ref(), tokens.peek()) {
                                ("accessKeyId", Some(Ok(Token::ValueString { value, .. }))) => {
                                    access_key_id = Some(value.to_unescaped()?.into_owned())
                                }
                                (
                                    "secretAccessKey",
                                    Some(Ok(Token::ValueString { value, .. })),
                                ) => secret_access_key = Some(value.to_unescaped()?.into_owned()),
                                ("sessionToken", Some(Ok(Token::ValueString { value, .. }))) => {
                                    session_token = Some(value.to_unescaped()?.into_owned())
                                }
                                ("expiration", Some(Ok(Token::ValueNumber { value, .. }))) => {
                                    expiration = Some(
                                        epoch_millis(value)
                                            .ok_or("`expiration` is not a valid timestamp")?,
                                    )
                                }
                                _ => {}
                            }
                            skip_value(&mut tokens)?;
                        }
                        other => {
                            return Err(format!("expected object key, found: {:?}", other).into())
                        }
                    }
                }
            }
            other => return Err(format!("expected object key, found: {:?}", other).into()),
        }
    }

    Ok(RoleCredentials::new(
        access_key_id.ok_or("missing `accessKeyId` in SSO roleCredentials response")?,
        secret_access_key.ok_or("missing `secretAccessKey` in SSO roleCredentials response")?,
        session_token.ok_or("missing `sessionToken` in SSO roleCredentials response")?,
        expiration.ok_or("missing `expiration` in SSO roleCredentials response")?,
    ))
}

fn parse_create_token(body: &[u8]) -> Result<CreateTokenResponse, InvalidJsonCredentials> {
    let mut access_token = None;
    let mut expires_in = None;
    let mut refresh_token = None;
    json_parse_loop(body, |key, value| {
        match (key.as_ref(), value) {
            ("accessToken", Token::ValueString { value, .. }) => {
                access_token = Some(value.to_unescaped()?.into_owned())
            }
            ("refreshToken", Token::ValueString { value, .. }) => {
                refresh_token = Some(value.to_unescaped()?.into_owned())
            }
            ("expiresIn", Token::ValueNumber { value, .. }) => {
                expires_in = match value {
                    Number::PosInt(secs) => Some(Duration::from_secs(*secs)),
                    _ => {
                        return Err(InvalidJsonCredentials::InvalidField {
                            field: "expiresIn",
                            err: "expected a positive integer".into(),
                        })
                    }
                }
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(CreateTokenResponse::new(
        access_token.ok_or(InvalidJsonCredentials::MissingField("accessToken"))?,
        expires_in.ok_or(InvalidJsonCredentials::MissingField("expiresIn"))?,
        refresh_token,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connector::test_util::{response, TestConnection};
    use crate::retry::RetryConfig;

    fn client(conn: &TestConnection) -> HttpSsoClient {
        HttpSsoClient::new(&ProviderConfig::no_configuration().with_connector(conn.connector()))
            .with_retry_config(RetryConfig::standard().with_max_attempts(1))
    }

    #[tokio::test]
    async fn get_role_credentials() {
        let conn = TestConnection::new(vec![response(
            200,
            r#"{"roleCredentials":{"accessKeyId":"ASIARTESTID","secretAccessKey":"TESTSECRETKEY","sessionToken":"TESTSESSIONTOKEN","expiration":1651516560000}}"#,
        )]);
        let creds = client(&conn)
            .get_role_credentials(
                &Region::new("us-east-2"),
                GetRoleCredentialsRequest {
                    account_id: "123456789".into(),
                    role_name: "Admin+Role".into(),
                    access_token: "a-token".into(),
                },
            )
            .await
            .expect("valid response");
        assert_eq!("ASIARTESTID", creds.access_key_id());
        assert_eq!("TESTSECRETKEY", creds.secret_access_key());
        assert_eq!("TESTSESSIONTOKEN", creds.session_token());
        assert_eq!(
            UNIX_EPOCH + Duration::from_millis(1_651_516_560_000),
            creds.expiration()
        );

        let request = &conn.requests()[0];
        assert_eq!(
            "https://portal.sso.us-east-2.amazonaws.com/federation/credentials?account_id=123456789&role_name=Admin%2BRole",
            request.uri.to_string()
        );
        assert_eq!(Some("a-token"), request.header("x-amz-sso_bearer_token"));
        assert_eq!(http::Method::GET, request.method);
    }

    #[tokio::test]
    async fn create_token() {
        let conn = TestConnection::new(vec![response(
            200,
            r#"{"accessToken":"new-token","expiresIn":28800,"refreshToken":"new-refresh","tokenType":"Bearer"}"#,
        )]);
        let token = client(&conn)
            .create_token(
                &Region::new("us-west-2"),
                CreateTokenRequest {
                    client_id: "client-id".into(),
                    client_secret: "client-secret".into(),
                    refresh_token: "refresh".into(),
                    grant_type: "refresh_token",
                },
            )
            .await
            .expect("valid response");
        assert_eq!("new-token", token.access_token());
        assert_eq!(Duration::from_secs(28800), token.expires_in());
        assert_eq!(Some("new-refresh"), token.refresh_token());

        let request = &conn.requests()[0];
        assert_eq!(
            "https://oidc.us-west-2.amazonaws.com/token",
            request.uri.to_string()
        );
        assert_eq!(http::Method::POST, request.method);
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(
            serde_json::json!({
                "clientId": "client-id",
                "clientSecret": "client-secret",
                "grantType": "refresh_token",
                "refreshToken": "refresh"
            }),
            body
        );
    }

    #[tokio::test]
    async fn service_errors() {
        let conn = TestConnection::new(vec![Ok(http::Response::builder()
            .status(401)
            .header("x-amzn-errortype", "UnauthorizedException:http://internal.amazon.com/")
            .body(Bytes::from_static(
                br#"{"message":"Session token not found or invalid"}"#,
            ))
            .unwrap())]);
        let err = client(&conn)
            .get_role_credentials(
                &Region::new("us-east-1"),
                GetRoleCredentialsRequest {
                    account_id: "123456789".into(),
                    role_name: "Admin".into(),
                    access_token: "expired".into(),
                },
            )
            .await
            .expect_err("unauthorized");
        assert_eq!(
            "service error (HTTP 401): UnauthorizedException: Session token not found or invalid",
            err.to_string()
        );
    }

    #[test]
    fn incomplete_role_credentials() {
        let err = parse_role_credentials(
            br#"{"roleCredentials":{"accessKeyId":"ASIARTESTID","expiration":1651516560000}}"#,
        )
        .expect_err("missing secret");
        assert_eq!(
            "missing `secretAccessKey` in SSO roleCredentials response",
            err.to_string()
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let request = CreateTokenRequest {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            refresh_token: "refresh".into(),
            grant_type: "refresh_token",
        };
        let formatted = format!("{:?}", request);
        assert!(!formatted.contains("client-secret"));
        assert!(!formatted.contains("\"refresh\""));
    }
}
