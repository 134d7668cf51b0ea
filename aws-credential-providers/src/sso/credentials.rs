/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! SSO Credentials Provider
//!
//! This credentials provider enables loading credentials from `~/.aws/sso/cache`. For more information,
//! see [Using AWS SSO Credentials](https://docs.aws.amazon.com/toolkit-for-vscode/latest/userguide/sso-credentials.html)
//!
//! This provider is included automatically when profiles are loaded.

use crate::os_shim::{Env, Fs};
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider::token::{AccessTokenError, ProvideAccessToken};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::sso::cache::{load_cached_token, SsoTokenError};
use crate::sso::client::{GetRoleCredentialsRequest, SharedSsoPortalClient, SsoPortalClient};
use crate::sso::token::SsoTokenProvider;
use crate::Credentials;
use aws_smithy_async::time::SharedTimeSource;
use std::error::Error;
use std::fmt;
use tracing::Instrument;
use zeroize::Zeroizing;

const PROVIDER_NAME: &str = "SSO";

/// The SSO settings of a profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsoProviderConfig {
    /// Account to obtain role credentials for
    pub account_id: String,
    /// Role to obtain credentials for
    pub role_name: String,
    /// Start URL of the SSO portal
    pub start_url: String,
    /// Region where the SSO portal is hosted
    pub region: Region,
    /// `sso-session` name
    ///
    /// When set, the cached token is looked up by session name and refreshed when needed. Otherwise
    /// the token is looked up by start URL and is never refreshed.
    pub session_name: Option<String>,
}

/// SSO Credentials Provider
///
/// _Note: This provider is part of the default credentials chain and is integrated with the profile-file provider._
///
/// This credentials provider will use cached SSO tokens stored in `~/.aws/sso/cache/<hash>.json`.
/// Two different values will be tried for `<hash>` in order:
/// 1. The configured `session_name`.
/// 2. The configured `start_url`.
#[derive(Debug)]
pub struct SsoCredentialsProvider {
    fs: Fs,
    env: Env,
    sso_config: SsoProviderConfig,
    time_source: SharedTimeSource,
    portal: SharedSsoPortalClient,
    token_provider: Option<SsoTokenProvider>,
}

impl SsoCredentialsProvider {
    /// Create an SSO credentials provider
    ///
    /// The `provider_config` supplies the environment, file system, clock and SSO clients.
    pub fn new(provider_config: &ProviderConfig, sso_config: SsoProviderConfig) -> Self {
        let token_provider = sso_config.session_name.as_ref().and_then(|session_name| {
            SsoTokenProvider::builder()
                .configure(provider_config)
                .session_name(session_name.clone())
                .region(sso_config.region.clone())
                .build()
        });
        SsoCredentialsProvider {
            fs: provider_config.fs(),
            env: provider_config.env(),
            time_source: provider_config.time_source(),
            portal: provider_config.sso_portal_client(),
            token_provider,
            sso_config,
        }
    }

    async fn access_token(&self) -> Result<Zeroizing<String>, CredentialsError> {
        if let Some(token_provider) = &self.token_provider {
            tracing::trace!(session_name = ?self.sso_config.session_name, "loading token for sso-session");
            let token = token_provider
                .provide_access_token()
                .await
                .map_err(into_credentials_error)?;
            return Ok(Zeroizing::new(token.token().to_string()));
        }

        tracing::trace!("loading token from the legacy SSO cache");
        let token = load_cached_token(&self.env, &self.fs, &self.sso_config.start_url)
            .await
            .map_err(CredentialsError::invalid_configuration)?;
        if self.time_source.now() > token.expires_at {
            return Err(CredentialsError::invalid_configuration(
                SsoTokenError::SessionExpired,
            ));
        }
        Ok(token.access_token)
    }

    async fn credentials(&self) -> provider::Result {
        let token = self.access_token().await?;
        let request = GetRoleCredentialsRequest {
            account_id: self.sso_config.account_id.clone(),
            role_name: self.sso_config.role_name.clone(),
            access_token: token.as_str().to_string(),
        };
        let role_credentials = self
            .portal
            .get_role_credentials(&self.sso_config.region, request)
            .await
            .map_err(|err| {
                tracing::warn!(err = %err, "failed to exchange SSO token for role credentials");
                CredentialsError::not_loaded(GetRoleCredentialsFailed(err.into()))
            })?;
        let credentials = Credentials::builder()
            .access_key_id(role_credentials.access_key_id())
            .secret_access_key(role_credentials.secret_access_key())
            .session_token(role_credentials.session_token())
            .expiry(role_credentials.expiration())
            .account_id(self.sso_config.account_id.as_str())
            .provider_name(PROVIDER_NAME)
            .build();
        tracing::debug!(expiration = ?credentials.expiry(), "obtained role credentials from SSO");
        Ok(credentials)
    }
}

impl ProvideCredentials for SsoCredentialsProvider {
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

/// The error kind is kept, so an expired session stays a configuration error
fn into_credentials_error(err: AccessTokenError) -> CredentialsError {
    match err {
        AccessTokenError::TokenNotLoaded(_) => CredentialsError::not_loaded(err),
        AccessTokenError::ProviderTimedOut(details) => {
            CredentialsError::provider_timed_out(details.timeout_duration())
        }
        AccessTokenError::InvalidConfiguration(_) => CredentialsError::invalid_configuration(err),
        AccessTokenError::ProviderError(_) => CredentialsError::provider_error(err),
        AccessTokenError::Unhandled(_) => CredentialsError::unhandled(err),
    }
}

#[derive(Debug)]
struct GetRoleCredentialsFailed(Box<dyn Error + Send + Sync>);

impl fmt::Display for GetRoleCredentialsFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GetRoleCredentials operation failed")
    }
}

impl Error for GetRoleCredentialsFailed {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.0.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::{SsoCredentialsProvider, SsoProviderConfig};
    use crate::connector::test_util::{response, TestConnection};
    use crate::os_shim::{Env, Fs};
    use crate::provider::credentials::{CredentialsError, ProvideCredentials};
    use crate::provider_config::ProviderConfig;
    use crate::region::Region;
    use crate::time_source::TestingTimeSource;
    use std::error::Error;
    use std::time::{Duration, UNIX_EPOCH};

    const START_URL: &str = "https://d-abc123.awsapps.com/start";
    // sha1 of the start url
    const LEGACY_CACHE: &str =
        "/home/user/.aws/sso/cache/40a89917e3175433e361b710a9d43528d7f1890a.json";
    // sha1 of `my-sso-session`
    const SESSION_CACHE: &str =
        "/home/user/.aws/sso/cache/b755b5ec73400c04400e978208d8559ad1f39053.json";

    const ROLE_CREDENTIALS: &str = r#"{"roleCredentials":{"accessKeyId":"ASIARTESTID","secretAccessKey":"TESTSECRETKEY","sessionToken":"TESTSESSIONTOKEN","expiration":1651516560000}}"#;

    // expires at 2021-12-25T21:30:00Z
    const CACHED_TOKEN: &str = r#"{"accessToken": "a-token", "expiresAt": "2021-12-25T21:30:00Z"}"#;

    fn provider(
        cache_file: &str,
        session_name: Option<&str>,
        now_secs: u64,
        conn: &TestConnection,
    ) -> SsoCredentialsProvider {
        let config = ProviderConfig::no_configuration()
            .with_env(Env::from_slice(&[("HOME", "/home/user")]))
            .with_fs(Fs::from_slice(&[(cache_file, CACHED_TOKEN)]))
            .with_time_source(TestingTimeSource::new(
                UNIX_EPOCH + Duration::from_secs(now_secs),
            ))
            .with_connector(conn.connector());
        SsoCredentialsProvider::new(
            &config,
            SsoProviderConfig {
                account_id: "123456789012".into(),
                role_name: "SsoReadOnlyRole".into(),
                start_url: START_URL.into(),
                region: Region::new("us-east-2"),
                session_name: session_name.map(ToString::to_string),
            },
        )
    }

    #[tokio::test]
    async fn legacy_token_exchange() {
        let conn = TestConnection::new(vec![response(200, ROLE_CREDENTIALS)]);
        let creds = provider(LEGACY_CACHE, None, 1640467800 - 60, &conn)
            .provide_credentials()
            .await
            .expect("valid credentials");
        assert_eq!("ASIARTESTID", creds.access_key_id());
        assert_eq!(Some("TESTSESSIONTOKEN"), creds.session_token());
        assert_eq!(
            Some(UNIX_EPOCH + Duration::from_millis(1_651_516_560_000)),
            creds.expiry()
        );
        assert_eq!(
            Some("123456789012"),
            creds.account_id().map(|account| account.as_str())
        );
        assert_eq!("SSO", creds.provider_name());

        let request = &conn.requests()[0];
        assert_eq!(Some("a-token"), request.header("x-amz-sso_bearer_token"));
        assert_eq!(
            "https://portal.sso.us-east-2.amazonaws.com/federation/credentials?account_id=123456789012&role_name=SsoReadOnlyRole",
            request.uri.to_string()
        );
    }

    #[tokio::test]
    async fn expired_legacy_token() {
        let conn = TestConnection::new(vec![]);
        let err = provider(LEGACY_CACHE, None, 1640467800 + 1, &conn)
            .provide_credentials()
            .await
            .expect_err("expired");
        assert!(
            matches!(err, CredentialsError::InvalidConfiguration(_)),
            "{:?}",
            err
        );
        assert!(err
            .source()
            .unwrap()
            .to_string()
            .starts_with("The SSO session has expired"));
        assert!(conn.requests().is_empty());
    }

    #[tokio::test]
    async fn session_token_exchange() {
        let conn = TestConnection::new(vec![response(200, ROLE_CREDENTIALS)]);
        let creds = provider(SESSION_CACHE, Some("my-sso-session"), 1640467800 - 3600, &conn)
            .provide_credentials()
            .await
            .expect("valid credentials");
        assert_eq!("ASIARTESTID", creds.access_key_id());
    }

    #[tokio::test]
    async fn expired_session_token() {
        let conn = TestConnection::new(vec![]);
        let err = provider(SESSION_CACHE, Some("my-sso-session"), 1640467800, &conn)
            .provide_credentials()
            .await
            .expect_err("expired");
        assert!(
            matches!(err, CredentialsError::InvalidConfiguration(_)),
            "{:?}",
            err
        );
        assert!(err
            .to_string()
            .contains("SSO token for sso-session: `my-sso-session` is expired"));
    }

    #[tokio::test]
    async fn missing_cache() {
        let conn = TestConnection::new(vec![]);
        // the session cache is not where a legacy profile looks
        let err = provider(SESSION_CACHE, None, 1640467800 - 60, &conn)
            .provide_credentials()
            .await
            .expect_err("no cache");
        assert!(matches!(err, CredentialsError::InvalidConfiguration(_)));
        assert!(err
            .to_string()
            .contains("Invalid or missing SSO session cache. Run `aws sso login` to initiate a new SSO session"));
    }

    #[tokio::test]
    async fn exchange_failures_are_not_loaded() {
        let conn = TestConnection::new(vec![response(
            403,
            r#"{"message":"No access","__type":"ForbiddenException"}"#,
        )]);
        let err = provider(LEGACY_CACHE, None, 1640467800 - 60, &conn)
            .provide_credentials()
            .await
            .expect_err("forbidden");
        assert!(err.is_not_loaded(), "{:?}", err);
        let source = err.source().unwrap();
        assert_eq!("GetRoleCredentials operation failed", source.to_string());
        assert_eq!(
            "service error (HTTP 403): ForbiddenException: No access",
            source.source().unwrap().to_string()
        );
    }
}
