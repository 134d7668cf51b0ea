/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! SSO Token Provider
//!
//! This token provider loads the token cached by `aws sso login` for an `sso-session` and
//! refreshes it with SSO OIDC when it is about to expire. It cannot perform the initial login.

use crate::meta::cache::ExpiringCache;
use crate::os_shim::{Env, Fs};
use crate::provider::token::{self as provider, future, AccessTokenError, ProvideAccessToken};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::sso::cache::{load_cached_token, save_cached_token, CachedSsoToken, SsoTokenError};
use crate::sso::client::{CreateTokenRequest, SharedSsoOidcClient, SsoOidcClient};
use crate::AccessToken;
use aws_smithy_async::time::SharedTimeSource;
use std::time::{Duration, SystemTime};
use tracing::Instrument;
use zeroize::Zeroizing;

const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);
const OIDC_GRANT_TYPE_REFRESH: &str = "refresh_token";

/// Bearer token provider for an `sso-session`
///
/// Tokens are kept in memory until they enter the refresh buffer window (5 minutes by default).
/// The cache file is then read again and, if the token can be refreshed, a new one is fetched
/// and written back to the cache.
#[derive(Debug)]
pub struct SsoTokenProvider {
    inner: Inner,
    token_cache: ExpiringCache<AccessToken, AccessTokenError>,
}

#[derive(Debug)]
struct Inner {
    session_name: String,
    region: Region,
    env: Env,
    fs: Fs,
    time_source: SharedTimeSource,
    oidc: SharedSsoOidcClient,
    refresh_buffer: Duration,
}

impl SsoTokenProvider {
    /// Create a builder for [`SsoTokenProvider`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn token(&self) -> provider::Result {
        let now = self.inner.time_source.now();
        if let Some(token) = self.token_cache.yield_or_clear_if_expired(now).await {
            tracing::debug!(
                session_name = %self.inner.session_name,
                "using in-memory SSO token"
            );
            return Ok(token);
        }
        self.token_cache
            .get_or_load(|| async {
                let token = self.inner.resolve().await?;
                let expires_at = token.expires_at;
                Ok((
                    AccessToken::new(token.access_token.as_str(), Some(expires_at)),
                    Some(expires_at),
                ))
            })
            .await
    }
}

impl Inner {
    fn expired(&self, source: Option<Box<dyn std::error::Error + Send + Sync>>) -> AccessTokenError {
        AccessTokenError::invalid_configuration(SsoTokenError::ExpiredToken {
            session_name: self.session_name.clone(),
            source,
        })
    }

    async fn resolve(&self) -> Result<CachedSsoToken, AccessTokenError> {
        let token = load_cached_token(&self.env, &self.fs, &self.session_name)
            .await
            .map_err(AccessTokenError::invalid_configuration)?;
        let now = self.time_source.now();
        let refresh_at = token
            .expires_at
            .checked_sub(self.refresh_buffer)
            .unwrap_or(token.expires_at);
        if now < refresh_at {
            tracing::debug!(session_name = %self.session_name, "using cached SSO token");
            return Ok(token);
        }

        if token.is_refreshable(now) {
            return self.refresh(token, now).await;
        }

        if now < token.expires_at {
            tracing::debug!(
                session_name = %self.session_name,
                "cached SSO token is not refreshable but is still valid"
            );
            return Ok(token);
        }
        Err(self.expired(None))
    }

    async fn refresh(
        &self,
        token: CachedSsoToken,
        now: SystemTime,
    ) -> Result<CachedSsoToken, AccessTokenError> {
        tracing::debug!(session_name = %self.session_name, "attempting to refresh SSO token");
        let (client_id, client_secret, refresh_token) =
            match (&token.client_id, &token.client_secret, &token.refresh_token) {
                (Some(id), Some(secret), Some(refresh)) => {
                    (id.clone(), secret.as_str().to_string(), refresh.as_str().to_string())
                }
                _ => return Err(self.expired(None)),
            };
        let request = CreateTokenRequest {
            client_id,
            client_secret,
            refresh_token,
            grant_type: OIDC_GRANT_TYPE_REFRESH,
        };
        let refreshed: Result<_, Box<dyn std::error::Error + Send + Sync>> =
            match self.oidc.create_token(&self.region, request).await {
                Ok(response) => match now.checked_add(response.expires_in()) {
                    Some(expires_at) => Ok((response, expires_at)),
                    None => Err("refreshed token expiry is out of range".into()),
                },
                Err(err) => Err(err.into()),
            };
        match refreshed {
            Ok((response, expires_at)) => {
                let refreshed = CachedSsoToken {
                    access_token: Zeroizing::new(response.access_token().to_string()),
                    expires_at,
                    refresh_token: response
                        .refresh_token()
                        .map(|refresh| Zeroizing::new(refresh.to_string())),
                    ..token
                };
                if let Err(err) =
                    save_cached_token(&self.env, &self.fs, &self.session_name, &refreshed).await
                {
                    tracing::warn!(err = %err, "failed to write refreshed SSO token back to the cache");
                }
                Ok(refreshed)
            }
            Err(err) if now < token.expires_at => {
                tracing::debug!(
                    err = %err,
                    session_name = %self.session_name,
                    "SSO token refresh failed but the cached token is still valid, re-using it"
                );
                Ok(token)
            }
            Err(err) => {
                tracing::warn!(err = %err, "SSO token refresh failed");
                Err(self.expired(Some(err)))
            }
        }
    }
}

impl ProvideAccessToken for SsoTokenProvider {
    fn provide_access_token<'a>(&'a self) -> future::ProvideAccessToken<'a>
    where
        Self: 'a,
    {
        future::ProvideAccessToken::new(self.token().instrument(tracing::debug_span!(
            "load_token",
            provider = "SsoTokenProvider",
            session = %self.inner.session_name
        )))
    }
}

/// Builder for [`SsoTokenProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    config: Option<ProviderConfig>,
    session_name: Option<String>,
    region: Option<Region>,
    refresh_buffer: Option<Duration>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Name of the `sso-session`, used as the cache key
    pub fn session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = Some(session_name.into());
        self
    }

    /// Region of the SSO OIDC endpoint
    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// How long before expiry the in-memory token is dropped, by default 5 minutes
    ///
    /// The same window decides when the cached token is refreshed.
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    /// Build the provider
    ///
    /// Returns `None` unless both the session name and the region were set.
    pub fn build(self) -> Option<SsoTokenProvider> {
        let config = self.config.unwrap_or_default();
        let refresh_buffer = self.refresh_buffer.unwrap_or(DEFAULT_REFRESH_BUFFER);
        Some(SsoTokenProvider {
            inner: Inner {
                session_name: self.session_name?,
                region: self.region?,
                env: config.env(),
                fs: config.fs(),
                time_source: config.time_source(),
                oidc: config.sso_oidc_client(),
                refresh_buffer,
            },
            token_cache: ExpiringCache::new(refresh_buffer),
        })
    }
}
