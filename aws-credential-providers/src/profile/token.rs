/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Profile based bearer token provider
//!
//! Only `sso-session` tokens are supported: the active profile must name an `sso_session`
//! whose section sets `sso_start_url` and `sso_region`.
//!
//! ```ini
//! [default]
//! sso_session = my-session
//!
//! [sso-session my-session]
//! sso_start_url = https://d-123.awsapps.com/start
//! sso_region = us-east-1
//! ```

use crate::profile::credentials::{ProfileFileError, Section};
use crate::profile::SharedConfig;
use crate::provider::token::{self as provider, future, AccessTokenError, ProvideAccessToken};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::sso::SsoTokenProvider;
use tracing::Instrument;

const SSO_SESSION: &str = "sso_session";
const SSO_START_URL: &str = "sso_start_url";
const SSO_REGION: &str = "sso_region";

/// Bearer token provider for the `sso-session` of the active profile
///
/// **Note:** this provider does not cache. The shared config and the SSO token cache are read
/// again on every call.
#[derive(Debug)]
pub struct ProfileFileTokenProvider {
    provider_config: ProviderConfig,
}

impl ProfileFileTokenProvider {
    /// Builder for this token provider
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn load_token(&self) -> provider::Result {
        let config = self
            .provider_config
            .shared_config()
            .await
            .map_err(|err| {
                AccessTokenError::invalid_configuration(ProfileFileError::CouldNotLoadConfig(err))
            })?;
        tracing::debug!(profile = %config.selected_profile(), "loading bearer token from profile");
        let token_provider = token_provider(&config, &self.provider_config)?;
        token_provider.provide_access_token().await
    }
}

fn token_provider(
    config: &SharedConfig,
    provider_config: &ProviderConfig,
) -> Result<SsoTokenProvider, AccessTokenError> {
    let profile_name = config.selected_profile();
    let session_name = match config
        .active_profile()
        .and_then(|profile| profile.get(SSO_SESSION))
    {
        Some(session_name) => session_name,
        None => {
            return Err(AccessTokenError::not_loaded(
                ProfileFileError::NoTokenProvider {
                    profile: profile_name.to_string(),
                },
            ))
        }
    };
    let session = config.sso_session(session_name).ok_or_else(|| {
        AccessTokenError::invalid_configuration(ProfileFileError::MissingSsoSession {
            profile: profile_name.to_string(),
            sso_session: session_name.to_string(),
        })
    })?;
    let missing = |field: &'static str| {
        AccessTokenError::invalid_configuration(ProfileFileError::MissingField {
            section: Section::SsoSession,
            name: session_name.to_string(),
            field,
        })
    };
    // the start URL is not needed to read the token, but a session without one is unusable
    session.get(SSO_START_URL).ok_or_else(|| missing(SSO_START_URL))?;
    let region = session.get(SSO_REGION).ok_or_else(|| missing(SSO_REGION))?;
    SsoTokenProvider::builder()
        .configure(provider_config)
        .session_name(session_name)
        .region(Region::new(region.to_string()))
        .build()
        .ok_or_else(|| AccessTokenError::unhandled("SSO token provider was not fully configured"))
}

impl ProvideAccessToken for ProfileFileTokenProvider {
    fn provide_access_token<'a>(&'a self) -> future::ProvideAccessToken<'a>
    where
        Self: 'a,
    {
        future::ProvideAccessToken::new(
            self.load_token()
                .instrument(tracing::debug_span!("load_token", provider = "Profile")),
        )
    }
}

/// Builder for [`ProfileFileTokenProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    profile_override: Option<String>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.provider_config = Some(config.clone());
        self
    }

    /// Load the token for `profile_name` instead of `AWS_PROFILE` or `default`
    pub fn profile_name(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_override = Some(profile_name.into());
        self
    }

    /// Build the provider
    pub fn build(self) -> ProfileFileTokenProvider {
        let config = self.provider_config.unwrap_or_default();
        let provider_config = match self.profile_override {
            Some(profile_name) => config.with_profile_name(profile_name),
            None => config,
        };
        ProfileFileTokenProvider { provider_config }
    }
}
