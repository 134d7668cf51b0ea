/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! IMDSv2 Credentials Provider
//!
//! # Important
//! This credential provider will NOT fallback to IMDSv1. Ensure that IMDSv2 is enabled on your instances.
//!
//! Credentials are loaded from the instance profile attached to the instance:
//! 1. The name of the instance profile is read from
//!    `/latest/meta-data/iam/security-credentials-extended/` (or taken from
//!    `AWS_EC2_INSTANCE_PROFILE_NAME`).
//! 2. The credentials document is read from the same path with the profile name appended.
//!
//! Instances that do not serve the extended API fall back to
//! `/latest/meta-data/iam/security-credentials/`.

use crate::imds::client::ImdsError;
use crate::imds::{self, env};
use crate::json_credentials::{parse_json_credentials, JsonCredentials, RefreshableCredentials};
use crate::meta::cache::ExpiringCache;
use crate::os_shim::Env;
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::Credentials;
use aws_smithy_async::time::SharedTimeSource;
use http::StatusCode;
use std::error::Error;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, UNIX_EPOCH};
use tracing::Instrument;

const PROVIDER_NAME: &str = "IMDSv2";
const CODE_ASSUME_ROLE_UNAUTHORIZED_ACCESS: &str = "AssumeRoleUnauthorizedAccess";

/// Version of the IMDS credentials API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiVersion {
    /// The original API
    Legacy,
    /// Newer API that also returns `AccountId`
    Extended,
}

impl ApiVersion {
    fn path(&self) -> &'static str {
        match self {
            ApiVersion::Legacy => "/latest/meta-data/iam/security-credentials/",
            ApiVersion::Extended => "/latest/meta-data/iam/security-credentials-extended/",
        }
    }
}

#[derive(Debug, Default)]
struct State {
    // unknown until a request against one of the APIs succeeds
    api_version: Option<ApiVersion>,
    resolved_profile: Option<String>,
    last_retrieved: Option<Credentials>,
}

/// IMDSv2 Credentials Provider
///
/// **Note**: This credentials provider will NOT fallback to the IMDSv1 flow.
#[derive(Debug)]
pub struct ImdsCredentialsProvider {
    client: Result<imds::Client, CredentialsError>,
    env: Env,
    profile: Option<String>,
    time_source: SharedTimeSource,
    // shares one load between concurrent callers; a finished load is never served again
    in_flight: ExpiringCache<Credentials, CredentialsError>,
    state: Mutex<State>,
}

impl ImdsCredentialsProvider {
    /// Builder for [`ImdsCredentialsProvider`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    fn imds_disabled(&self) -> bool {
        match self.env.get(env::EC2_METADATA_DISABLED) {
            Ok(value) => value.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load credentials from the instance profile
    ///
    /// Concurrent callers share a single load.
    pub async fn credentials(&self) -> provider::Result {
        if self.imds_disabled() {
            tracing::debug!("IMDS disabled because $AWS_EC2_METADATA_DISABLED was set to `true`");
            return Err(CredentialsError::not_loaded(
                "AWS EC2 metadata is explicitly disabled; credentials not loaded",
            ));
        }
        let client = self.client.as_ref().map_err(Clone::clone)?;
        if let Some(credentials) = self
            .in_flight
            .yield_or_clear_if_expired(self.time_source.now())
            .await
        {
            return Ok(credentials);
        }
        self.in_flight
            .get_or_load(|| async move {
                let credentials = self.load(client).await?;
                Ok((credentials, Some(UNIX_EPOCH)))
            })
            .await
    }

    async fn load(&self, client: &imds::Client) -> provider::Result {
        let mut profile_rediscovered = false;
        loop {
            let (api_version, resolved_profile) = {
                let state = self.state();
                (state.api_version, state.resolved_profile.clone())
            };
            let version = api_version.unwrap_or(ApiVersion::Extended);

            let profile = match self.profile.clone().or(resolved_profile) {
                Some(profile) => profile,
                None => match client.get(version.path()).await {
                    Ok(profile) => {
                        self.state().api_version.get_or_insert(version);
                        match profile.lines().next().map(str::trim) {
                            Some(profile) if !profile.is_empty() => profile.to_string(),
                            _ => {
                                return Err(CredentialsError::provider_error(
                                    ImdsProfileError::EmptyProfile,
                                ))
                            }
                        }
                    }
                    Err(err) if is_not_found(&err) && api_version.is_none() => {
                        tracing::debug!("extended IMDS credentials API not available, using the legacy API");
                        self.state().api_version = Some(ApiVersion::Legacy);
                        continue;
                    }
                    Err(err) if is_not_found(&err) => {
                        tracing::info!("received 404 when loading profile name. This instance may not have an associated profile");
                        return Err(CredentialsError::provider_error(ImdsProfileError::Imds(err)));
                    }
                    Err(err) => {
                        return self.reuse_or(err, |err| {
                            CredentialsError::provider_error(ImdsProfileError::Imds(err))
                        })
                    }
                },
            };

            let payload = match client.get(&format!("{}{}", version.path(), profile)).await {
                Ok(payload) => payload,
                Err(err) if is_not_found(&err) && api_version.is_none() => {
                    tracing::debug!("extended IMDS credentials API not available, using the legacy API");
                    self.state().api_version = Some(ApiVersion::Legacy);
                    continue;
                }
                Err(err)
                    if is_not_found(&err) && self.profile.is_none() && !profile_rediscovered =>
                {
                    tracing::debug!(profile = %profile, "instance profile no longer exists, looking it up again");
                    self.state().resolved_profile = None;
                    profile_rediscovered = true;
                    continue;
                }
                Err(err) => {
                    return self.reuse_or(err, |err| {
                        CredentialsError::provider_error(ImdsCredentialsError::Credentials {
                            profile: profile.clone(),
                            source: err,
                        })
                    })
                }
            };

            let credentials = parse_credentials(&payload)?;
            tracing::debug!(profile = %profile, expiration = ?credentials.expiry(), "loaded credentials from IMDS");
            let mut state = self.state();
            state.api_version.get_or_insert(version);
            if self.profile.is_none() {
                state.resolved_profile = Some(profile);
            }
            state.last_retrieved = Some(credentials.clone());
            return Ok(credentials);
        }
    }

    /// Serve the last credentials when IMDS is briefly unavailable
    fn reuse_or(
        &self,
        err: ImdsError,
        map_err: impl FnOnce(ImdsError) -> CredentialsError,
    ) -> provider::Result {
        let transient = !matches!(err, ImdsError::Unexpected(_));
        match &self.state().last_retrieved {
            Some(previous) if transient => {
                tracing::info!(
                    err = %err,
                    expiration = ?previous.expiry(),
                    "attempting to reuse previously-fetched credentials"
                );
                Ok(previous.clone())
            }
            _ => Err(map_err(err)),
        }
    }
}

impl ProvideCredentials for ImdsCredentialsProvider {
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

fn is_not_found(err: &ImdsError) -> bool {
    err.status() == Some(StatusCode::NOT_FOUND)
}

fn parse_credentials(payload: &str) -> provider::Result {
    match parse_json_credentials(payload).map_err(CredentialsError::unhandled)? {
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
        JsonCredentials::Error { code, message } if code == CODE_ASSUME_ROLE_UNAUTHORIZED_ACCESS => {
            Err(CredentialsError::invalid_configuration(
                ImdsCredentialsError::Unauthorized {
                    code: code.into_owned(),
                    message: message.into_owned(),
                },
            ))
        }
        JsonCredentials::Error { code, message } => Err(CredentialsError::provider_error(
            ImdsCredentialsError::Service {
                code: code.into_owned(),
                message: message.into_owned(),
            },
        )),
    }
}

/// The instance profile name could not be loaded
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ImdsProfileError {
    /// IMDS failed to return the profile name
    Imds(ImdsError),
    /// IMDS returned a blank profile name
    EmptyProfile,
}

impl fmt::Display for ImdsProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImdsProfileError::Imds(_) => write!(f, "failed to load instance profile"),
            ImdsProfileError::EmptyProfile => write!(
                f,
                "failed to load instance profile: IMDS returned an empty profile name"
            ),
        }
    }
}

impl Error for ImdsProfileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImdsProfileError::Imds(err) => Some(err),
            ImdsProfileError::EmptyProfile => None,
        }
    }
}

/// Credentials for the instance profile could not be loaded
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ImdsCredentialsError {
    /// The credentials request failed
    Credentials {
        /// Name of the instance profile
        profile: String,
        /// Underlying IMDS failure
        source: ImdsError,
    },

    /// The instance role cannot be assumed by EC2
    Unauthorized {
        /// Error code returned by IMDS
        code: String,
        /// Error message returned by IMDS
        message: String,
    },

    /// IMDS returned an error document
    Service {
        /// Error code returned by IMDS
        code: String,
        /// Error message returned by IMDS
        message: String,
    },
}

impl fmt::Display for ImdsCredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImdsCredentialsError::Credentials { profile, .. } => write!(
                f,
                "Failed to load credentials for EC2 instance profile \"{}\"",
                profile
            ),
            ImdsCredentialsError::Unauthorized { code, message } => write!(
                f,
                "Incorrect IMDS/IAM configuration: [{}] {}. Hint: Does this role have a trust relationship with EC2?",
                code, message
            ),
            ImdsCredentialsError::Service { code, message } => write!(
                f,
                "Error retrieving credentials from IMDS: code={}; {}",
                code, message
            ),
        }
    }
}

impl Error for ImdsCredentialsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImdsCredentialsError::Credentials { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Builder for [`ImdsCredentialsProvider`]
#[derive(Default, Debug)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    profile: Option<String>,
    imds_override: Option<imds::Client>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, configuration: &ProviderConfig) -> Self {
        self.provider_config = Some(configuration.clone());
        self
    }

    /// Override the instance profile used for this provider.
    ///
    /// When retrieving IMDS credentials, a call must first be made to
    /// `<API_BASE>/latest/meta-data/iam/security-credentials-extended/`. This returns the
    /// instance profile used. By setting this parameter, retrieving the profile is skipped and
    /// the provided value is used instead.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Override the IMDS client used for this provider
    pub fn imds_client(mut self, client: imds::Client) -> Self {
        self.imds_override = Some(client);
        self
    }

    /// Create an [`ImdsCredentialsProvider`] from this builder
    pub fn build(self) -> ImdsCredentialsProvider {
        let config = self.provider_config.unwrap_or_default();
        let env = config.env();
        let client = match self.imds_override {
            Some(client) => Ok(client),
            None => imds::Client::builder()
                .configure(&config)
                .build()
                .map_err(CredentialsError::invalid_configuration),
        };
        ImdsCredentialsProvider {
            client,
            profile: self
                .profile
                .or_else(|| env.get_non_blank(env::EC2_INSTANCE_PROFILE_NAME)),
            env,
            time_source: config.time_source(),
            in_flight: ExpiringCache::new(Duration::ZERO),
            state: Mutex::new(State::default()),
        }
    }
}
