/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load Credentials from Web Identity Tokens
//!
//! Web identity tokens can be loaded from file. The path to the file can be set in several ways:
//! - `AWS_WEB_IDENTITY_TOKEN_FILE` or the `aws.webIdentityTokenFile` system property
//! - A profile with `web_identity_token_file` and `role_arn`
//! - Explicitly with [`Builder::static_configuration`]
//!
//! The role is taken from `AWS_ROLE_ARN` (or `aws.roleArn`) and the optional session name from
//! `AWS_ROLE_SESSION_NAME` (or `aws.roleSessionName`).
//!
//! ## Example
//! ```ini
//! [profile web-identity]
//! role_arn = arn:aws:iam::123456789012:role/s3-reader
//! web_identity_token_file = /token.jwt
//! ```

use crate::os_shim::{Env, Fs, SystemProperties};
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::sts::{
    default_session_name, AssumeRoleWithWebIdentityRequest, NoStsClient, SharedStsClient,
    StsClient, StsProviderError, DEFAULT_SESSION_DURATION,
};
use aws_smithy_async::time::SharedTimeSource;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::Instrument;

const PROVIDER_NAME: &str = "WebIdentityToken";

const ENV_TOKEN_FILE: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";
const ENV_ROLE_ARN: &str = "AWS_ROLE_ARN";
const ENV_SESSION_NAME: &str = "AWS_ROLE_SESSION_NAME";
const ENV_REGION: &str = "AWS_REGION";

const PROP_TOKEN_FILE: &str = "aws.webIdentityTokenFile";
const PROP_ROLE_ARN: &str = "aws.roleArn";
const PROP_SESSION_NAME: &str = "aws.roleSessionName";
const PROP_REGION: &str = "aws.region";

/// Credential provider to load credentials from Web Identity Tokens
///
/// See Module documentation for more details
#[derive(Debug)]
pub struct WebIdentityTokenCredentialsProvider {
    source: Source,
    fs: Fs,
    env: Env,
    properties: SystemProperties,
    sts: Option<SharedStsClient>,
    region: Option<Region>,
    time_source: SharedTimeSource,
}

impl WebIdentityTokenCredentialsProvider {
    /// Builder for this credentials provider
    pub fn builder() -> Builder {
        Builder::default()
    }
}

#[derive(Debug)]
enum Source {
    Env,
    Static(StaticConfiguration),
}

/// Statically configured WebIdentityToken configuration
#[derive(Debug, Clone)]
pub struct StaticConfiguration {
    /// Location of the file containing the web identity token
    pub web_identity_token_file: PathBuf,

    /// RoleArn to assume
    pub role_arn: String,

    /// Session name to use when assuming the role
    ///
    /// When unset, a session name is generated.
    pub session_name: Option<String>,
}

impl ProvideCredentials for WebIdentityTokenCredentialsProvider {
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

impl WebIdentityTokenCredentialsProvider {
    fn setting(&self, env_var: &str, property: &str) -> Option<String> {
        self.env.get_non_blank(env_var).or_else(|| {
            self.properties
                .get(property)
                .filter(|value| !value.trim().is_empty())
                .map(ToString::to_string)
        })
    }

    fn source(&self) -> Result<StaticConfiguration, CredentialsError> {
        match &self.source {
            Source::Static(conf) => Ok(conf.clone()),
            Source::Env => {
                let token_file = self.setting(ENV_TOKEN_FILE, PROP_TOKEN_FILE).ok_or_else(|| {
                    CredentialsError::not_loaded("$AWS_WEB_IDENTITY_TOKEN_FILE was not set")
                })?;
                let role_arn = self.setting(ENV_ROLE_ARN, PROP_ROLE_ARN).ok_or_else(|| {
                    CredentialsError::invalid_configuration(MissingSetting {
                        name: "roleArn",
                        env_var: ENV_ROLE_ARN,
                        property: PROP_ROLE_ARN,
                    })
                })?;
                Ok(StaticConfiguration {
                    web_identity_token_file: token_file.into(),
                    role_arn,
                    session_name: self.setting(ENV_SESSION_NAME, PROP_SESSION_NAME),
                })
            }
        }
    }

    fn region(&self) -> Option<Region> {
        self.region.clone().or_else(|| {
            self.setting(ENV_REGION, PROP_REGION)
                .map(Region::new)
        })
    }

    async fn credentials(&self) -> provider::Result {
        let conf = self.source()?;
        let sts = self
            .sts
            .as_ref()
            .ok_or_else(|| CredentialsError::invalid_configuration(NoStsClient))?;
        let token = read_token(&self.fs, &conf.web_identity_token_file).await?;
        let request = AssumeRoleWithWebIdentityRequest {
            role_arn: conf.role_arn.clone(),
            role_session_name: conf
                .session_name
                .unwrap_or_else(|| default_session_name(&self.env, &self.time_source)),
            web_identity_token: token,
            duration: DEFAULT_SESSION_DURATION,
            provider_id: None,
            policy: None,
            policy_arns: Vec::new(),
        };
        tracing::debug!(role_arn = %conf.role_arn, "retrieving assumed credentials via web identity");
        let response = sts
            .assume_role_with_web_identity(self.region(), request)
            .await
            .map_err(|err| {
                tracing::debug!(err = %err, "STS refused to grant assumed role credentials from web identity");
                CredentialsError::provider_error(StsProviderError {
                    message: "STS failed to assume role from web identity",
                    source: err,
                })
            })?;
        let credentials = response.into_credentials(PROVIDER_NAME);
        tracing::debug!(expiration = ?credentials.expiry(), "obtained assumed credentials via web identity");
        Ok(credentials)
    }
}

pub(crate) async fn read_token(fs: &Fs, path: &Path) -> Result<String, CredentialsError> {
    let unreadable = |source: std::io::Error| {
        tracing::warn!(path = %path.display(), err = %source, "could not read web identity token");
        CredentialsError::provider_error(TokenFileError {
            path: path.to_path_buf(),
            source,
        })
    };
    let contents = fs.read_to_end(path).await.map_err(unreadable)?;
    String::from_utf8(contents).map_err(|err| {
        unreadable(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })
}

/// The web identity token file could not be read
#[derive(Debug)]
struct TokenFileError {
    path: PathBuf,
    source: std::io::Error,
}

impl fmt::Display for TokenFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to read webIdentityToken from {}",
            self.path.display()
        )
    }
}

impl Error for TokenFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug)]
struct MissingSetting {
    name: &'static str,
    env_var: &'static str,
    property: &'static str,
}

impl fmt::Display for MissingSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Required field `{}` could not be automatically inferred for StsWebIdentityCredentialsProvider. \
             Either explicitly pass a value, set the environment variable `{}`, or set the JVM system property `{}`",
            self.name, self.env_var, self.property
        )
    }
}

impl Error for MissingSetting {}

/// Builder for [`WebIdentityTokenCredentialsProvider`].
#[derive(Default, Debug)]
pub struct Builder {
    source: Option<StaticConfiguration>,
    config: Option<ProviderConfig>,
}

impl Builder {
    /// Configure generic options of the [`WebIdentityTokenCredentialsProvider`]
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.config = Some(provider_config.clone());
        self
    }

    /// Configure this builder to use [`StaticConfiguration`].
    ///
    /// WebIdentityToken providers load credentials from the file system. The file system path used
    /// may either determined be loaded from environment variables (default), or via a statically
    /// configured path.
    pub fn static_configuration(mut self, config: StaticConfiguration) -> Self {
        self.source = Some(config);
        self
    }

    /// Build a [`WebIdentityTokenCredentialsProvider`]
    pub fn build(self) -> WebIdentityTokenCredentialsProvider {
        let conf = self.config.unwrap_or_default();
        WebIdentityTokenCredentialsProvider {
            source: self.source.map(Source::Static).unwrap_or(Source::Env),
            fs: conf.fs(),
            env: conf.env(),
            properties: conf.properties(),
            sts: conf.sts_client(),
            region: conf.region(),
            time_source: conf.time_source(),
        }
    }
}
