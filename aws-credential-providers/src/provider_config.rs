/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Configuration Options for Credential Providers

use crate::connector::DynConnector;
use crate::os_shim::{Env, Fs, SystemProperties};
use crate::profile::{LoadSharedConfig, SharedConfig, SharedConfigError, SharedConfigLoader};
use crate::region::Region;
use crate::sso::client::{HttpSsoClient, SharedSsoOidcClient, SharedSsoPortalClient};
use crate::sts::SharedStsClient;
use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep, TokioSleep};
use aws_smithy_async::time::{SharedTimeSource, SystemTimeSource, TimeSource};
use std::fmt;

/// Configuration options for Credential Providers
///
/// Most credential providers builders offer a `configure` method which applies general provider configuration
/// options.
///
/// Some providers (STS, SSO) call a regional endpoint. Set the region with
/// [`ProviderConfig::with_region`]; when unset, providers fall back to the profile's `region` key
/// and then to `AWS_REGION`.
#[derive(Clone)]
pub struct ProviderConfig {
    env: Env,
    fs: Fs,
    properties: SystemProperties,
    connector: Option<DynConnector>,
    sleep: SharedAsyncSleep,
    time_source: SharedTimeSource,
    shared_config: SharedConfigLoader,
    profile_name: Option<String>,
    region: Option<Region>,
    sts_client: Option<SharedStsClient>,
    sso_portal_client: Option<SharedSsoPortalClient>,
    sso_oidc_client: Option<SharedSsoOidcClient>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("env", &self.env)
            .field("fs", &self.fs)
            .field("properties", &self.properties)
            .field("connector", &self.connector.is_some())
            .field("sleep", &self.sleep)
            .field("time_source", &self.time_source)
            .field("shared_config", &self.shared_config)
            .field("profile_name", &self.profile_name)
            .field("region", &self.region)
            .field("sts_client", &self.sts_client)
            .field("sso_portal_client", &self.sso_portal_client)
            .field("sso_oidc_client", &self.sso_oidc_client)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::without_region()
    }
}

impl ProviderConfig {
    /// Create a default provider config with the region unset
    ///
    /// Uses the real environment, filesystem, clock and the default HTTPS connector. No profiles
    /// are loaded until a [`LoadSharedConfig`] implementation is set with
    /// [`ProviderConfig::with_shared_config`].
    ///
    /// # Example
    /// ```rust
    /// use aws_credential_providers::provider_config::ProviderConfig;
    /// use aws_credential_providers::region::Region;
    /// use aws_credential_providers::environment::EnvironmentVariableCredentialsProvider;
    /// let conf = ProviderConfig::without_region().with_region(Some(Region::new("us-east-1")));
    /// let credential_provider = EnvironmentVariableCredentialsProvider::builder()
    ///     .configure(&conf)
    ///     .build();
    /// ```
    pub fn without_region() -> Self {
        ProviderConfig {
            env: Env::default(),
            fs: Fs::default(),
            properties: SystemProperties::default(),
            connector: crate::connector::default_connector(),
            sleep: SharedAsyncSleep::new(TokioSleep::new()),
            time_source: SharedTimeSource::new(SystemTimeSource::new()),
            shared_config: SharedConfigLoader::default(),
            profile_name: None,
            region: None,
            sts_client: None,
            sso_portal_client: None,
            sso_oidc_client: None,
        }
    }

    /// A config with no real IO: empty environment and filesystem, no connector
    #[cfg(test)]
    pub(crate) fn no_configuration() -> Self {
        ProviderConfig {
            env: Env::from_slice(&[]),
            fs: Fs::from_slice(&[]),
            connector: None,
            ..Self::without_region()
        }
    }

    pub(crate) fn env(&self) -> Env {
        self.env.clone()
    }

    pub(crate) fn fs(&self) -> Fs {
        self.fs.clone()
    }

    pub(crate) fn properties(&self) -> SystemProperties {
        self.properties.clone()
    }

    pub(crate) fn connector(&self) -> Option<&DynConnector> {
        self.connector.as_ref()
    }

    pub(crate) fn sleep(&self) -> SharedAsyncSleep {
        self.sleep.clone()
    }

    pub(crate) fn time_source(&self) -> SharedTimeSource {
        self.time_source.clone()
    }

    pub(crate) fn region(&self) -> Option<Region> {
        self.region.clone()
    }

    pub(crate) fn sts_client(&self) -> Option<SharedStsClient> {
        self.sts_client.clone()
    }

    pub(crate) fn sso_portal_client(&self) -> SharedSsoPortalClient {
        self.sso_portal_client
            .clone()
            .unwrap_or_else(|| SharedSsoPortalClient::new(HttpSsoClient::new(self)))
    }

    pub(crate) fn sso_oidc_client(&self) -> SharedSsoOidcClient {
        self.sso_oidc_client
            .clone()
            .unwrap_or_else(|| SharedSsoOidcClient::new(HttpSsoClient::new(self)))
    }

    /// Load the shared config, selecting the configured profile override if one was set
    pub(crate) async fn shared_config(&self) -> Result<SharedConfig, SharedConfigError> {
        self.shared_config
            .load(&self.env, &self.fs, self.profile_name.as_deref())
            .await
    }

    /// Override the region for the configuration
    pub fn with_region(mut self, region: Option<Region>) -> Self {
        self.region = region;
        self
    }

    /// Override the filesystem for this configuration
    pub fn with_fs(self, fs: Fs) -> Self {
        ProviderConfig { fs, ..self }
    }

    /// Override the environment for this configuration
    pub fn with_env(self, env: Env) -> Self {
        ProviderConfig { env, ..self }
    }

    /// Override the system properties for this configuration
    pub fn with_properties(self, properties: SystemProperties) -> Self {
        ProviderConfig { properties, ..self }
    }

    /// Override the HTTPS connector for this configuration
    pub fn with_connector(self, connector: DynConnector) -> Self {
        ProviderConfig {
            connector: Some(connector),
            ..self
        }
    }

    /// Override the sleep implementation for this configuration
    pub fn with_sleep(self, sleep: impl AsyncSleep + 'static) -> Self {
        ProviderConfig {
            sleep: SharedAsyncSleep::new(sleep),
            ..self
        }
    }

    /// Override the time source for this configuration
    pub fn with_time_source(self, time_source: impl TimeSource + 'static) -> Self {
        ProviderConfig {
            time_source: SharedTimeSource::new(time_source),
            ..self
        }
    }

    /// Set the source of profiles for this configuration
    pub fn with_shared_config(self, loader: impl LoadSharedConfig + 'static) -> Self {
        ProviderConfig {
            shared_config: SharedConfigLoader::new(loader),
            ..self
        }
    }

    /// Load credentials from `profile_name` instead of `AWS_PROFILE` or `default`
    pub fn with_profile_name(self, profile_name: impl Into<String>) -> Self {
        ProviderConfig {
            profile_name: Some(profile_name.into()),
            ..self
        }
    }

    /// Set the STS client used by role assumption providers
    ///
    /// Without one, profiles that assume a role and the web identity provider fail with a
    /// configuration error.
    pub fn with_sts_client(self, sts_client: SharedStsClient) -> Self {
        ProviderConfig {
            sts_client: Some(sts_client),
            ..self
        }
    }

    /// Override the client used to exchange SSO tokens for role credentials
    ///
    /// By default, requests are sent to the regional SSO portal with this configuration's connector.
    pub fn with_sso_portal_client(self, client: SharedSsoPortalClient) -> Self {
        ProviderConfig {
            sso_portal_client: Some(client),
            ..self
        }
    }

    /// Override the client used to refresh cached SSO tokens
    pub fn with_sso_oidc_client(self, client: SharedSsoOidcClient) -> Self {
        ProviderConfig {
            sso_oidc_client: Some(client),
            ..self
        }
    }
}
