/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::borrow::Cow;
use std::time::Duration;

use crate::ecs::EcsCredentialsProvider;
use crate::environment::EnvironmentVariableCredentialsProvider;
use crate::imds::ImdsCredentialsProvider;
use crate::meta::credentials::lazy_caching::{self, LazyCachingCredentialsProvider};
use crate::meta::credentials::CredentialsProviderChain;
use crate::profile;
use crate::provider::credentials::{future, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::system_properties::SystemPropertyCredentialsProvider;
use crate::web_identity_token::{self, WebIdentityTokenCredentialsProvider};
use crate::Credentials;

const CHAIN_NAME: &str = "DefaultChain";

/// Default AWS credentials provider chain
///
/// Resolution order:
/// 1. Static credentials passed to [`Builder::static_credentials`], when set
/// 2. Environment variables: [`EnvironmentVariableCredentialsProvider`]
/// 3. System properties: [`SystemPropertyCredentialsProvider`]
/// 4. Web identity token from the environment: [`WebIdentityTokenCredentialsProvider`]
/// 5. Shared config profiles: [`ProfileFileCredentialsProvider`](crate::profile::ProfileFileCredentialsProvider)
/// 6. ECS container metadata: [`EcsCredentialsProvider`]
/// 7. EC2 instance metadata: [`ImdsCredentialsProvider`]
///
/// The whole chain is wrapped in a [`LazyCachingCredentialsProvider`].
///
/// # Examples
/// Create a default chain with a custom region:
/// ```rust
/// use aws_credential_providers::default_provider::credentials::DefaultCredentialsChain;
/// use aws_credential_providers::region::Region;
/// let credentials_provider = DefaultCredentialsChain::builder()
///     .region(Region::new("us-west-1"))
///     .build();
/// ```
///
/// Create a default chain with no overrides:
/// ```rust
/// let credentials_provider = aws_credential_providers::default_provider::default_provider();
/// ```
#[derive(Debug)]
pub struct DefaultCredentialsChain {
    provider_chain: LazyCachingCredentialsProvider,
}

/// Build a fresh [`DefaultCredentialsChain`] reading from the real environment
pub fn default_provider() -> DefaultCredentialsChain {
    DefaultCredentialsChain::builder().build()
}

impl DefaultCredentialsChain {
    /// Builder for the default credentials chain
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn credentials(&self) -> crate::provider::credentials::Result {
        self.provider_chain.provide_credentials().await
    }
}

impl ProvideCredentials for DefaultCredentialsChain {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.credentials())
    }
}

/// Builder for [`DefaultCredentialsChain`]
#[derive(Debug, Default)]
pub struct Builder {
    profile_file_builder: profile::credentials::Builder,
    web_identity_builder: web_identity_token::Builder,
    credential_cache: lazy_caching::builder::Builder,
    static_credentials: Option<Credentials>,
    region: Option<Region>,
    conf: Option<ProviderConfig>,
}

impl Builder {
    /// Set the region used when making requests to AWS services (eg. STS) as part of the provider chain
    ///
    /// When unset, the region comes from the active profile or `AWS_REGION`.
    pub fn region(mut self, region: impl Into<Option<Region>>) -> Self {
        self.region = region.into();
        self
    }

    /// Credentials consulted before every other provider
    ///
    /// When set, no other provider in the chain is ever called.
    pub fn static_credentials(mut self, credentials: Credentials) -> Self {
        self.static_credentials = Some(credentials);
        self
    }

    /// Add an additional credential source for the profile provider
    ///
    /// Assume role profiles may specify named credential sources:
    /// ```ini
    /// [default]
    /// role_arn = arn:aws:iam::123456789:role/RoleA
    /// credential_source = MyCustomProvider
    /// ```
    ///
    /// Typically, these are built-in providers like `Environment`. Custom sources must be
    /// registered:
    /// ```rust
    /// use aws_credential_providers::default_provider::credentials::DefaultCredentialsChain;
    /// use aws_credential_providers::Credentials;
    /// let provider_chain = DefaultCredentialsChain::builder()
    ///     .with_custom_credential_source(
    ///         "MyCustomProvider",
    ///         Credentials::from_keys("akid", "secret", None),
    ///     )
    ///     .build();
    /// ```
    pub fn with_custom_credential_source(
        mut self,
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        self.profile_file_builder = self
            .profile_file_builder
            .with_custom_provider(name, provider);
        self
    }

    /// Override the profile name used by this provider
    ///
    /// When unset, `AWS_PROFILE` is used, falling back to `default`.
    pub fn profile_name(mut self, name: &str) -> Self {
        self.profile_file_builder = self.profile_file_builder.profile_name(name);
        self
    }

    /// Timeout for the entire credential loading chain.
    ///
    /// Defaults to 5 seconds.
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.credential_cache = self.credential_cache.load_timeout(timeout);
        self
    }

    /// Amount of time before the actual credential expiration time where credentials are
    /// considered expired.
    ///
    /// Defaults to 10 seconds.
    pub fn buffer_time(mut self, buffer_time: Duration) -> Self {
        self.credential_cache = self.credential_cache.buffer_time(buffer_time);
        self
    }

    /// Override the configuration used for this provider
    ///
    /// The environment, filesystem, connector, clock and clients of `configuration` are shared by
    /// every provider in the chain.
    pub fn configure(mut self, configuration: &ProviderConfig) -> Self {
        self.conf = Some(configuration.clone());
        self
    }

    /// Creates a [`DefaultCredentialsChain`]
    pub fn build(self) -> DefaultCredentialsChain {
        let conf = self.conf.unwrap_or_default();
        let conf = match self.region {
            Some(region) => conf.with_region(Some(region)),
            None => conf,
        };

        let env_provider = EnvironmentVariableCredentialsProvider::builder()
            .configure(&conf)
            .build();
        let properties_provider = SystemPropertyCredentialsProvider::builder()
            .configure(&conf)
            .build();
        let web_identity_provider = self.web_identity_builder.configure(&conf).build();
        let profile_provider = self.profile_file_builder.configure(&conf).build();
        let ecs_provider = EcsCredentialsProvider::builder().configure(&conf).build();
        let imds_provider = ImdsCredentialsProvider::builder().configure(&conf).build();

        let chain = match self.static_credentials {
            Some(credentials) => CredentialsProviderChain::first_try("Static", credentials)
                .or_else("Environment", env_provider),
            None => CredentialsProviderChain::first_try("Environment", env_provider),
        };
        let chain = chain
            .or_else("SystemProperties", properties_provider)
            .or_else("WebIdentityToken", web_identity_provider)
            .or_else("Profile", profile_provider)
            .or_else("EcsContainer", ecs_provider)
            .or_else("Ec2InstanceMetadata", imds_provider)
            .with_name(CHAIN_NAME);

        DefaultCredentialsChain {
            provider_chain: self.credential_cache.configure(&conf).build(chain),
        }
    }
}
