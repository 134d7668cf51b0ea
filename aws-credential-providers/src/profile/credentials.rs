/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Profile File Based Providers
//!
//! Profile file based providers combine two pieces:
//!
//! 1. Resolution of the assume role chain
//! 2. A user-modifiable hashmap of provider name to provider.
//!
//! Profile file based providers first determine the chain of providers that will be used to load
//! credentials. After determining and validating this chain, a `Vec` of providers will be created.
//!
//! Each subsequent provider will provide bootstrap credentials to the next provider in order to load
//! the final credentials.
//!
//! This module contains two sub modules:
//! - `repr` which contains an abstract representation of a provider chain and the logic to
//! build it from the shared config.
//! - `exec` which contains a chain representation of providers to implement passing bootstrapped credentials
//! through a series of providers.

use crate::ecs::EcsCredentialsProvider;
use crate::environment::EnvironmentVariableCredentialsProvider;
use crate::imds::ImdsCredentialsProvider;
use crate::profile::credentials::exec::named::NamedProviderFactory;
use crate::profile::credentials::exec::ProviderChain;
use crate::profile::SharedConfigError;
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

mod exec;
mod repr;

const PROVIDER_NAME: &str = "Profile";
const REGION_KEY: &str = "region";
const ENV_REGION: &str = "AWS_REGION";

impl ProvideCredentials for ProfileFileCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.load_credentials().instrument(tracing::info_span!(
            "load_credentials",
            provider = PROVIDER_NAME
        )))
    }
}

/// AWS Profile based credentials provider
///
/// This credentials provider will load credentials from the shared config supplied by the
/// [`LoadSharedConfig`](crate::profile::LoadSharedConfig) implementation of the
/// [`ProviderConfig`].
///
/// Generally, this will be constructed via the default provider chain, however, it can be manually
/// constructed with the builder:
/// ```rust,no_run
/// use aws_credential_providers::profile::ProfileFileCredentialsProvider;
/// let provider = ProfileFileCredentialsProvider::builder().build();
/// ```
///
/// **Note:** Profile providers do not implement any caching. They will reload the shared config
/// when called. See [`LazyCachingCredentialsProvider`](crate::meta::credentials::LazyCachingCredentialsProvider)
/// for caching.
///
/// This provider supports several different credentials formats:
/// ### Credentials defined explicitly within the file
/// ```ini
/// [default]
/// aws_access_key_id = 123
/// aws_secret_access_key = 456
/// ```
///
/// ### Assume Role Credentials loaded from a credential source
/// ```ini
/// [default]
/// role_arn = arn:aws:iam::123456789:role/RoleA
/// credential_source = Environment
/// ```
///
/// `Environment`, `Ec2InstanceMetadata` and `EcsContainer` are built in. It is possible to
/// provide custom sources:
/// ```rust
/// use aws_credential_providers::provider::credentials::{self, future, ProvideCredentials};
/// use aws_credential_providers::profile::ProfileFileCredentialsProvider;
/// #[derive(Debug)]
/// struct MyCustomProvider;
/// impl MyCustomProvider {
///     async fn load_credentials(&self) -> credentials::Result {
///         todo!()
///     }
/// }
///
/// impl ProvideCredentials for MyCustomProvider {
///   fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials where Self: 'a {
///         future::ProvideCredentials::new(self.load_credentials())
///     }
/// }
/// let provider = ProfileFileCredentialsProvider::builder()
///     .with_custom_provider("Custom", MyCustomProvider)
///     .build();
/// ```
///
/// ### Assume role credentials from a source profile
/// ```ini
/// [default]
/// role_arn = arn:aws:iam::123456789:role/RoleA
/// source_profile = base
///
/// [profile base]
/// aws_access_key_id = 123
/// aws_secret_access_key = 456
/// ```
///
/// Web identity tokens, SSO (legacy and `sso-session`) and `credential_process` profiles are
/// supported as well.
#[derive(Debug)]
pub struct ProfileFileCredentialsProvider {
    factory: NamedProviderFactory,
    provider_config: ProviderConfig,
    region: Option<Region>,
}

impl ProfileFileCredentialsProvider {
    /// Builder for this credentials provider
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn load_credentials(&self) -> provider::Result {
        let inner_provider = build_provider_chain(&self.provider_config, self.region.as_ref(), &self.factory)
            .await
            .map_err(|err| match err {
                ProfileFileError::NoProfilesDefined => CredentialsError::not_loaded(err),
                _ => CredentialsError::invalid_configuration(err),
            })?;
        let mut creds = match inner_provider
            .base()
            .provide_credentials()
            .instrument(tracing::info_span!("load_base_credentials"))
            .await
        {
            Ok(creds) => {
                tracing::info!(creds = ?creds, "loaded base credentials");
                creds
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load base credentials");
                return Err(e);
            }
        };
        for provider in inner_provider.chain().iter() {
            let next_creds = provider
                .assume_role(creds)
                .instrument(tracing::info_span!("load_assume_role", provider = ?provider))
                .await;
            match next_creds {
                Ok(next_creds) => {
                    tracing::info!(creds = ?next_creds, "loaded assume role credentials");
                    creds = next_creds
                }
                Err(e) => {
                    tracing::warn!(provider = ?provider, "failed to load assume role credentials");
                    return Err(e);
                }
            }
        }
        Ok(creds)
    }
}

/// Which kind of section a missing key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Section {
    /// `[profile NAME]`
    Profile,
    /// `[sso-session NAME]`
    SsoSession,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Profile => write!(f, "profile"),
            Section::SsoSession => write!(f, "sso-session"),
        }
    }
}

/// An Error building a Credential source from an AWS Profile
#[derive(Debug)]
#[non_exhaustive]
pub enum ProfileFileError {
    /// The shared config could not be loaded
    CouldNotLoadConfig(SharedConfigError),

    /// The shared config did not define any profiles
    NoProfilesDefined,

    /// The profile was not a valid source profile
    ///
    /// Following `source_profile` links led back to a profile that was already visited.
    CredentialLoop {
        /// Vec of profiles leading to the loop
        profiles: Vec<String>,
        /// The next profile that caused the loop
        next: String,
    },

    /// A profile set `role_arn` but neither `source_profile` nor `credential_source`
    MissingCredentialSource {
        /// The profile name containing the error
        profile: String,
    },

    /// A profile set both `source_profile` and `credential_source`
    ConflictingCredentialSource {
        /// The profile name containing the error
        profile: String,
    },

    /// A profile had no keys that could produce credentials
    ProfileDidNotContainCredentials {
        /// The profile name containing the error
        profile: String,
    },

    /// The profile or SSO session was missing a required key
    MissingField {
        /// Kind of section
        section: Section,
        /// Name of the section
        name: String,
        /// The missing key
        field: &'static str,
    },

    /// The active profile or a referenced `source_profile` did not exist
    MissingProfile {
        /// The name of the missing profile
        profile: String,
        /// The profile that referenced it, unless it was the active profile
        referenced_from: Option<String>,
    },

    /// A profile referenced an `sso_session` that was not defined
    MissingSsoSession {
        /// The profile name containing the error
        profile: String,
        /// The name of the missing session
        sso_session: String,
    },

    /// The profile and its `sso-session` disagree on a setting
    SsoSessionMismatch {
        /// The profile name
        profile: String,
        /// The session name
        sso_session: String,
        /// The conflicting key, `sso_region` or `sso_start_url`
        key: &'static str,
        /// Value in the `sso-session` section
        session_value: String,
        /// Value in the profile
        profile_value: String,
    },

    /// The profile does not reference an `sso_session`, so no bearer token can be loaded
    NoTokenProvider {
        /// The profile name
        profile: String,
    },

    /// `credential_source` named a provider that is not registered
    UnknownCredentialSource {
        /// The name of the provider
        name: String,
    },
}

impl fmt::Display for ProfileFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileFileError::CouldNotLoadConfig(_) => write!(f, "could not load the shared config"),
            ProfileFileError::NoProfilesDefined => write!(f, "No profiles were defined"),
            ProfileFileError::CredentialLoop { profiles, next } => {
                write!(f, "profile formed an infinite loop: ")?;
                for profile in profiles {
                    write!(f, "{} -> ", profile)?;
                }
                write!(f, "{}", next)
            }
            ProfileFileError::MissingCredentialSource { profile } => write!(
                f,
                "profile ({}) must contain `source_profile` or `credential_source` but neither were defined",
                profile
            ),
            ProfileFileError::ConflictingCredentialSource { profile } => write!(
                f,
                "profile ({}) contained both `source_profile` and `credential_source`. \
                 Only one or the other can be defined.",
                profile
            ),
            ProfileFileError::ProfileDidNotContainCredentials { profile } => write!(
                f,
                "profile ({}) did not contain credential information",
                profile
            ),
            ProfileFileError::MissingField {
                section,
                name,
                field,
            } => write!(f, "{} ({}) missing `{}`", section, name, field),
            ProfileFileError::MissingProfile {
                profile,
                referenced_from,
            } => match referenced_from {
                Some(from) => write!(
                    f,
                    "could not find source profile {} referenced from {}",
                    profile, from
                ),
                None => write!(f, "could not find source profile {}", profile),
            },
            ProfileFileError::MissingSsoSession {
                profile,
                sso_session,
            } => write!(
                f,
                "profile ({}) references non-existing sso_session = `{}`",
                profile, sso_session
            ),
            ProfileFileError::SsoSessionMismatch {
                profile,
                sso_session,
                key,
                session_value,
                profile_value,
            } => write!(
                f,
                "sso-session ({}) {} = `{}` does not match profile ({}) {} = `{}`",
                sso_session, key, session_value, profile, key, profile_value
            ),
            ProfileFileError::NoTokenProvider { profile } => write!(
                f,
                "no bearer token providers available for profile `{}`",
                profile
            ),
            ProfileFileError::UnknownCredentialSource { name } => {
                write!(f, "unknown credentials source: {}", name)
            }
        }
    }
}

impl Error for ProfileFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProfileFileError::CouldNotLoadConfig(err) => Some(err),
            _ => None,
        }
    }
}

/// Builder for [`ProfileFileCredentialsProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    profile_override: Option<String>,
    region: Option<Region>,
    custom_providers: HashMap<Cow<'static, str>, Arc<dyn ProvideCredentials>>,
}

impl Builder {
    /// Override the configuration for the [`ProfileFileCredentialsProvider`]
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.provider_config = Some(config.clone());
        self
    }

    /// Adds a custom credential source
    ///
    /// A profile selects it with `credential_source = <name>`. A custom provider registered
    /// under a built-in name replaces the built-in one.
    pub fn with_custom_provider(
        mut self,
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        self.custom_providers
            .insert(name.into(), Arc::new(provider));
        self
    }

    /// Override the profile name used by the [`ProfileFileCredentialsProvider`]
    pub fn profile_name(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_override = Some(profile_name.into());
        self
    }

    /// Set the region used to assume roles
    ///
    /// When unset, the region of the [`ProviderConfig`] is used, then the `region` key of the
    /// active profile, then `AWS_REGION`.
    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Builds a [`ProfileFileCredentialsProvider`]
    pub fn build(self) -> ProfileFileCredentialsProvider {
        let build_span = tracing::debug_span!("build_profile_provider");
        let _enter = build_span.enter();
        let conf = self.provider_config.unwrap_or_default();
        let conf = match self.profile_override {
            Some(profile_name) => conf.with_profile_name(profile_name),
            None => conf,
        };
        let mut named_providers = self.custom_providers;
        named_providers
            .entry("Environment".into())
            .or_insert_with(|| {
                shared(
                    EnvironmentVariableCredentialsProvider::builder()
                        .configure(&conf)
                        .build(),
                )
            });
        named_providers
            .entry("Ec2InstanceMetadata".into())
            .or_insert_with(|| shared(ImdsCredentialsProvider::builder().configure(&conf).build()));
        named_providers
            .entry("EcsContainer".into())
            .or_insert_with(|| shared(EcsCredentialsProvider::builder().configure(&conf).build()));
        let factory = NamedProviderFactory::new(named_providers);
        ProfileFileCredentialsProvider {
            factory,
            region: self.region.or_else(|| conf.region()),
            provider_config: conf,
        }
    }
}

fn shared(provider: impl ProvideCredentials + 'static) -> Arc<dyn ProvideCredentials> {
    Arc::new(provider)
}

async fn build_provider_chain(
    provider_config: &ProviderConfig,
    region: Option<&Region>,
    factory: &NamedProviderFactory,
) -> Result<ProviderChain, ProfileFileError> {
    let shared_config = provider_config.shared_config().await.map_err(|err| {
        tracing::warn!(err = %err, "failed to load shared config");
        ProfileFileError::CouldNotLoadConfig(err)
    })?;
    tracing::debug!(profile = %shared_config.selected_profile(), "loading credentials from profile");
    let repr = repr::resolve_chain(&shared_config)?;
    tracing::info!(chain = ?repr, "constructed abstract provider from config file");
    let region = region.cloned().or_else(|| {
        shared_config
            .active_profile()
            .and_then(|profile| profile.get(REGION_KEY))
            .map(|region| Region::new(region.to_string()))
            .or_else(|| provider_config.env().get_non_blank(ENV_REGION).map(Region::new))
    });
    ProviderChain::from_repr(provider_config, region, repr, factory)
}
