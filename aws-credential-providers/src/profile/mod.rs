/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials from the shared config
//!
//! Profiles reach this crate already parsed: a [`LoadSharedConfig`] implementation turns the
//! `~/.aws/config` and `~/.aws/credentials` files (or any other source) into a [`SharedConfig`].
//! [`StaticSharedConfig`] is an in-memory implementation, useful in tests and for applications
//! that manage profiles themselves.
//!
//! The [`ProfileFileCredentialsProvider`](credentials::ProfileFileCredentialsProvider) walks the
//! selected profile and its `source_profile` links to decide where credentials come from.
//! [`ProfileFileTokenProvider`](token::ProfileFileTokenProvider) loads the bearer token of the
//! selected profile's `sso-session`.

use crate::os_shim::{Env, Fs};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub mod credentials;
pub mod token;

pub use credentials::ProfileFileCredentialsProvider;
pub use token::ProfileFileTokenProvider;

const DEFAULT_PROFILE: &str = "default";

/// A named set of key/value properties
///
/// Used for both `[profile NAME]` and `[sso-session NAME]` sections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    name: String,
    properties: HashMap<String, String>,
}

impl Profile {
    /// Create a new profile
    pub fn new(name: impl Into<String>, properties: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Create a profile from a list of key/value pairs
    pub fn from_slice(name: impl Into<String>, properties: &[(&str, &str)]) -> Self {
        Self::new(
            name,
            properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// The name of this profile
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of `key`, if set
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|value| value.as_str())
    }

    /// Returns true if `key` is set on this profile
    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}

/// Parsed shared configuration
///
/// Holds every profile and SSO session plus the name of the profile that credentials should be
/// loaded from.
#[derive(Clone, Debug, Default)]
pub struct SharedConfig {
    profiles: HashMap<String, Profile>,
    sso_sessions: HashMap<String, Profile>,
    selected_profile: Option<String>,
}

impl SharedConfig {
    /// Create a `SharedConfig` from a set of profiles and SSO sessions
    pub fn new(
        profiles: impl IntoIterator<Item = Profile>,
        sso_sessions: impl IntoIterator<Item = Profile>,
    ) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.name.clone(), profile))
                .collect(),
            sso_sessions: sso_sessions
                .into_iter()
                .map(|session| (session.name.clone(), session))
                .collect(),
            selected_profile: None,
        }
    }

    /// Select the profile credentials are loaded from
    pub fn with_selected_profile(mut self, name: impl Into<String>) -> Self {
        self.selected_profile = Some(name.into());
        self
    }

    /// The selected profile, `default` unless another profile was selected
    pub fn selected_profile(&self) -> &str {
        self.selected_profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }

    /// Returns the profile named `name`
    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Returns the SSO session named `name`
    pub fn sso_session(&self, name: &str) -> Option<&Profile> {
        self.sso_sessions.get(name)
    }

    /// Returns the selected profile
    pub fn active_profile(&self) -> Option<&Profile> {
        self.get_profile(self.selected_profile())
    }

    /// Returns true if no profiles are defined at all
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Failure to load the shared config
#[derive(Debug)]
pub struct SharedConfigError {
    source: Box<dyn Error + Send + Sync + 'static>,
}

impl SharedConfigError {
    /// Wrap the error returned by a [`LoadSharedConfig`] implementation
    pub fn new(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl fmt::Display for SharedConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load shared config: {}", self.source)
    }
}

impl Error for SharedConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Future returned by [`LoadSharedConfig::load`]
pub type LoadFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SharedConfig, SharedConfigError>> + Send + 'a>>;

/// Source of parsed shared configuration
///
/// Implementations receive the environment and filesystem so that they can honor overrides such
/// as `AWS_CONFIG_FILE` and `HOME`.
pub trait LoadSharedConfig: Send + Sync + fmt::Debug {
    /// Load the shared config
    fn load<'a>(&'a self, env: &'a Env, fs: &'a Fs) -> LoadFuture<'a>;
}

/// In-memory shared config
#[derive(Clone, Debug, Default)]
pub struct StaticSharedConfig(SharedConfig);

impl StaticSharedConfig {
    /// Create a loader that always returns `config`
    pub fn new(config: SharedConfig) -> Self {
        Self(config)
    }
}

impl LoadSharedConfig for StaticSharedConfig {
    fn load<'a>(&'a self, _env: &'a Env, _fs: &'a Fs) -> LoadFuture<'a> {
        let config = self.0.clone();
        Box::pin(async move { Ok(config) })
    }
}

/// Shared handle to a [`LoadSharedConfig`] implementation
#[derive(Clone, Debug)]
pub struct SharedConfigLoader(Arc<dyn LoadSharedConfig>);

impl SharedConfigLoader {
    /// Wrap `loader`
    pub fn new(loader: impl LoadSharedConfig + 'static) -> Self {
        Self(Arc::new(loader))
    }

    /// Load the shared config and select the active profile
    ///
    /// The profile is chosen from `profile_override`, then `AWS_PROFILE`, then `default`.
    pub(crate) async fn load(
        &self,
        env: &Env,
        fs: &Fs,
        profile_override: Option<&str>,
    ) -> Result<SharedConfig, SharedConfigError> {
        let config = self.0.load(env, fs).await?;
        let selected = match profile_override {
            Some(name) => Some(name.to_string()),
            None => env.get_non_blank("AWS_PROFILE"),
        };
        Ok(match selected {
            Some(name) => config.with_selected_profile(name),
            None => config,
        })
    }
}

impl Default for SharedConfigLoader {
    fn default() -> Self {
        Self::new(StaticSharedConfig::default())
    }
}

#[cfg(test)]
mod test {
    use super::{Profile, SharedConfig, SharedConfigLoader, StaticSharedConfig};
    use crate::os_shim::{Env, Fs};

    fn config() -> SharedConfig {
        SharedConfig::new(
            vec![
                Profile::from_slice("default", &[("region", "us-east-1")]),
                Profile::from_slice("dev", &[("region", "us-west-2")]),
            ],
            vec![],
        )
    }

    #[tokio::test]
    async fn profile_selection() {
        let loader = SharedConfigLoader::new(StaticSharedConfig::new(config()));
        let fs = Fs::from_slice(&[]);

        let loaded = loader.load(&Env::from_slice(&[]), &fs, None).await.unwrap();
        assert_eq!("default", loaded.selected_profile());

        let env = Env::from_slice(&[("AWS_PROFILE", "dev")]);
        let loaded = loader.load(&env, &fs, None).await.unwrap();
        assert_eq!(
            Some("us-west-2"),
            loaded.active_profile().and_then(|p| p.get("region"))
        );

        let loaded = loader.load(&env, &fs, Some("other")).await.unwrap();
        assert_eq!("other", loaded.selected_profile());
        assert!(loaded.active_profile().is_none());
    }

    #[tokio::test]
    async fn default_loader_is_empty() {
        let loaded = SharedConfigLoader::default()
            .load(&Env::from_slice(&[]), &Fs::from_slice(&[]), None)
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }
}
