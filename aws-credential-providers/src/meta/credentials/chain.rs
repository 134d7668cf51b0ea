/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::provider::credentials::{self, future, CredentialsError, ProvideCredentials};
use aws_smithy_types::error::display::DisplayErrorContext;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use tracing::Instrument;

const DEFAULT_CHAIN_NAME: &str = "ProviderChain";

/// Credentials provider that checks a series of inner providers
///
/// Each provider will be checked in turn. The first provider that returns a successful credential
/// will be used.
///
/// If no provider succeeds, the chain returns a single error carrying a [`ProviderChainError`]
/// with the failure of every provider, in order. When every provider reported
/// [`CredentialsNotLoaded`](CredentialsError::CredentialsNotLoaded), the chain's error is also
/// `CredentialsNotLoaded` so that a chain nested inside another chain falls through.
///
/// ## Example
/// ```rust
/// use aws_credential_providers::meta::credentials::CredentialsProviderChain;
/// use aws_credential_providers::environment::credentials::EnvironmentVariableCredentialsProvider;
/// use aws_credential_providers::Credentials;
/// let provider = CredentialsProviderChain::first_try("Environment", EnvironmentVariableCredentialsProvider::new())
///     .or_else("Static", Credentials::from_keys("someacceskeyid", "somesecret", None));
/// ```
pub struct CredentialsProviderChain {
    name: Cow<'static, str>,
    providers: Vec<(Cow<'static, str>, Box<dyn ProvideCredentials>)>,
}

impl fmt::Debug for CredentialsProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsProviderChain")
            .field("name", &self.name)
            .field(
                "providers",
                &self
                    .providers
                    .iter()
                    .map(|provider| &provider.0)
                    .collect::<Vec<&Cow<'static, str>>>(),
            )
            .finish()
    }
}

impl CredentialsProviderChain {
    /// Create a `CredentialsProviderChain` that begins by evaluating this provider
    pub fn first_try(
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        CredentialsProviderChain {
            name: Cow::Borrowed(DEFAULT_CHAIN_NAME),
            providers: vec![(name.into(), Box::new(provider))],
        }
    }

    /// Create a chain from a list of named providers
    ///
    /// Returns an error if `providers` is empty.
    pub fn from_providers(
        providers: impl IntoIterator<Item = (Cow<'static, str>, Box<dyn ProvideCredentials>)>,
    ) -> Result<Self, EmptyChainError> {
        let providers: Vec<_> = providers.into_iter().collect();
        if providers.is_empty() {
            return Err(EmptyChainError);
        }
        Ok(CredentialsProviderChain {
            name: Cow::Borrowed(DEFAULT_CHAIN_NAME),
            providers,
        })
    }

    /// Add a fallback provider to the credentials provider chain
    pub fn or_else(
        mut self,
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        self.providers.push((name.into(), Box::new(provider)));
        self
    }

    /// Set the name of this chain, used at the start of the error message when no provider succeeds
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    async fn credentials(&self) -> credentials::Result {
        let mut errors = Vec::with_capacity(self.providers.len());
        for (name, provider) in &self.providers {
            let span = tracing::debug_span!("load_credentials", provider = %name);
            match provider.provide_credentials().instrument(span).await {
                Ok(credentials) => {
                    tracing::info!(provider = %name, "loaded credentials");
                    return Ok(credentials);
                }
                Err(err @ CredentialsError::CredentialsNotLoaded(_)) => {
                    tracing::info!(provider = %name, context = %DisplayErrorContext(&err), "provider in chain did not provide credentials");
                    errors.push((name.clone(), err));
                }
                Err(err) => {
                    tracing::warn!(provider = %name, error = %DisplayErrorContext(&err), "provider failed to provide credentials");
                    errors.push((name.clone(), err));
                }
            }
        }
        let all_not_loaded = errors.iter().all(|(_, err)| err.is_not_loaded());
        let chain_error = ProviderChainError {
            chain: self.name.clone(),
            errors,
        };
        if all_not_loaded {
            Err(CredentialsError::not_loaded(chain_error))
        } else {
            Err(CredentialsError::provider_error(chain_error))
        }
    }
}

impl ProvideCredentials for CredentialsProviderChain {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.credentials())
    }
}

/// Every provider in a [`CredentialsProviderChain`] failed
///
/// The `Display` output names the chain and each provider in the order they were tried.
/// [`Error::source`] is the failure of the last provider only; the failure of every provider is
/// available through [`ProviderChainError::errors`].
#[derive(Debug, Clone)]
pub struct ProviderChainError {
    chain: Cow<'static, str>,
    errors: Vec<(Cow<'static, str>, CredentialsError)>,
}

impl ProviderChainError {
    /// The name of each provider along with the error it returned, in the order they were tried
    pub fn errors(&self) -> impl Iterator<Item = (&str, &CredentialsError)> {
        self.errors.iter().map(|(name, err)| (name.as_ref(), err))
    }
}

impl fmt::Display for ProviderChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No credentials could be loaded from the chain: {}",
            self.chain
        )?;
        for (name, _) in &self.errors {
            write!(f, " -> {}", name)?;
        }
        Ok(())
    }
}

impl Error for ProviderChainError {
    /// The error of the last provider tried. Use [`ProviderChainError::errors`] for all of them.
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.last().map(|(_, err)| err as _)
    }
}

/// A chain was constructed without any providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyChainError;

impl fmt::Display for EmptyChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at least one provider must be in the chain")
    }
}

impl Error for EmptyChainError {}
