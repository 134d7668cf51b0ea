/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use super::repr::{self, BaseProvider};
use crate::credential_process::CredentialProcessProvider;
use crate::profile::credentials::ProfileFileError;
use crate::provider::credentials::ProvideCredentials;
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::sso::{SsoCredentialsProvider, SsoProviderConfig};
use crate::sts::AssumeRole;
use crate::web_identity_token::{StaticConfiguration, WebIdentityTokenCredentialsProvider};
use std::sync::Arc;

/// Executable form of a profile chain: a base provider and the roles to assume with its output
#[derive(Debug)]
pub(super) struct ProviderChain {
    base: Arc<dyn ProvideCredentials>,
    chain: Vec<AssumeRole>,
}

impl ProviderChain {
    pub(super) fn base(&self) -> &dyn ProvideCredentials {
        self.base.as_ref()
    }

    pub(super) fn chain(&self) -> &[AssumeRole] {
        self.chain.as_slice()
    }
}

impl ProviderChain {
    pub(super) fn from_repr(
        provider_config: &ProviderConfig,
        region: Option<Region>,
        repr: repr::ProfileChain<'_>,
        factory: &named::NamedProviderFactory,
    ) -> Result<Self, ProfileFileError> {
        let base: Arc<dyn ProvideCredentials> = match repr.base() {
            BaseProvider::NamedSource(name) => {
                factory
                    .provider(name)
                    .ok_or_else(|| ProfileFileError::UnknownCredentialSource {
                        name: name.to_string(),
                    })?
            }
            BaseProvider::AccessKey(key) => Arc::new(key.clone()),
            BaseProvider::CredentialProcess(command) => Arc::new(
                CredentialProcessProvider::builder()
                    .command(*command)
                    .configure(provider_config)
                    .build(),
            ),
            BaseProvider::WebIdentityTokenRole {
                role_arn,
                web_identity_token_file,
                session_name,
            } => {
                let provider = WebIdentityTokenCredentialsProvider::builder()
                    .static_configuration(StaticConfiguration {
                        web_identity_token_file: (*web_identity_token_file).into(),
                        role_arn: role_arn.to_string(),
                        session_name: session_name.map(ToString::to_string),
                    })
                    .configure(&provider_config.clone().with_region(region.clone()))
                    .build();
                Arc::new(provider)
            }
            BaseProvider::SsoSession {
                session_name,
                start_url,
                region: sso_region,
                account_id,
                role_name,
            } => Arc::new(SsoCredentialsProvider::new(
                provider_config,
                SsoProviderConfig {
                    account_id: account_id.to_string(),
                    role_name: role_name.to_string(),
                    start_url: start_url.to_string(),
                    region: Region::new(sso_region.to_string()),
                    session_name: Some(session_name.to_string()),
                },
            )),
            BaseProvider::LegacySso {
                start_url,
                region: sso_region,
                account_id,
                role_name,
            } => Arc::new(SsoCredentialsProvider::new(
                provider_config,
                SsoProviderConfig {
                    account_id: account_id.to_string(),
                    role_name: role_name.to_string(),
                    start_url: start_url.to_string(),
                    region: Region::new(sso_region.to_string()),
                    session_name: None,
                },
            )),
        };
        tracing::info!(base = ?repr.base(), "first credentials will be loaded from the base provider");
        let chain = repr
            .chain()
            .iter()
            .map(|role_arn| {
                tracing::debug!(role_arn = %role_arn.role_arn, source = ?role_arn.source, "role assumption configured");
                AssumeRole::new(role_arn.role_arn, provider_config)
                    .session_name(role_arn.session_name.map(ToString::to_string))
                    .external_id(role_arn.external_id.map(ToString::to_string))
                    .region(region.clone())
            })
            .collect();
        Ok(ProviderChain { base, chain })
    }
}

pub(super) mod named {
    use std::borrow::Cow;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::provider::credentials::ProvideCredentials;

    /// Providers a `credential_source` can name
    #[derive(Debug)]
    pub(in crate::profile) struct NamedProviderFactory {
        providers: HashMap<Cow<'static, str>, Arc<dyn ProvideCredentials>>,
    }

    impl NamedProviderFactory {
        pub(in crate::profile) fn new(
            providers: HashMap<Cow<'static, str>, Arc<dyn ProvideCredentials>>,
        ) -> Self {
            Self { providers }
        }

        pub(in crate::profile) fn provider(&self, name: &str) -> Option<Arc<dyn ProvideCredentials>> {
            self.providers.get(name).cloned()
        }
    }
}
