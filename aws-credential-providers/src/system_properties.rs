/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials from process-level system properties
//!
//! System properties are a key/value map injected through
//! [`ProviderConfig::with_properties`](crate::provider_config::ProviderConfig::with_properties).
//! They let an embedding application hand credentials to the default chain without touching the
//! process environment.

use crate::os_shim::SystemProperties;
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::Credentials;
use std::fmt;

const PROVIDER_NAME: &str = "SystemProperties";

const ACCESS_KEY_ID: &str = "aws.accessKeyId";
const SECRET_ACCESS_KEY: &str = "aws.secretAccessKey";
const SESSION_TOKEN: &str = "aws.sessionToken";
const ACCOUNT_ID: &str = "aws.accountId";

/// Load credentials from system properties
///
/// - `aws.accessKeyId` and `aws.secretAccessKey` are required
/// - `aws.sessionToken` and `aws.accountId` are optional
#[derive(Debug, Clone, Default)]
pub struct SystemPropertyCredentialsProvider {
    properties: SystemProperties,
}

impl SystemPropertyCredentialsProvider {
    /// Builder for [`SystemPropertyCredentialsProvider`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    fn property(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .map(ToString::to_string)
    }

    fn credentials(&self) -> provider::Result {
        let access_key = self.required(ACCESS_KEY_ID)?;
        let secret_key = self.required(SECRET_ACCESS_KEY)?;
        let mut builder = Credentials::builder()
            .access_key_id(access_key)
            .secret_access_key(secret_key)
            .provider_name(PROVIDER_NAME);
        builder.set_session_token(self.property(SESSION_TOKEN));
        builder.set_account_id(self.property(ACCOUNT_ID).map(Into::into));
        Ok(builder.build())
    }

    fn required(&self, key: &'static str) -> Result<String, CredentialsError> {
        self.property(key)
            .ok_or_else(|| CredentialsError::invalid_configuration(MissingProperty(key)))
    }
}

#[derive(Debug)]
struct MissingProperty(&'static str);

impl fmt::Display for MissingProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing value for system property `{}`", self.0)
    }
}

impl std::error::Error for MissingProperty {}

impl ProvideCredentials for SystemPropertyCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::ready(self.credentials())
    }
}

/// Builder for [`SystemPropertyCredentialsProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    config: Option<ProviderConfig>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Build the provider
    pub fn build(self) -> SystemPropertyCredentialsProvider {
        SystemPropertyCredentialsProvider {
            properties: self
                .config
                .map(|config| config.properties())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::SystemPropertyCredentialsProvider;
    use crate::os_shim::SystemProperties;
    use crate::provider::credentials::ProvideCredentials;
    use crate::provider_config::ProviderConfig;

    fn make_provider(props: &[(&str, &str)]) -> SystemPropertyCredentialsProvider {
        SystemPropertyCredentialsProvider::builder()
            .configure(
                &ProviderConfig::no_configuration()
                    .with_properties(SystemProperties::from_slice(props)),
            )
            .build()
    }

    #[tokio::test]
    async fn loads_all_properties() {
        let creds = make_provider(&[
            ("aws.accessKeyId", "AKID"),
            ("aws.secretAccessKey", "SECRET"),
            ("aws.sessionToken", "TOKEN"),
            ("aws.accountId", "123456789012"),
        ])
        .provide_credentials()
        .await
        .expect("valid");
        assert_eq!("AKID", creds.access_key_id());
        assert_eq!(Some("TOKEN"), creds.session_token());
        assert_eq!("SystemProperties", creds.provider_name());
    }

    #[tokio::test]
    async fn missing_access_key() {
        let err = make_provider(&[("aws.secretAccessKey", "SECRET")])
            .provide_credentials()
            .await
            .expect_err("missing key");
        assert!(err.to_string().contains("`aws.accessKeyId`"), "{}", err);
    }
}
