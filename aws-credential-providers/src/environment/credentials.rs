/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::os_shim::Env;
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::Credentials;
use std::fmt;

const ENV_PROVIDER: &str = "Environment";

const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
const ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";

/// Load Credentials from Environment Variables
///
/// - `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` are required
/// - `AWS_SESSION_TOKEN` and `AWS_ACCOUNT_ID` are optional
///
/// Empty values are treated as unset.
#[derive(Debug, Clone)]
pub struct EnvironmentVariableCredentialsProvider {
    env: Env,
}

impl EnvironmentVariableCredentialsProvider {
    /// Create a new `EnvironmentVariableCredentialsProvider` reading from the process environment
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder for [`EnvironmentVariableCredentialsProvider`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    fn credentials(&self) -> provider::Result {
        let access_key = required(&self.env, ACCESS_KEY_ID)?;
        let secret_key = required(&self.env, SECRET_ACCESS_KEY)?;
        let mut builder = Credentials::builder()
            .access_key_id(access_key)
            .secret_access_key(secret_key)
            .provider_name(ENV_PROVIDER);
        builder.set_session_token(self.env.get_non_blank(SESSION_TOKEN));
        builder.set_account_id(self.env.get_non_blank(ACCOUNT_ID).map(Into::into));
        Ok(builder.build())
    }
}

impl Default for EnvironmentVariableCredentialsProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn required(env: &Env, var: &'static str) -> Result<String, CredentialsError> {
    env.get_non_blank(var)
        .ok_or_else(|| CredentialsError::invalid_configuration(MissingVariable(var)))
}

#[derive(Debug)]
struct MissingVariable(&'static str);

impl fmt::Display for MissingVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing value for environment variable `{}`", self.0)
    }
}

impl std::error::Error for MissingVariable {}

impl ProvideCredentials for EnvironmentVariableCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::ready(self.credentials())
    }
}

/// Builder for [`EnvironmentVariableCredentialsProvider`]
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
    pub fn build(self) -> EnvironmentVariableCredentialsProvider {
        let env = self
            .config
            .map(|config| config.env())
            .unwrap_or_default();
        EnvironmentVariableCredentialsProvider { env }
    }
}

#[cfg(test)]
mod test {
    use super::EnvironmentVariableCredentialsProvider;
    use crate::os_shim::Env;
    use crate::provider::credentials::{CredentialsError, ProvideCredentials};
    use crate::provider_config::ProviderConfig;

    fn make_provider(vars: &[(&str, &str)]) -> EnvironmentVariableCredentialsProvider {
        EnvironmentVariableCredentialsProvider::builder()
            .configure(&ProviderConfig::no_configuration().with_env(Env::from_slice(vars)))
            .build()
    }

    #[tokio::test]
    async fn valid_no_token() {
        let provider = make_provider(&[
            ("AWS_ACCESS_KEY_ID", "abc"),
            ("AWS_SECRET_ACCESS_KEY", "def"),
        ]);
        let creds = provider.provide_credentials().await.expect("valid credentials");
        assert_eq!("abc", creds.access_key_id());
        assert_eq!("def", creds.secret_access_key());
        assert_eq!(None, creds.session_token());
        assert_eq!(None, creds.account_id());
        assert_eq!("Environment", creds.provider_name());
    }

    #[tokio::test]
    async fn valid_with_token_and_account() {
        let provider = make_provider(&[
            ("AWS_ACCESS_KEY_ID", "access"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", "token"),
            ("AWS_ACCOUNT_ID", "012345678901"),
        ]);
        let creds = provider.provide_credentials().await.expect("valid credentials");
        assert_eq!(Some("token"), creds.session_token());
        assert_eq!(
            Some("012345678901"),
            creds.account_id().map(|id| id.as_str())
        );
    }

    #[tokio::test]
    async fn empty_token_is_ignored() {
        let provider = make_provider(&[
            ("AWS_ACCESS_KEY_ID", "access"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", ""),
        ]);
        let creds = provider.provide_credentials().await.expect("valid credentials");
        assert_eq!(None, creds.session_token());
    }

    #[tokio::test]
    async fn missing_secret_names_the_variable() {
        let provider = make_provider(&[("AWS_ACCESS_KEY_ID", "abc")]);
        let err = provider
            .provide_credentials()
            .await
            .expect_err("no secret key");
        assert!(
            matches!(err, CredentialsError::InvalidConfiguration(_)),
            "{:?}",
            err
        );
        assert!(
            err.to_string().contains("`AWS_SECRET_ACCESS_KEY`"),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn empty_access_key_is_missing() {
        let provider = make_provider(&[
            ("AWS_ACCESS_KEY_ID", ""),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);
        let err = provider
            .provide_credentials()
            .await
            .expect_err("blank access key");
        assert!(err.to_string().contains("`AWS_ACCESS_KEY_ID`"), "{}", err);
    }
}
