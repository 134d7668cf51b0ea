/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Assume credentials for a role through the AWS Security Token Service (STS).

use super::{
    default_session_name, AssumeRoleRequest, NoStsClient, SharedStsClient, StsClient, StsError,
    StsProviderError, Tag, DEFAULT_SESSION_DURATION,
};
use crate::os_shim::Env;
use crate::provider::credentials::{
    self as provider, future, CredentialsError, ProvideCredentials, SharedCredentialsProvider,
};
use crate::provider_config::ProviderConfig;
use crate::region::Region;
use crate::Credentials;
use aws_smithy_async::time::SharedTimeSource;
use std::time::Duration;
use tracing::Instrument;

const PROVIDER_NAME: &str = "AssumeRoleProvider";

/// Credentials provider that uses credentials provided by another provider to assume a role
/// through the AWS Security Token Service (STS).
///
/// When asked to provide credentials, this provider will first invoke the inner credentials
/// provider to get AWS credentials for STS. Then, it will call STS to get assumed credentials for
/// the desired role.
///
/// # Examples
/// ```no_run
/// use aws_credential_providers::sts::AssumeRoleProvider;
/// use aws_credential_providers::environment::EnvironmentVariableCredentialsProvider;
/// use aws_credential_providers::region::Region;
///
/// let provider = AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
///     .region(Region::from_static("us-east-2"))
///     .session_name("testAR")
///     .build(EnvironmentVariableCredentialsProvider::new());
/// ```
#[derive(Debug)]
pub struct AssumeRoleProvider {
    inner: AssumeRole,
    source: SharedCredentialsProvider,
}

impl AssumeRoleProvider {
    /// Build a new role-assuming provider for the given role.
    ///
    /// The `role` argument should take the form an Amazon Resource Name (ARN) like
    ///
    /// ```text
    /// arn:aws:iam::123456789012:role/example
    /// ```
    pub fn builder(role: impl Into<String>) -> AssumeRoleProviderBuilder {
        AssumeRoleProviderBuilder::new(role.into())
    }

    async fn credentials(&self) -> provider::Result {
        let source_credentials = self
            .source
            .provide_credentials()
            .instrument(tracing::debug_span!("load_source_credentials"))
            .await?;
        self.inner.assume_role(source_credentials).await
    }
}

impl ProvideCredentials for AssumeRoleProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(
            self.credentials()
                .instrument(tracing::debug_span!("assume_role", provider = PROVIDER_NAME)),
        )
    }
}

/// One `AssumeRole` call: the request template plus everything needed to send it
///
/// Shared by [`AssumeRoleProvider`] and the role hops of a profile chain.
#[derive(Debug, Clone)]
pub(crate) struct AssumeRole {
    role_arn: String,
    session_name: Option<String>,
    external_id: Option<String>,
    duration: Duration,
    policy: Option<String>,
    policy_arns: Vec<String>,
    tags: Vec<Tag>,
    transitive_tag_keys: Vec<String>,
    serial_number: Option<String>,
    token_code: Option<String>,
    source_identity: Option<String>,
    region: Option<Region>,
    sts: Option<SharedStsClient>,
    env: Env,
    time_source: SharedTimeSource,
}

impl AssumeRole {
    pub(crate) fn new(role_arn: impl Into<String>, config: &ProviderConfig) -> Self {
        Self {
            role_arn: role_arn.into(),
            session_name: None,
            external_id: None,
            duration: DEFAULT_SESSION_DURATION,
            policy: None,
            policy_arns: Vec::new(),
            tags: Vec::new(),
            transitive_tag_keys: Vec::new(),
            serial_number: None,
            token_code: None,
            source_identity: None,
            region: config.region(),
            sts: config.sts_client(),
            env: config.env(),
            time_source: config.time_source(),
        }
    }

    pub(crate) fn session_name(mut self, session_name: Option<String>) -> Self {
        self.session_name = session_name;
        self
    }

    pub(crate) fn external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    pub(crate) fn region(mut self, region: Option<Region>) -> Self {
        self.region = region;
        self
    }

    fn request(&self) -> AssumeRoleRequest {
        AssumeRoleRequest {
            role_arn: self.role_arn.clone(),
            role_session_name: self
                .session_name
                .clone()
                .unwrap_or_else(|| default_session_name(&self.env, &self.time_source)),
            external_id: self.external_id.clone(),
            duration: self.duration,
            policy: self.policy.clone(),
            policy_arns: self.policy_arns.clone(),
            tags: self.tags.clone(),
            transitive_tag_keys: self.transitive_tag_keys.clone(),
            serial_number: self.serial_number.clone(),
            token_code: self.token_code.clone(),
            source_identity: self.source_identity.clone(),
        }
    }

    /// Exchange `input` credentials for credentials of this role
    pub(crate) async fn assume_role(&self, input: Credentials) -> provider::Result {
        let sts = self
            .sts
            .as_ref()
            .ok_or_else(|| CredentialsError::invalid_configuration(NoStsClient))?;
        tracing::debug!(role_arn = %self.role_arn, "retrieving assumed credentials");
        let response = sts
            .assume_role(self.region.clone(), input, self.request())
            .await
            .map_err(|err| {
                tracing::debug!(role_arn = %self.role_arn, err = %err, "STS refused to grant assumed role credentials");
                match err {
                    StsError::RegionDisabled { .. } => CredentialsError::invalid_configuration(err),
                    _ => CredentialsError::provider_error(StsProviderError {
                        message: "failed to assume role from STS",
                        source: err,
                    }),
                }
            })?;
        let credentials = response.into_credentials(PROVIDER_NAME);
        tracing::debug!(role_arn = %self.role_arn, expiration = ?credentials.expiry(), "obtained assumed credentials");
        Ok(credentials)
    }
}

/// A builder for [`AssumeRoleProvider`].
///
/// Construct one through [`AssumeRoleProvider::builder`].
#[derive(Debug)]
pub struct AssumeRoleProviderBuilder {
    role_arn: String,
    session_name: Option<String>,
    external_id: Option<String>,
    duration: Option<Duration>,
    policy: Option<String>,
    policy_arns: Vec<String>,
    tags: Vec<Tag>,
    transitive_tag_keys: Vec<String>,
    serial_number: Option<String>,
    token_code: Option<String>,
    source_identity: Option<String>,
    region: Option<Region>,
    sts: Option<SharedStsClient>,
    config: Option<ProviderConfig>,
}

impl AssumeRoleProviderBuilder {
    /// Start a new assume role builder for the given role.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role_arn: role.into(),
            session_name: None,
            external_id: None,
            duration: None,
            policy: None,
            policy_arns: Vec::new(),
            tags: Vec::new(),
            transitive_tag_keys: Vec::new(),
            serial_number: None,
            token_code: None,
            source_identity: None,
            region: None,
            sts: None,
            config: None,
        }
    }

    /// Set a unique identifier that might be required when you assume a role in another account.
    ///
    /// If the administrator of the account to which the role belongs provided you with an
    /// external ID, then provide that value in this parameter.
    pub fn external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    /// Set an identifier for the assumed role session.
    ///
    /// Use the role session name to uniquely identify a session when the same role is assumed by
    /// different principals or for different reasons. In cross-account scenarios, the role
    /// session name is visible to, and can be logged by the account that owns the role.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Set the expiration time of the role session.
    ///
    /// When unset, this value defaults to 15 minutes.
    pub fn session_length(mut self, length: Duration) -> Self {
        self.duration = Some(length);
        self
    }

    /// Set an IAM policy in JSON format that you want to use as an inline session policy.
    pub fn policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Set the ARNs of IAM managed policies to use as managed session policies.
    pub fn policy_arns(mut self, policy_arns: Vec<String>) -> Self {
        self.policy_arns = policy_arns;
        self
    }

    /// Add a session tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Set the keys of session tags that pass to subsequent sessions in a role chain
    pub fn transitive_tag_keys(mut self, keys: Vec<String>) -> Self {
        self.transitive_tag_keys = keys;
        self
    }

    /// Set the MFA device serial number and the code it currently displays
    pub fn mfa(mut self, serial_number: impl Into<String>, token_code: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self.token_code = Some(token_code.into());
        self
    }

    /// Set the source identity of the principal making the call
    pub fn source_identity(mut self, source_identity: impl Into<String>) -> Self {
        self.source_identity = Some(source_identity.into());
        self
    }

    /// Set the region to assume the role in.
    ///
    /// This dictates which STS endpoint the AssumeRole action is invoked on. When unset, the
    /// region of the [`ProviderConfig`] is used, and when that is unset too, the global endpoint.
    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Set the STS client used to assume the role
    pub fn sts_client(mut self, client: SharedStsClient) -> Self {
        self.sts = Some(client);
        self
    }

    /// Override the configuration used for this provider
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Build a credentials provider for this role authorized by the given `provider`.
    pub fn build(self, provider: impl ProvideCredentials + 'static) -> AssumeRoleProvider {
        let config = self.config.unwrap_or_default();
        let mut inner = AssumeRole::new(self.role_arn, &config)
            .session_name(self.session_name)
            .external_id(self.external_id);
        if let Some(region) = self.region {
            inner = inner.region(Some(region));
        }
        if let Some(sts) = self.sts {
            inner.sts = Some(sts);
        }
        inner.duration = self.duration.unwrap_or(DEFAULT_SESSION_DURATION);
        inner.policy = self.policy;
        inner.policy_arns = self.policy_arns;
        inner.tags = self.tags;
        inner.transitive_tag_keys = self.transitive_tag_keys;
        inner.serial_number = self.serial_number;
        inner.token_code = self.token_code;
        inner.source_identity = self.source_identity;
        AssumeRoleProvider {
            inner,
            source: SharedCredentialsProvider::new(provider),
        }
    }
}

#[cfg(test)]
mod test {
    use super::AssumeRoleProvider;
    use crate::os_shim::Env;
    use crate::provider::credentials::{CredentialsError, ProvideCredentials};
    use crate::provider_config::ProviderConfig;
    use crate::region::Region;
    use crate::sts::test_util::{FakeSts, StsCall};
    use crate::sts::{SharedStsClient, StsError, Tag};
    use crate::time_source::TestingTimeSource;
    use crate::Credentials;
    use std::error::Error;
    use std::time::{Duration, UNIX_EPOCH};

    fn config(sts: &FakeSts) -> ProviderConfig {
        ProviderConfig::no_configuration()
            .with_sts_client(SharedStsClient::new(sts.clone()))
            .with_time_source(TestingTimeSource::new(
                UNIX_EPOCH + Duration::from_millis(1_234_567),
            ))
    }

    #[tokio::test]
    async fn assumes_role_with_source_credentials() {
        let sts = FakeSts::succeeding();
        let provider = AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
            .configure(&config(&sts).with_region(Some(Region::new("us-west-2"))))
            .session_name("demo-session")
            .external_id("ext")
            .policy("{}")
            .tag("team", "rust")
            .mfa("arn:aws:iam::123456789012:mfa/user", "123456")
            .build(Credentials::from_keys("base-akid", "base-secret", None));
        let creds = provider.provide_credentials().await.expect("assumed");
        assert_eq!("AKID-arn:aws:iam::123456789012:role/demo", creds.access_key_id());
        assert_eq!("AssumeRoleProvider", creds.provider_name());
        assert_eq!(
            Some("123456789012"),
            creds.account_id().map(|account| account.as_str())
        );

        match &sts.calls()[..] {
            [StsCall::AssumeRole {
                region,
                credentials,
                request,
            }] => {
                assert_eq!(Some(Region::new("us-west-2")), *region);
                assert_eq!("base-akid", credentials.access_key_id());
                assert_eq!("demo-session", request.role_session_name);
                assert_eq!(Some("ext".to_string()), request.external_id);
                assert_eq!(Duration::from_secs(900), request.duration);
                assert_eq!(
                    vec![Tag {
                        key: "team".into(),
                        value: "rust".into()
                    }],
                    request.tags
                );
                assert_eq!(Some("123456".to_string()), request.token_code);
            }
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[tokio::test]
    async fn session_name_defaults_to_timestamp() {
        let sts = FakeSts::succeeding();
        AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
            .configure(&config(&sts))
            .session_length(Duration::from_secs(3600))
            .build(Credentials::from_keys("base-akid", "base-secret", None))
            .provide_credentials()
            .await
            .expect("assumed");
        match &sts.calls()[..] {
            [StsCall::AssumeRole {
                request, region, ..
            }] => {
                assert_eq!("aws-sdk-rust-1234567", request.role_session_name);
                assert_eq!(Duration::from_secs(3600), request.duration);
                assert_eq!(None, *region);
            }
            other => panic!("unexpected calls: {:?}", other),
        }

        let sts = FakeSts::succeeding();
        AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
            .configure(&config(&sts).with_env(Env::from_slice(&[(
                "AWS_ROLE_SESSION_NAME",
                "from-env",
            )])))
            .build(Credentials::from_keys("base-akid", "base-secret", None))
            .provide_credentials()
            .await
            .expect("assumed");
        match &sts.calls()[..] {
            [StsCall::AssumeRole { request, .. }] => {
                assert_eq!("from-env", request.role_session_name)
            }
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[tokio::test]
    async fn service_errors_are_provider_errors() {
        let sts = FakeSts::new(|_| {
            Err(StsError::Service {
                code: "AccessDenied".into(),
                message: "not authorized".into(),
            })
        });
        let err = AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
            .configure(&config(&sts))
            .build(Credentials::from_keys("base-akid", "base-secret", None))
            .provide_credentials()
            .await
            .expect_err("access denied");
        assert!(matches!(err, CredentialsError::ProviderError(_)), "{:?}", err);
        let source = err.source().expect("has source");
        assert_eq!("failed to assume role from STS", source.to_string());
        assert_eq!(
            "AccessDenied: not authorized",
            source.source().expect("sts error").to_string()
        );
    }

    #[tokio::test]
    async fn disabled_region_is_a_configuration_error() {
        let sts = FakeSts::new(|call| match call {
            StsCall::AssumeRole { region, .. } => Err(StsError::RegionDisabled {
                region: region.clone(),
            }),
            StsCall::WebIdentity { .. } => unreachable!(),
        });
        let err = AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
            .configure(&config(&sts))
            .region(Region::new("ap-east-1"))
            .build(Credentials::from_keys("base-akid", "base-secret", None))
            .provide_credentials()
            .await
            .expect_err("region disabled");
        assert!(
            matches!(err, CredentialsError::InvalidConfiguration(_)),
            "{:?}",
            err
        );
        assert!(err.to_string().contains("(ap-east-1)"), "{}", err);
    }

    #[tokio::test]
    async fn source_failure_is_returned_unchanged() {
        let sts = FakeSts::succeeding();
        let err = AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
            .configure(&config(&sts))
            .build(crate::meta::credentials::provide_credentials_fn(|| async {
                Err(CredentialsError::not_loaded("no base credentials"))
            }))
            .provide_credentials()
            .await
            .expect_err("no source");
        assert!(err.is_not_loaded());
        assert!(sts.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_sts_client() {
        let err = AssumeRoleProvider::builder("arn:aws:iam::123456789012:role/demo")
            .configure(&ProviderConfig::no_configuration())
            .build(Credentials::from_keys("base-akid", "base-secret", None))
            .provide_credentials()
            .await
            .expect_err("no sts");
        assert!(
            matches!(err, CredentialsError::InvalidConfiguration(_)),
            "{:?}",
            err
        );
    }
}
