/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credential provider augmentation through the AWS Security Token Service (STS).
//!
//! Calls to STS must be signed, so this crate does not ship an STS transport. Instead, callers
//! supply an [`StsClient`] implementation (usually a thin wrapper around an STS SDK client) with
//! [`ProviderConfig::with_sts_client`](crate::provider_config::ProviderConfig::with_sts_client).

use crate::os_shim::Env;
use crate::region::Region;
use crate::Credentials;
use aws_smithy_async::time::SharedTimeSource;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod assume_role;

pub use assume_role::{AssumeRoleProvider, AssumeRoleProviderBuilder};
pub(crate) use assume_role::AssumeRole;

/// Default duration of assumed role sessions
pub(crate) const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(900);

const ENV_ROLE_SESSION_NAME: &str = "AWS_ROLE_SESSION_NAME";

/// A session tag passed to `AssumeRole`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

/// Input to the STS `AssumeRole` operation
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct AssumeRoleRequest {
    /// ARN of the role to assume
    pub role_arn: String,
    /// Name of the role session
    pub role_session_name: String,
    /// External id required by the role's trust policy
    pub external_id: Option<String>,
    /// Requested session duration
    pub duration: Duration,
    /// Inline session policy (JSON)
    pub policy: Option<String>,
    /// ARNs of managed session policies
    pub policy_arns: Vec<String>,
    /// Session tags
    pub tags: Vec<Tag>,
    /// Keys of session tags that are transitive
    pub transitive_tag_keys: Vec<String>,
    /// Serial number of the MFA device
    pub serial_number: Option<String>,
    /// Value provided by the MFA device
    pub token_code: Option<String>,
    /// Source identity of the principal making the call
    pub source_identity: Option<String>,
}

/// Input to the STS `AssumeRoleWithWebIdentity` operation
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct AssumeRoleWithWebIdentityRequest {
    /// ARN of the role to assume
    pub role_arn: String,
    /// Name of the role session
    pub role_session_name: String,
    /// OIDC token issued by the identity provider
    pub web_identity_token: String,
    /// Requested session duration
    pub duration: Duration,
    /// Fully qualified host of the OAuth 2.0 identity provider
    pub provider_id: Option<String>,
    /// Inline session policy (JSON)
    pub policy: Option<String>,
    /// ARNs of managed session policies
    pub policy_arns: Vec<String>,
}

impl fmt::Debug for AssumeRoleWithWebIdentityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleWithWebIdentityRequest")
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("web_identity_token", &"** redacted **")
            .field("duration", &self.duration)
            .field("provider_id", &self.provider_id)
            .field("policy", &self.policy)
            .field("policy_arns", &self.policy_arns)
            .finish()
    }
}

/// Temporary credentials returned by STS
#[derive(Clone)]
pub struct AssumeRoleResponse {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: SystemTime,
    assumed_role_arn: Option<String>,
}

impl fmt::Debug for AssumeRoleResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleResponse")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .field("assumed_role_arn", &self.assumed_role_arn)
            .finish()
    }
}

impl AssumeRoleResponse {
    /// Create a response from the `Credentials` member of an STS response
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: SystemTime,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiration,
            assumed_role_arn: None,
        }
    }

    /// Set the ARN of the assumed role user, used to derive the account id
    pub fn with_assumed_role_arn(mut self, arn: impl Into<String>) -> Self {
        self.assumed_role_arn = Some(arn.into());
        self
    }

    pub(crate) fn into_credentials(self, provider_name: &'static str) -> Credentials {
        let mut builder = Credentials::builder()
            .access_key_id(self.access_key_id)
            .secret_access_key(self.secret_access_key)
            .session_token(self.session_token)
            .expiry(self.expiration)
            .provider_name(provider_name);
        builder.set_account_id(
            self.assumed_role_arn
                .as_deref()
                .and_then(account_id_from_arn)
                .map(Into::into),
        );
        builder.build()
    }
}

/// `arn:partition:service:region:account-id:resource`
fn account_id_from_arn(arn: &str) -> Option<String> {
    let mut parts = arn.split(':');
    if parts.next() != Some("arn") {
        return None;
    }
    parts
        .nth(3)
        .filter(|account_id| !account_id.is_empty())
        .map(ToString::to_string)
}

/// Error returned by an [`StsClient`]
#[derive(Debug)]
#[non_exhaustive]
pub enum StsError {
    /// STS is not activated in the requested region
    RegionDisabled {
        /// The region the call was made in
        region: Option<Region>,
    },

    /// STS returned an error
    Service {
        /// Error code, e.g. `AccessDenied` or `InvalidIdentityToken`
        code: String,
        /// Error message
        message: String,
    },

    /// The request could not be sent or the response could not be read
    Dispatch(Box<dyn Error + Send + Sync + 'static>),
}

impl StsError {
    /// Wrap a transport failure
    pub fn dispatch(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        StsError::Dispatch(source.into())
    }
}

impl fmt::Display for StsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StsError::RegionDisabled { region } => {
                write!(f, "STS is not activated in the requested region (")?;
                match region {
                    Some(region) => write!(f, "{}", region)?,
                    None => write!(f, "global endpoint")?,
                }
                write!(f, "). Please check your configuration and activate STS in the target region if necessary")
            }
            StsError::Service { code, message } => write!(f, "{}: {}", code, message),
            StsError::Dispatch(_) => write!(f, "failed to dispatch request to STS"),
        }
    }
}

impl Error for StsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StsError::Dispatch(err) => Some(err.as_ref() as _),
            _ => None,
        }
    }
}

/// Future returned by [`StsClient`] operations
pub type StsFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AssumeRoleResponse, StsError>> + Send + 'a>>;

/// The STS operations used by role assumption providers
pub trait StsClient: Send + Sync + fmt::Debug {
    /// Call `AssumeRole` in `region`, signing the request with `credentials`
    ///
    /// When `region` is `None` the global STS endpoint should be used.
    fn assume_role<'a>(
        &'a self,
        region: Option<Region>,
        credentials: Credentials,
        request: AssumeRoleRequest,
    ) -> StsFuture<'a>;

    /// Call `AssumeRoleWithWebIdentity` in `region`. This operation is not signed.
    fn assume_role_with_web_identity<'a>(
        &'a self,
        region: Option<Region>,
        request: AssumeRoleWithWebIdentityRequest,
    ) -> StsFuture<'a>;
}

/// Shared handle to an [`StsClient`]
#[derive(Clone, Debug)]
pub struct SharedStsClient(Arc<dyn StsClient>);

impl SharedStsClient {
    /// Wrap `client`
    pub fn new(client: impl StsClient + 'static) -> Self {
        Self(Arc::new(client))
    }
}

impl StsClient for SharedStsClient {
    fn assume_role<'a>(
        &'a self,
        region: Option<Region>,
        credentials: Credentials,
        request: AssumeRoleRequest,
    ) -> StsFuture<'a> {
        self.0.assume_role(region, credentials, request)
    }

    fn assume_role_with_web_identity<'a>(
        &'a self,
        region: Option<Region>,
        request: AssumeRoleWithWebIdentityRequest,
    ) -> StsFuture<'a> {
        self.0.assume_role_with_web_identity(region, request)
    }
}

/// No [`StsClient`] was configured
#[derive(Debug)]
pub(crate) struct NoStsClient;

impl fmt::Display for NoStsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "role assumption requires an STS client but none was configured. \
             Set one with `ProviderConfig::with_sts_client`"
        )
    }
}

impl Error for NoStsClient {}

/// An STS call made on behalf of a credentials provider failed
#[derive(Debug)]
pub(crate) struct StsProviderError {
    pub(crate) message: &'static str,
    pub(crate) source: StsError,
}

impl fmt::Display for StsProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for StsProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Session name used when none was configured
///
/// `AWS_ROLE_SESSION_NAME` if set, otherwise `aws-sdk-rust-<epoch millis>`.
pub(crate) fn default_session_name(env: &Env, time_source: &SharedTimeSource) -> String {
    env.get_non_blank(ENV_ROLE_SESSION_NAME).unwrap_or_else(|| {
        let millis = time_source
            .now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("aws-sdk-rust-{}", millis)
    })
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::{
        AssumeRoleRequest, AssumeRoleResponse, AssumeRoleWithWebIdentityRequest, StsClient,
        StsError, StsFuture,
    };
    use crate::region::Region;
    use crate::Credentials;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, UNIX_EPOCH};

    /// A call seen by [`FakeSts`]
    #[derive(Clone, Debug)]
    pub(crate) enum StsCall {
        AssumeRole {
            region: Option<Region>,
            credentials: Credentials,
            request: AssumeRoleRequest,
        },
        WebIdentity {
            region: Option<Region>,
            request: AssumeRoleWithWebIdentityRequest,
        },
    }

    type Responder = dyn Fn(&StsCall) -> Result<AssumeRoleResponse, StsError> + Send + Sync;

    /// STS stand-in that records calls and answers with `responder`
    #[derive(Clone)]
    pub(crate) struct FakeSts {
        calls: Arc<Mutex<Vec<StsCall>>>,
        responder: Arc<Responder>,
    }

    impl std::fmt::Debug for FakeSts {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FakeSts").finish()
        }
    }

    impl FakeSts {
        pub(crate) fn new(
            responder: impl Fn(&StsCall) -> Result<AssumeRoleResponse, StsError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Default::default(),
                responder: Arc::new(responder),
            }
        }

        /// Every call succeeds. The access key id names the role that was assumed.
        pub(crate) fn succeeding() -> Self {
            Self::new(|call| {
                let role_arn = match call {
                    StsCall::AssumeRole { request, .. } => &request.role_arn,
                    StsCall::WebIdentity { request, .. } => &request.role_arn,
                };
                Ok(AssumeRoleResponse::new(
                    format!("AKID-{}", role_arn),
                    "secret",
                    "session-token",
                    UNIX_EPOCH + Duration::from_secs(1_700_000_000),
                )
                .with_assumed_role_arn("arn:aws:sts::123456789012:assumed-role/role/session"))
            })
        }

        pub(crate) fn calls(&self) -> Vec<StsCall> {
            self.calls.lock().unwrap().clone()
        }

        fn respond(&self, call: StsCall) -> StsFuture<'_> {
            let result = (self.responder)(&call);
            self.calls.lock().unwrap().push(call);
            Box::pin(async move { result })
        }
    }

    impl StsClient for FakeSts {
        fn assume_role<'a>(
            &'a self,
            region: Option<Region>,
            credentials: Credentials,
            request: AssumeRoleRequest,
        ) -> StsFuture<'a> {
            self.respond(StsCall::AssumeRole {
                region,
                credentials,
                request,
            })
        }

        fn assume_role_with_web_identity<'a>(
            &'a self,
            region: Option<Region>,
            request: AssumeRoleWithWebIdentityRequest,
        ) -> StsFuture<'a> {
            self.respond(StsCall::WebIdentity { region, request })
        }
    }
}

#[cfg(test)]
mod test {
    use super::{account_id_from_arn, default_session_name, AssumeRoleResponse, StsError};
    use crate::os_shim::Env;
    use crate::region::Region;
    use crate::time_source::TestingTimeSource;
    use aws_smithy_async::time::SharedTimeSource;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn account_id_is_the_fifth_arn_field() {
        assert_eq!(
            Some("123456789012".to_string()),
            account_id_from_arn("arn:aws:sts::123456789012:assumed-role/role/session")
        );
        assert_eq!(None, account_id_from_arn("arn:aws:s3:::bucket"));
        assert_eq!(None, account_id_from_arn("not-an-arn"));
    }

    #[test]
    fn response_into_credentials() {
        let creds = AssumeRoleResponse::new(
            "AKID",
            "secret",
            "token",
            UNIX_EPOCH + Duration::from_secs(100),
        )
        .with_assumed_role_arn("arn:aws:sts::123456789012:assumed-role/role/session")
        .into_credentials("AssumeRoleProvider");
        assert_eq!("AKID", creds.access_key_id());
        assert_eq!(Some("token"), creds.session_token());
        assert_eq!(
            Some("123456789012"),
            creds.account_id().map(|account| account.as_str())
        );
        assert_eq!("AssumeRoleProvider", creds.provider_name());
    }

    #[test]
    fn session_name_defaults() {
        let time = SharedTimeSource::new(TestingTimeSource::new(
            UNIX_EPOCH + Duration::from_millis(1_629_147_173_123),
        ));
        assert_eq!(
            "aws-sdk-rust-1629147173123",
            default_session_name(&Env::from_slice(&[]), &time)
        );
        assert_eq!(
            "my-session",
            default_session_name(
                &Env::from_slice(&[("AWS_ROLE_SESSION_NAME", "my-session")]),
                &time
            )
        );
    }

    #[test]
    fn region_disabled_message() {
        let err = StsError::RegionDisabled {
            region: Some(Region::new("ap-east-1")),
        };
        assert_eq!(
            "STS is not activated in the requested region (ap-east-1). Please check your configuration and activate STS in the target region if necessary",
            err.to_string()
        );
    }
}
