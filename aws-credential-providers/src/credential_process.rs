/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credentials Provider for external process
//!
//! **Warning**: this provider runs an arbitrary command and trusts whatever it prints. Secure the
//! config that names the command and the executable itself.

use crate::command::{debug_fmt_command_string, execute_command, CommandError};
use crate::json_credentials::{json_parse_loop, parse_expiration, InvalidJsonCredentials};
use crate::provider::credentials::{self as provider, future, CredentialsError, ProvideCredentials};
use crate::provider_config::ProviderConfig;
use crate::Credentials;
use aws_smithy_async::rt::sleep::SharedAsyncSleep;
use aws_smithy_json::deserialize::Token;
use aws_smithy_types::Number;
use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, SystemTime};
use tracing::Instrument;

const PROVIDER_NAME: &str = "Process";
const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// External process credentials provider
///
/// Runs `command` through `sh -c` (or `cmd.exe /C` on Windows) and parses its output:
///
/// ```json
/// {
///   "Version": 1,
///   "AccessKeyId": "ASIARTESTID",
///   "SecretAccessKey": "TESTSECRETKEY",
///   "SessionToken": "TESTSESSIONTOKEN",
///   "Expiration": "2022-05-02T18:36:00+00:00",
///   "AccountId": "123456789012"
/// }
/// ```
///
/// `Expiration` may be omitted, in which case the credentials never expire.
pub struct CredentialProcessProvider {
    command: String,
    max_output_bytes: usize,
    timeout: Duration,
    sleep: SharedAsyncSleep,
}

impl fmt::Debug for CredentialProcessProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Security: The arguments for command must be redacted since they can be sensitive
        f.debug_struct("CredentialProcessProvider")
            .field("command", &debug_fmt_command_string(&self.command))
            .field("max_output_bytes", &self.max_output_bytes)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProvideCredentials for CredentialProcessProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(
            self.credentials()
                .instrument(tracing::debug_span!("load_credentials", provider = PROVIDER_NAME)),
        )
    }
}

impl CredentialProcessProvider {
    /// Create new [`CredentialProcessProvider`] with the default limits
    pub fn new(command: impl Into<String>) -> Self {
        Self::builder().command(command).build()
    }

    /// Builder for [`CredentialProcessProvider`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn credentials(&self) -> provider::Result {
        let result = execute_command(
            &self.command,
            self.max_output_bytes,
            self.timeout,
            &self.sleep,
        )
        .await;
        let output = match result {
            Ok(output) => output,
            Err(CommandError::TimedOut(timeout)) => {
                tracing::warn!(timeout = ?timeout, "credential process timed out");
                return Err(CredentialsError::provider_timed_out(timeout));
            }
            Err(err) => {
                return Err(CredentialsError::provider_error(ProcessError::Execute(err)));
            }
        };

        if output.exit_code != 0 {
            tracing::warn!(
                exit_code = output.exit_code,
                "Command completed with nonzero exit code"
            );
            let exit_code = output.exit_code;
            let output = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return Err(CredentialsError::provider_error(ProcessError::NonzeroExit {
                exit_code,
                output,
            }));
        }
        if !output.stderr.is_empty() {
            tracing::debug!(stderr = %output.stderr.trim_end(), "credential process wrote to stderr");
        }

        let creds = parse_credential_process_json_credentials(&output.stdout)
            .map_err(CredentialsError::unhandled)?;
        let mut builder = Credentials::builder()
            .access_key_id(creds.access_key_id)
            .secret_access_key(creds.secret_access_key)
            .session_token(creds.session_token)
            .provider_name(PROVIDER_NAME);
        builder.set_expiry(creds.expiration);
        builder.set_account_id(creds.account_id.map(Into::into));
        tracing::debug!("loaded credentials from external process");
        Ok(builder.build())
    }
}

#[derive(Debug)]
enum ProcessError {
    Execute(CommandError),
    NonzeroExit { exit_code: i32, output: String },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Execute(err) => write!(f, "Failed to execute command: {}", err),
            ProcessError::NonzeroExit { exit_code, output } => write!(
                f,
                "Command completed with nonzero exit code {}: {}",
                exit_code, output
            ),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Execute(err) => Some(err),
            ProcessError::NonzeroExit { .. } => None,
        }
    }
}

/// Builder for [`CredentialProcessProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    command: Option<String>,
    max_output_bytes: Option<usize>,
    timeout: Option<Duration>,
    config: Option<ProviderConfig>,
}

impl Builder {
    /// The command to run
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Maximum number of bytes the command may print, 64 KiB by default
    pub fn max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = Some(max_output_bytes);
        self
    }

    /// How long the command may run, 60 seconds by default
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the configuration used for this provider
    pub fn configure(mut self, config: &ProviderConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Build the provider
    ///
    /// An unset command is treated as an empty command, which fails when run.
    pub fn build(self) -> CredentialProcessProvider {
        CredentialProcessProvider {
            command: self.command.unwrap_or_default(),
            max_output_bytes: self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            sleep: self.config.unwrap_or_default().sleep(),
        }
    }
}

/// Credentials printed by a credential process
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ProcessCredentials<'a> {
    access_key_id: Cow<'a, str>,
    secret_access_key: Cow<'a, str>,
    session_token: Cow<'a, str>,
    expiration: Option<SystemTime>,
    account_id: Option<Cow<'a, str>>,
}

/// Deserialize a credential_process response from a string
///
/// Returns an error if the response cannot be successfully parsed or is missing keys.
///
/// Keys are case insensitive.
pub(crate) fn parse_credential_process_json_credentials(
    credentials_response: &str,
) -> Result<ProcessCredentials<'_>, InvalidJsonCredentials> {
    let mut version = None;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;
    let mut expiration = None;
    let mut account_id = None;
    json_parse_loop(credentials_response.as_bytes(), |key, value| {
        match (key, value) {
            (key, Token::ValueNumber { value, .. }) if key.eq_ignore_ascii_case("Version") => {
                version = Some(*value)
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("AccessKeyId") => {
                access_key_id = Some(value.to_unescaped()?)
            }
            (key, Token::ValueString { value, .. })
                if key.eq_ignore_ascii_case("SecretAccessKey") =>
            {
                secret_access_key = Some(value.to_unescaped()?)
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("SessionToken") => {
                session_token = Some(value.to_unescaped()?)
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("Expiration") => {
                expiration = Some(value.to_unescaped()?)
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("AccountId") => {
                account_id = Some(value.to_unescaped()?)
            }
            _ => {}
        };
        Ok(())
    })?;

    match version {
        Some(Number::PosInt(1)) => {}
        Some(Number::Float(v)) if v == 1.0 => {}
        None => return Err(InvalidJsonCredentials::MissingField("Version")),
        Some(Number::PosInt(v)) => {
            return Err(InvalidJsonCredentials::UnsupportedVersion(v.to_string()))
        }
        Some(Number::NegInt(v)) => {
            return Err(InvalidJsonCredentials::UnsupportedVersion(v.to_string()))
        }
        Some(Number::Float(v)) => {
            return Err(InvalidJsonCredentials::UnsupportedVersion(v.to_string()))
        }
    }
    let access_key_id = access_key_id.ok_or(InvalidJsonCredentials::MissingField("AccessKeyId"))?;
    let secret_access_key =
        secret_access_key.ok_or(InvalidJsonCredentials::MissingField("SecretAccessKey"))?;
    let session_token =
        session_token.ok_or(InvalidJsonCredentials::MissingField("SessionToken"))?;
    let expiration = expiration
        .map(|expiration| parse_expiration(&expiration))
        .transpose()?;
    Ok(ProcessCredentials {
        access_key_id,
        secret_access_key,
        session_token,
        expiration,
        account_id,
    })
}
