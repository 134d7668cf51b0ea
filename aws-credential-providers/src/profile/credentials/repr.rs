/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Flattened Representation of an AssumeRole chain
//!
//! Assume Role credentials in profile files can chain together credentials from multiple
//! different providers with subsequent credentials being used to configure subsequent providers.
//!
//! This module can parse and resolve the profile chain into a flattened representation with
//! 1-credential-per row (as opposed to a direct profile file representation which can combine
//! multiple actions into the same profile).

use crate::profile::credentials::{ProfileFileError, Section};
use crate::profile::{Profile, SharedConfig};
use crate::Credentials;

/// Chain of Profile Providers
///
/// Within a profile file, a chain of providers is produced. Starting with a base provider,
/// subsequent providers use the credentials from previous providers to perform their task.
///
/// ProfileChain is a direct representation of the Profile. It can contain named providers
/// that don't actually have implementations.
#[derive(Debug)]
pub(super) struct ProfileChain<'a> {
    pub(super) base: BaseProvider<'a>,
    pub(super) chain: Vec<RoleArn<'a>>,
}

impl<'a> ProfileChain<'a> {
    pub(super) fn base(&self) -> &BaseProvider<'a> {
        &self.base
    }

    pub(super) fn chain(&self) -> &[RoleArn<'a>] {
        self.chain.as_slice()
    }
}

/// A base member of the profile chain
///
/// Base providers do not require input credentials to provide their own credentials,
/// e.g. IMDS, ECS, Environment variables
#[derive(Debug, Clone)]
pub(super) enum BaseProvider<'a> {
    /// A profile that specifies a named credential source
    /// Eg: `credential_source = Ec2InstanceMetadata`
    ///
    /// The following profile produces two separate `ProfileProvider` rows:
    /// 1. `BaseProvider::NamedSource("Ec2InstanceMetadata")`
    /// 2. `RoleArn { role_arn: "...", ... }
    /// ```ini
    /// [profile assume-role]
    /// role_arn = arn:aws:iam::123456789:role/MyRole
    /// credential_source = Ec2InstanceMetadata
    /// ```
    NamedSource(&'a str),

    /// A profile with explicitly configured access keys
    ///
    /// Example
    /// ```ini
    /// [profile C]
    /// aws_access_key_id = abc123
    /// aws_secret_access_key = def456
    /// ```
    AccessKey(Credentials),

    WebIdentityTokenRole {
        role_arn: &'a str,
        web_identity_token_file: &'a str,
        session_name: Option<&'a str>,
    },

    /// An SSO provider configured through an `[sso-session]` section
    SsoSession {
        session_name: &'a str,
        start_url: &'a str,
        region: &'a str,
        account_id: &'a str,
        role_name: &'a str,
    },

    /// An SSO provider configured entirely in the profile
    LegacySso {
        start_url: &'a str,
        region: &'a str,
        account_id: &'a str,
        role_name: &'a str,
    },

    /// A profile that specifies a `credential_process`
    /// ```ini
    /// [profile assume-role]
    /// credential_process = /opt/bin/awscreds-custom --username helen
    /// ```
    CredentialProcess(&'a str),
}

/// How a role hop obtains its input credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RoleSource {
    SourceProfile,
    CredentialSource,
}

/// A profile that specifies a role to assume
///
/// A RoleArn can only be created from either a profile with `source_profile`
/// or one with `credential_source`.
#[derive(Debug, Clone)]
pub(super) struct RoleArn<'a> {
    /// Role to assume
    pub(super) role_arn: &'a str,
    /// external_id parameter to pass to the assume role provider
    pub(super) external_id: Option<&'a str>,

    /// session name parameter to pass to the assume role provider
    pub(super) session_name: Option<&'a str>,

    pub(super) source: RoleSource,
}

/// Resolve a ProfileChain from a SharedConfig or return an error
pub(super) fn resolve_chain(config: &SharedConfig) -> Result<ProfileChain<'_>, ProfileFileError> {
    if config.is_empty() {
        return Err(ProfileFileError::NoProfilesDefined);
    }
    let mut source_profile_name = config.selected_profile();
    let mut visited_profiles: Vec<&str> = vec![];
    let mut chain = vec![];
    let base = loop {
        let profile = config.get_profile(source_profile_name).ok_or_else(|| {
            ProfileFileError::MissingProfile {
                profile: source_profile_name.to_string(),
                referenced_from: visited_profiles.last().map(|name| name.to_string()),
            }
        })?;
        if visited_profiles.contains(&source_profile_name) {
            return Err(ProfileFileError::CredentialLoop {
                profiles: visited_profiles
                    .into_iter()
                    .map(|s| s.to_string())
                    .collect(),
                next: source_profile_name.to_string(),
            });
        }
        visited_profiles.push(source_profile_name);

        // static credentials have the highest precedence
        if let Some(credentials) = static_creds_from_profile(profile) {
            break BaseProvider::AccessKey(credentials);
        }

        // the existence of `role_arn` is the only signal that multiple profiles will be chained
        match role_arn_from_profile(profile) {
            Some(role_arn) => chain.push(role_arn),
            None => break base_provider(config, profile)?,
        }

        match chain_provider(profile)? {
            NextProfile::SelfReference => {
                // a profile that sources itself, or names a credential source, is its own base
                break base_provider(config, profile)?;
            }
            NextProfile::Named(name) => source_profile_name = name,
        }
    };
    chain.reverse();
    Ok(ProfileChain { base, chain })
}

mod role {
    pub(super) const ROLE_ARN: &str = "role_arn";
    pub(super) const EXTERNAL_ID: &str = "external_id";
    pub(super) const SESSION_NAME: &str = "role_session_name";

    pub(super) const CREDENTIAL_SOURCE: &str = "credential_source";
    pub(super) const SOURCE_PROFILE: &str = "source_profile";
}

mod web_identity_token {
    pub(super) const TOKEN_FILE: &str = "web_identity_token_file";
}

mod static_credentials {
    pub(super) const AWS_ACCESS_KEY_ID: &str = "aws_access_key_id";
    pub(super) const AWS_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
    pub(super) const AWS_SESSION_TOKEN: &str = "aws_session_token";
    pub(super) const AWS_ACCOUNT_ID: &str = "aws_account_id";
}

mod sso {
    pub(super) const START_URL: &str = "sso_start_url";
    pub(super) const REGION: &str = "sso_region";
    pub(super) const ACCOUNT_ID: &str = "sso_account_id";
    pub(super) const ROLE_NAME: &str = "sso_role_name";
    pub(super) const SESSION_NAME: &str = "sso_session";
}

mod credential_process {
    pub(super) const CREDENTIAL_PROCESS: &str = "credential_process";
}

const PROVIDER_NAME: &str = "ProfileFile";

fn base_provider<'a>(
    config: &'a SharedConfig,
    profile: &'a Profile,
) -> Result<BaseProvider<'a>, ProfileFileError> {
    // the profile must define either a `CredentialsSource` or a concrete set of access keys
    if let Some(source) = profile.get(role::CREDENTIAL_SOURCE) {
        return Ok(BaseProvider::NamedSource(source));
    }
    // stop at the first provider that claims the profile, so that its error is the one reported
    if let Some(provider) = web_identity_token_from_profile(profile) {
        return provider;
    }
    if let Some(provider) = sso_session_from_profile(config, profile) {
        return provider;
    }
    if let Some(provider) = legacy_sso_from_profile(profile) {
        return provider;
    }
    credential_process_from_profile(profile)
}

enum NextProfile<'a> {
    SelfReference,
    Named(&'a str),
}

fn chain_provider(profile: &Profile) -> Result<NextProfile<'_>, ProfileFileError> {
    let (source_profile, credential_source) = (
        profile.get(role::SOURCE_PROFILE),
        profile.get(role::CREDENTIAL_SOURCE),
    );
    match (source_profile, credential_source) {
        (Some(_), Some(_)) => Err(ProfileFileError::ConflictingCredentialSource {
            profile: profile.name().to_string(),
        }),
        (None, None) => Err(ProfileFileError::MissingCredentialSource {
            profile: profile.name().to_string(),
        }),
        (Some(source_profile), None) if source_profile == profile.name() => {
            Ok(NextProfile::SelfReference)
        }
        (Some(source_profile), None) => Ok(NextProfile::Named(source_profile)),
        // loop back into this profile and pick up the credential source
        (None, Some(_)) => Ok(NextProfile::SelfReference),
    }
}

fn role_arn_from_profile(profile: &Profile) -> Option<RoleArn<'_>> {
    let has_source =
        profile.contains(role::CREDENTIAL_SOURCE) || profile.contains(role::SOURCE_PROFILE);
    // web identity tokens are leaf providers, not chained roles
    if !has_source && profile.contains(web_identity_token::TOKEN_FILE) {
        return None;
    }
    let role_arn = profile.get(role::ROLE_ARN)?;
    let source = if profile.contains(role::CREDENTIAL_SOURCE) {
        RoleSource::CredentialSource
    } else {
        RoleSource::SourceProfile
    };
    Some(RoleArn {
        role_arn,
        external_id: profile.get(role::EXTERNAL_ID),
        session_name: profile.get(role::SESSION_NAME),
        source,
    })
}

fn web_identity_token_from_profile(
    profile: &Profile,
) -> Option<Result<BaseProvider<'_>, ProfileFileError>> {
    let web_identity_token_file = profile.get(web_identity_token::TOKEN_FILE)?;
    let role_arn = match profile.get(role::ROLE_ARN) {
        Some(role_arn) => role_arn,
        None => return Some(Err(missing_field(profile, role::ROLE_ARN))),
    };
    Some(Ok(BaseProvider::WebIdentityTokenRole {
        role_arn,
        web_identity_token_file,
        session_name: profile.get(role::SESSION_NAME),
    }))
}

fn sso_session_from_profile<'a>(
    config: &'a SharedConfig,
    profile: &'a Profile,
) -> Option<Result<BaseProvider<'a>, ProfileFileError>> {
    let session_name = profile.get(sso::SESSION_NAME)?;
    Some(sso_session(config, profile, session_name))
}

fn sso_session<'a>(
    config: &'a SharedConfig,
    profile: &'a Profile,
    session_name: &'a str,
) -> Result<BaseProvider<'a>, ProfileFileError> {
    let session = config.sso_session(session_name).ok_or_else(|| {
        ProfileFileError::MissingSsoSession {
            profile: profile.name().to_string(),
            sso_session: session_name.to_string(),
        }
    })?;
    let start_url = session
        .get(sso::START_URL)
        .ok_or_else(|| missing_session_field(session, sso::START_URL))?;
    let region = session
        .get(sso::REGION)
        .ok_or_else(|| missing_session_field(session, sso::REGION))?;
    let account_id = profile
        .get(sso::ACCOUNT_ID)
        .ok_or_else(|| missing_field(profile, sso::ACCOUNT_ID))?;
    let role_name = profile
        .get(sso::ROLE_NAME)
        .ok_or_else(|| missing_field(profile, sso::ROLE_NAME))?;
    for (key, session_value) in [(sso::REGION, region), (sso::START_URL, start_url)] {
        if let Some(profile_value) = profile.get(key) {
            if profile_value != session_value {
                return Err(ProfileFileError::SsoSessionMismatch {
                    profile: profile.name().to_string(),
                    sso_session: session_name.to_string(),
                    key,
                    session_value: session_value.to_string(),
                    profile_value: profile_value.to_string(),
                });
            }
        }
    }
    Ok(BaseProvider::SsoSession {
        session_name,
        start_url,
        region,
        account_id,
        role_name,
    })
}

fn legacy_sso_from_profile(profile: &Profile) -> Option<Result<BaseProvider<'_>, ProfileFileError>> {
    // either of these keys means the profile must be resolved by SSO
    if !profile.contains(sso::ACCOUNT_ID) && !profile.contains(sso::ROLE_NAME) {
        return None;
    }
    Some(legacy_sso(profile))
}

fn legacy_sso(profile: &Profile) -> Result<BaseProvider<'_>, ProfileFileError> {
    let require = move |key: &'static str| {
        profile
            .get(key)
            .ok_or_else(|| missing_field(profile, key))
    };
    Ok(BaseProvider::LegacySso {
        start_url: require(sso::START_URL)?,
        region: require(sso::REGION)?,
        account_id: require(sso::ACCOUNT_ID)?,
        role_name: require(sso::ROLE_NAME)?,
    })
}

/// Process is last in precedence: no `credential_process` means the profile has no credentials
fn credential_process_from_profile(profile: &Profile) -> Result<BaseProvider<'_>, ProfileFileError> {
    if let Some(command) = profile.get(credential_process::CREDENTIAL_PROCESS) {
        return Ok(BaseProvider::CredentialProcess(command));
    }
    let access_key = profile.contains(static_credentials::AWS_ACCESS_KEY_ID);
    let secret_key = profile.contains(static_credentials::AWS_SECRET_ACCESS_KEY);
    Err(match (access_key, secret_key) {
        (true, false) => missing_field(profile, static_credentials::AWS_SECRET_ACCESS_KEY),
        (false, true) => missing_field(profile, static_credentials::AWS_ACCESS_KEY_ID),
        _ => ProfileFileError::ProfileDidNotContainCredentials {
            profile: profile.name().to_string(),
        },
    })
}

/// Load static credentials from a profile
///
/// Example:
/// ```ini
/// [profile B]
/// aws_access_key_id = abc123
/// aws_secret_access_key = def456
/// ```
fn static_creds_from_profile(profile: &Profile) -> Option<Credentials> {
    use static_credentials::*;
    let access_key = profile.get(AWS_ACCESS_KEY_ID)?;
    let secret_key = profile.get(AWS_SECRET_ACCESS_KEY)?;
    let mut builder = Credentials::builder()
        .access_key_id(access_key)
        .secret_access_key(secret_key)
        .provider_name(PROVIDER_NAME);
    builder.set_session_token(profile.get(AWS_SESSION_TOKEN).map(ToString::to_string));
    builder.set_account_id(profile.get(AWS_ACCOUNT_ID).map(Into::into));
    Some(builder.build())
}

fn missing_field(profile: &Profile, field: &'static str) -> ProfileFileError {
    ProfileFileError::MissingField {
        section: Section::Profile,
        name: profile.name().to_string(),
        field,
    }
}

fn missing_session_field(session: &Profile, field: &'static str) -> ProfileFileError {
    ProfileFileError::MissingField {
        section: Section::SsoSession,
        name: session.name().to_string(),
        field,
    }
}
