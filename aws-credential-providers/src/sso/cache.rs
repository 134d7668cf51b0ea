/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The on-disk SSO token cache, `~/.aws/sso/cache/<sha1 of key>.json`

use crate::fs_util::{home_dir, Os};
use crate::json_credentials::{json_parse_loop, InvalidJsonCredentials};
use crate::os_shim::{Env, Fs};
use aws_smithy_json::deserialize::Token;
use aws_smithy_json::serialize::JsonObjectWriter;
use aws_smithy_types::date_time::Format;
use aws_smithy_types::DateTime;
use sha1::{Digest, Sha1};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use zeroize::Zeroizing;

/// A token read from, or written to, the SSO cache
///
/// The fields other than the access token and its expiry are only needed to refresh the token.
/// They are written back unchanged so that a refreshable cache entry stays refreshable.
#[derive(Clone)]
pub(super) struct CachedSsoToken {
    pub(super) access_token: Zeroizing<String>,
    pub(super) expires_at: SystemTime,
    pub(super) refresh_token: Option<Zeroizing<String>>,
    pub(super) client_id: Option<String>,
    pub(super) client_secret: Option<Zeroizing<String>>,
    pub(super) registration_expires_at: Option<SystemTime>,
    pub(super) region: Option<String>,
    pub(super) start_url: Option<String>,
}

impl fmt::Debug for CachedSsoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: Option<&Zeroizing<String>>| value.map(|_| "** redacted **");
        f.debug_struct("CachedSsoToken")
            .field("access_token", &"** redacted **")
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &redacted(self.refresh_token.as_ref()))
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(self.client_secret.as_ref()))
            .field("registration_expires_at", &self.registration_expires_at)
            .field("region", &self.region)
            .field("start_url", &self.start_url)
            .finish()
    }
}

impl CachedSsoToken {
    /// A token can be refreshed with a refresh token and an unexpired client registration
    pub(super) fn is_refreshable(&self, now: SystemTime) -> bool {
        let registration_valid = self
            .registration_expires_at
            .map(|expires_at| now < expires_at)
            .unwrap_or(true);
        self.refresh_token.is_some()
            && self.client_id.is_some()
            && self.client_secret.is_some()
            && registration_valid
    }
}

#[derive(Debug)]
pub(crate) enum SsoTokenError {
    /// No home directory, so no cache directory
    NoHomeDirectory,

    /// The cache file could not be read
    MissingCache { path: PathBuf, source: std::io::Error },

    /// The cache file was not valid JSON
    InvalidToken(InvalidJsonCredentials),

    /// A required field was missing
    MissingField(&'static str),

    /// A field could not be parsed
    InvalidField {
        field: &'static str,
        source: Box<dyn Error + Send + Sync>,
    },

    /// The cached token of an `sso-session` expired and could not be refreshed
    ExpiredToken {
        session_name: String,
        source: Option<Box<dyn Error + Send + Sync>>,
    },

    /// The token of a legacy SSO profile expired
    SessionExpired,

    /// The refreshed token could not be written back
    WriteFailed { path: PathBuf, source: std::io::Error },

    /// An expiry could not be formatted
    FailedToFormatDateTime { source: Box<dyn Error + Send + Sync> },
}

impl fmt::Display for SsoTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsoTokenError::NoHomeDirectory => write!(f, "couldn't resolve a home directory"),
            SsoTokenError::MissingCache { .. } => write!(
                f,
                "Invalid or missing SSO session cache. Run `aws sso login` to initiate a new SSO session"
            ),
            SsoTokenError::InvalidToken(_) => write!(f, "invalid cached SSO token"),
            SsoTokenError::MissingField(field) => write!(f, "missing `{}`", field),
            SsoTokenError::InvalidField { field, .. } => {
                write!(f, "invalid value for `{}` in cached SSO token", field)
            }
            SsoTokenError::ExpiredToken { session_name, .. } => {
                write!(f, "SSO token for sso-session: `{}` is expired", session_name)
            }
            SsoTokenError::SessionExpired => write!(
                f,
                "The SSO session has expired. To refresh this SSO session run `aws sso login` with the corresponding profile."
            ),
            SsoTokenError::WriteFailed { path, .. } => {
                write!(f, "failed to write `{}`", path.display())
            }
            SsoTokenError::FailedToFormatDateTime { .. } => write!(f, "failed to format date time"),
        }
    }
}

impl Error for SsoTokenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SsoTokenError::MissingCache { source, .. } => Some(source),
            SsoTokenError::InvalidToken(source) => Some(source),
            SsoTokenError::InvalidField { source, .. } => Some(source.as_ref()),
            SsoTokenError::ExpiredToken { source, .. } => match source {
                Some(err) => Some(err.as_ref()),
                None => None,
            },
            SsoTokenError::WriteFailed { source, .. } => Some(source),
            SsoTokenError::FailedToFormatDateTime { source } => Some(source.as_ref()),
            SsoTokenError::NoHomeDirectory
            | SsoTokenError::MissingField(_)
            | SsoTokenError::SessionExpired => None,
        }
    }
}

fn cache_dir(env: &Env) -> Result<PathBuf, SsoTokenError> {
    let home = home_dir(env, Os::real()).ok_or(SsoTokenError::NoHomeDirectory)?;
    Ok(PathBuf::from(home).join(".aws").join("sso").join("cache"))
}

/// `<cache_dir>/<lowercase hex sha1 of key>.json`
fn cached_token_path(cache_dir: &Path, key: &str) -> PathBuf {
    let mut path = cache_dir.join(hex::encode(Sha1::digest(key.as_bytes())));
    path.set_extension("json");
    path
}

/// Load the cached token for `key`
///
/// `key` is the session name for `sso-session` profiles and the start URL for legacy profiles.
pub(super) async fn load_cached_token(
    env: &Env,
    fs: &Fs,
    key: &str,
) -> Result<CachedSsoToken, SsoTokenError> {
    let path = cached_token_path(&cache_dir(env)?, key);
    let contents = Zeroizing::new(
        fs.read_to_end(&path)
            .await
            .map_err(|source| SsoTokenError::MissingCache { path, source })?,
    );
    parse_cached_token(&contents)
}

/// Write `token` to the cache file for `key`
pub(super) async fn save_cached_token(
    env: &Env,
    fs: &Fs,
    key: &str,
    token: &CachedSsoToken,
) -> Result<(), SsoTokenError> {
    let path = cached_token_path(&cache_dir(env)?, key);
    let expires_at = format_time(token.expires_at)?;
    let registration_expires_at = token
        .registration_expires_at
        .map(format_time)
        .transpose()?;

    let mut out = Zeroizing::new(String::new());
    let mut writer = JsonObjectWriter::new(&mut out);
    writer.key("accessToken").string(&token.access_token);
    writer.key("expiresAt").string(&expires_at);
    if let Some(refresh_token) = &token.refresh_token {
        writer.key("refreshToken").string(refresh_token);
    }
    if let Some(client_id) = &token.client_id {
        writer.key("clientId").string(client_id);
    }
    if let Some(client_secret) = &token.client_secret {
        writer.key("clientSecret").string(client_secret);
    }
    if let Some(registration_expires_at) = &registration_expires_at {
        writer
            .key("registrationExpiresAt")
            .string(registration_expires_at);
    }
    if let Some(region) = &token.region {
        writer.key("region").string(region);
    }
    if let Some(start_url) = &token.start_url {
        writer.key("startUrl").string(start_url);
    }
    writer.finish();

    fs.write(&path, out.as_bytes())
        .await
        .map_err(|source| SsoTokenError::WriteFailed { path, source })
}

fn format_time(time: SystemTime) -> Result<String, SsoTokenError> {
    DateTime::from(time)
        .fmt(Format::DateTime)
        .map_err(|err| SsoTokenError::FailedToFormatDateTime { source: err.into() })
}

fn parse_time(field: &'static str, value: &str) -> Result<SystemTime, SsoTokenError> {
    let invalid = |source: Box<dyn Error + Send + Sync>| SsoTokenError::InvalidField { field, source };
    let date_time = DateTime::from_str(value, Format::DateTime).map_err(|err| invalid(err.into()))?;
    SystemTime::try_from(date_time)
        .map_err(|_| invalid("timestamp cannot be represented by a SystemTime".into()))
}

/// Parse the contents of an SSO cache file
///
/// ```json
/// {
///   "accessToken": "base64string",
///   "expiresAt": "2019-11-14T04:05:45Z",
///   "refreshToken": "<opaque>",
///   "clientId": "ABCDEFG323242423121312312312312312",
///   "clientSecret": "ABCDE123",
///   "registrationExpiresAt": "2022-03-06T19:53:17Z",
///   "region": "us-west-2",
///   "startUrl": "https://d-abc123.awsapps.com/start"
/// }
/// ```
pub(super) fn parse_cached_token(contents: &[u8]) -> Result<CachedSsoToken, SsoTokenError> {
    let mut access_token = None;
    let mut expires_at = None;
    let mut refresh_token = None;
    let mut client_id = None;
    let mut client_secret = None;
    let mut registration_expires_at = None;
    let mut region = None;
    let mut start_url = None;
    json_parse_loop(contents, |key, value| {
        if let Token::ValueString { value, .. } = value {
            let value = value.to_unescaped()?.into_owned();
            match key.as_ref() {
                "accessToken" => access_token = Some(Zeroizing::new(value)),
                "expiresAt" => expires_at = Some(value),
                "refreshToken" => refresh_token = Some(Zeroizing::new(value)),
                "clientId" => client_id = Some(value),
                "clientSecret" => client_secret = Some(Zeroizing::new(value)),
                "registrationExpiresAt" => registration_expires_at = Some(value),
                "region" => region = Some(value),
                "startUrl" => start_url = Some(value),
                _ => {}
            }
        }
        Ok(())
    })
    .map_err(SsoTokenError::InvalidToken)?;

    let access_token = access_token.ok_or(SsoTokenError::MissingField("accessToken"))?;
    let expires_at = expires_at.ok_or(SsoTokenError::MissingField("expiresAt"))?;
    Ok(CachedSsoToken {
        access_token,
        expires_at: parse_time("expiresAt", &expires_at)?,
        refresh_token,
        client_id,
        client_secret,
        registration_expires_at: registration_expires_at
            .map(|value| parse_time("registrationExpiresAt", &value))
            .transpose()?,
        region,
        start_url,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, UNIX_EPOCH};

    const CACHE_DIR: &str = "/home/someuser/.aws/sso/cache";

    #[cfg_attr(windows, ignore)]
    #[test]
    fn cache_file_names() {
        let dir = PathBuf::from(CACHE_DIR);
        assert_eq!(
            "/home/someuser/.aws/sso/cache/40a89917e3175433e361b710a9d43528d7f1890a.json",
            cached_token_path(&dir, "https://d-abc123.awsapps.com/start").as_os_str()
        );
        assert_eq!(
            "/home/someuser/.aws/sso/cache/d033e22ae348aeb5660fc2140aec35850c4da997.json",
            cached_token_path(&dir, "admin").as_os_str()
        );
    }

    #[test]
    fn parse_full_token() {
        let token = parse_cached_token(
            br#"{
                "accessToken": "cachedtoken",
                "expiresAt": "2021-12-25T21:30:00Z",
                "refreshToken": "cachedrefreshtoken",
                "clientId": "clientid",
                "clientSecret": "YSBzZWNyZXQ=",
                "registrationExpiresAt": "2022-12-25T13:30:00Z",
                "region": "us-west-2",
                "startUrl": "https://d-123.awsapps.com/start",
                "unknownField": {"nested": true}
            }"#,
        )
        .expect("valid token");
        assert_eq!("cachedtoken", token.access_token.as_str());
        assert_eq!(
            UNIX_EPOCH + Duration::from_secs(1640467800),
            token.expires_at
        );
        assert_eq!(
            Some("cachedrefreshtoken"),
            token.refresh_token.as_deref().map(String::as_str)
        );
        assert_eq!(Some("clientid"), token.client_id.as_deref());
        assert_eq!(
            Some(UNIX_EPOCH + Duration::from_secs(1671975000)),
            token.registration_expires_at
        );
        assert_eq!(Some("us-west-2"), token.region.as_deref());
        assert_eq!(
            Some("https://d-123.awsapps.com/start"),
            token.start_url.as_deref()
        );
        assert!(token.is_refreshable(UNIX_EPOCH + Duration::from_secs(1671975000 - 1)));
        assert!(!token.is_refreshable(UNIX_EPOCH + Duration::from_secs(1671975000)));
    }

    #[test]
    fn parse_errors() {
        let err = parse_cached_token(br#"{"expiresAt": "2021-12-25T21:30:00Z"}"#)
            .expect_err("no access token");
        assert_eq!("missing `accessToken`", err.to_string());

        let err = parse_cached_token(br#"{"accessToken": "token"}"#).expect_err("no expiry");
        assert_eq!("missing `expiresAt`", err.to_string());

        let err = parse_cached_token(b"not json").expect_err("invalid");
        assert_eq!("invalid cached SSO token", err.to_string());

        let err = parse_cached_token(br#"{"accessToken": "token", "expiresAt": "yesterday"}"#)
            .expect_err("invalid expiry");
        assert!(matches!(
            err,
            SsoTokenError::InvalidField {
                field: "expiresAt",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_cache_file() {
        let err = load_cached_token(
            &Env::from_slice(&[("HOME", "/home")]),
            &Fs::from_slice(&[]),
            "session",
        )
        .await
        .expect_err("no cache");
        assert_eq!(
            "Invalid or missing SSO session cache. Run `aws sso login` to initiate a new SSO session",
            err.to_string()
        );
    }

    #[cfg_attr(windows, ignore)]
    #[tokio::test]
    async fn save_then_load() {
        let env = Env::from_slice(&[("HOME", "/home/someuser")]);
        let fs = Fs::from_map(HashMap::<String, Vec<u8>>::new());
        let token = CachedSsoToken {
            access_token: Zeroizing::new("token".into()),
            expires_at: UNIX_EPOCH + Duration::from_secs(1640467800),
            refresh_token: None,
            client_id: Some("clientid".into()),
            client_secret: Some(Zeroizing::new("secret".into())),
            registration_expires_at: None,
            region: Some("us-east-1".into()),
            start_url: None,
        };
        save_cached_token(&env, &fs, "admin", &token)
            .await
            .expect("write succeeds");

        let contents = fs.fake_contents().expect("fake fs");
        let written = contents
            .get(std::ffi::OsStr::new(
                "/home/someuser/.aws/sso/cache/d033e22ae348aeb5660fc2140aec35850c4da997.json",
            ))
            .expect("file written");
        let json: serde_json::Value = serde_json::from_slice(written).unwrap();
        assert_eq!(
            serde_json::json!({
                "accessToken": "token",
                "expiresAt": "2021-12-25T21:30:00Z",
                "clientId": "clientid",
                "clientSecret": "secret",
                "region": "us-east-1"
            }),
            json
        );

        let loaded = load_cached_token(&env, &fs, "admin").await.expect("valid");
        assert_eq!("token", loaded.access_token.as_str());
        assert_eq!(None, loaded.refresh_token.as_deref().map(String::as_str));
    }
}
