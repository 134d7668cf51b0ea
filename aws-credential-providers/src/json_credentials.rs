/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use aws_smithy_json::deserialize::token::skip_value;
use aws_smithy_json::deserialize::{json_token_iter, EscapeError, Token};
use aws_smithy_types::date_time::Format;
use aws_smithy_types::DateTime;
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::SystemTime;

/// A credentials response could not be turned into credentials
#[derive(Debug)]
pub enum InvalidJsonCredentials {
    /// The response did not contain valid JSON
    JsonError(Box<dyn Error + Send + Sync>),

    /// The response was missing a required field
    MissingField(&'static str),

    /// A field was invalid
    InvalidField {
        /// The name of the invalid field
        field: &'static str,
        /// Why the field was invalid
        err: Box<dyn Error + Send + Sync>,
    },

    /// A process credentials document declared a version other than 1
    UnsupportedVersion(String),

    /// Another unhandled error occurred
    Other(Cow<'static, str>),
}

impl From<EscapeError> for InvalidJsonCredentials {
    fn from(err: EscapeError) -> Self {
        InvalidJsonCredentials::JsonError(err.into())
    }
}

impl From<aws_smithy_json::deserialize::error::DeserializeError> for InvalidJsonCredentials {
    fn from(err: aws_smithy_json::deserialize::error::DeserializeError) -> Self {
        InvalidJsonCredentials::JsonError(err.into())
    }
}

impl Display for InvalidJsonCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InvalidJsonCredentials::JsonError(_) => {
                write!(f, "invalid JSON credentials response")
            }
            InvalidJsonCredentials::MissingField(field) => write!(f, "missing field `{}`", field),
            InvalidJsonCredentials::InvalidField { field, err } => {
                write!(f, "invalid field `{}` in response: {}", field, err)
            }
            InvalidJsonCredentials::UnsupportedVersion(version) => {
                write!(f, "version {} is not supported", version)
            }
            InvalidJsonCredentials::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for InvalidJsonCredentials {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InvalidJsonCredentials::JsonError(err) => Some(err.as_ref() as _),
            InvalidJsonCredentials::InvalidField { err, .. } => Some(err.as_ref() as _),
            _ => None,
        }
    }
}

/// Session credentials parsed out of a JSON document
#[derive(PartialEq, Eq)]
pub(crate) struct RefreshableCredentials<'a> {
    pub(crate) access_key_id: Cow<'a, str>,
    pub(crate) secret_access_key: Cow<'a, str>,
    pub(crate) session_token: Cow<'a, str>,
    pub(crate) expiration: SystemTime,
    pub(crate) account_id: Option<Cow<'a, str>>,
}

impl fmt::Debug for RefreshableCredentials<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshableCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// A JSON credentials document, classified on its `Code` field
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum JsonCredentials<'a> {
    RefreshableCredentials(RefreshableCredentials<'a>),
    Error {
        code: Cow<'a, str>,
        message: Cow<'a, str>,
    },
}

/// Deserialize an IMDS or ECS credential response
///
/// In general, the document looks something like:
///
/// ```json
/// {
///     "Code" : "Success",
///     "LastUpdated" : "2019-05-28T18:03:09Z",
///     "Type" : "AWS-HMAC",
///     "AccessKeyId" : "...",
///     "SecretAccessKey" : "...",
///     "Token" : "...",
///     "Expiration" : "2019-05-29T00:21:43Z"
/// }
/// ```
///
/// A missing `Code` is treated as success. Keys are case insensitive and unknown keys are ignored.
pub(crate) fn parse_json_credentials(
    credentials_response: &str,
) -> Result<JsonCredentials<'_>, InvalidJsonCredentials> {
    let mut code = None;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;
    let mut expiration = None;
    let mut account_id = None;
    let mut message = None;
    json_parse_loop(credentials_response.as_bytes(), |key, value| {
        match (key, value) {
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("Code") => {
                code = Some(value.to_unescaped()?);
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("AccessKeyId") => {
                access_key_id = Some(value.to_unescaped()?);
            }
            (key, Token::ValueString { value, .. })
                if key.eq_ignore_ascii_case("SecretAccessKey") =>
            {
                secret_access_key = Some(value.to_unescaped()?);
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("Token") => {
                session_token = Some(value.to_unescaped()?);
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("Expiration") => {
                expiration = Some(value.to_unescaped()?);
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("AccountId") => {
                account_id = Some(value.to_unescaped()?);
            }
            (key, Token::ValueString { value, .. }) if key.eq_ignore_ascii_case("Message") => {
                message = Some(value.to_unescaped()?);
            }
            _ => {}
        };
        Ok(())
    })?;
    match code {
        // IMDS does not appear to reply with an `Code` missing, but documentation indicates it
        // may be possible
        None => {}
        Some(code) if code.eq_ignore_ascii_case("success") => {}
        Some(code) => {
            return Ok(JsonCredentials::Error {
                code,
                message: message.unwrap_or_default(),
            })
        }
    }
    let access_key_id = access_key_id.ok_or(InvalidJsonCredentials::MissingField("AccessKeyId"))?;
    let secret_access_key =
        secret_access_key.ok_or(InvalidJsonCredentials::MissingField("SecretAccessKey"))?;
    let session_token = session_token.ok_or(InvalidJsonCredentials::MissingField("Token"))?;
    let expiration = expiration.ok_or(InvalidJsonCredentials::MissingField("Expiration"))?;
    let expiration = parse_expiration(&expiration)?;
    Ok(JsonCredentials::RefreshableCredentials(
        RefreshableCredentials {
            access_key_id,
            secret_access_key,
            session_token,
            expiration,
            account_id,
        },
    ))
}

/// Parse an ISO-8601 `Expiration` value into a `SystemTime`
pub(crate) fn parse_expiration(expiration: &str) -> Result<SystemTime, InvalidJsonCredentials> {
    SystemTime::try_from(
        DateTime::from_str(expiration, Format::DateTime).map_err(|err| {
            InvalidJsonCredentials::InvalidField {
                field: "Expiration",
                err: err.into(),
            }
        })?,
    )
    .map_err(|_| {
        InvalidJsonCredentials::Other(
            "credential expiration time cannot be represented by a SystemTime".into(),
        )
    })
}

/// Visit every top-level key of a JSON object
///
/// `f` is called with each key and the first token of its value. Nested values are skipped after
/// `f` returns, so callers only need to handle scalars they care about.
pub(crate) fn json_parse_loop<'a>(
    input: &'a [u8],
    mut f: impl FnMut(Cow<'a, str>, &Token<'a>) -> Result<(), InvalidJsonCredentials>,
) -> Result<(), InvalidJsonCredentials> {
    let mut tokens = json_token_iter(input).peekable();
    if !matches!(tokens.next().transpose()?, Some(Token::StartObject { .. })) {
        return Err(InvalidJsonCredentials::JsonError(
            "expected a JSON document starting with `{`".into(),
        ));
    }
    loop {
        match tokens.next().transpose()? {
            Some(Token::EndObject { .. }) => break,
            Some(Token::ObjectKey { key, .. }) => {
                if let Some(Ok(token)) = tokens.peek() {
                    let key = key.to_unescaped()?;
                    f(key, token)?
                }
                skip_value(&mut tokens)?;
            }
            other => {
                return Err(InvalidJsonCredentials::JsonError(
                    format!("expected object key, found: {:?}", other).into(),
                ));
            }
        }
    }
    if tokens.next().is_some() {
        return Err(InvalidJsonCredentials::JsonError(
            "found more JSON tokens after completing parsing".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::json_credentials::{
        parse_json_credentials, InvalidJsonCredentials, JsonCredentials, RefreshableCredentials,
    };
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn json_credentials_success_response() {
        let response = r#"
        {
          "Code" : "Success",
          "LastUpdated" : "2021-09-17T20:57:08Z",
          "Type" : "AWS-HMAC",
          "AccessKeyId" : "ASIARTEST",
          "SecretAccessKey" : "xjtest",
          "Token" : "IQote///test",
          "Expiration" : "2021-09-18T03:31:56Z"
        }"#;
        let parsed = parse_json_credentials(response).expect("valid JSON");
        assert_eq!(
            parsed,
            JsonCredentials::RefreshableCredentials(RefreshableCredentials {
                access_key_id: "ASIARTEST".into(),
                secret_access_key: "xjtest".into(),
                session_token: "IQote///test".into(),
                expiration: UNIX_EPOCH + Duration::from_secs(1631935916),
                account_id: None,
            })
        )
    }

    #[test]
    fn json_credentials_missing_code_with_unknown_fields() {
        let response = r#"
        {
          "AccessKeyId" : "ASIARTEST",
          "SecretAccessKey" : "xjtest",
          "Token" : "IQote///test",
          "Expiration" : "2021-09-18T03:31:56Z",
          "AccountId": "123456789101",
          "Unexpected": { "nested": [1, 2, 3] },
          "AlsoUnexpected": 5
        }"#;
        match parse_json_credentials(response).expect("valid JSON") {
            JsonCredentials::RefreshableCredentials(creds) => {
                assert_eq!("ASIARTEST", creds.access_key_id);
                assert_eq!(Some("123456789101"), creds.account_id.as_deref());
            }
            other => panic!("expected credentials, got: {:?}", other),
        }
    }

    #[test]
    fn json_credentials_missing_token() {
        let response = r#"
        {
          "Code" : "Success",
          "AccessKeyId" : "ASIARTEST",
          "SecretAccessKey" : "xjtest",
          "Expiration" : "2021-09-18T03:31:56Z"
        }"#;
        let err = parse_json_credentials(response).expect_err("missing token");
        assert!(
            matches!(err, InvalidJsonCredentials::MissingField("Token")),
            "{:?}",
            err
        );
        assert!(err.to_string().contains("`Token`"));
    }

    #[test]
    fn json_credentials_error_document() {
        let response = r#"
        {
          "Code" : "AssumeRoleUnauthorizedAccess",
          "Message" : "EC2 cannot assume the role integration-test.",
          "LastUpdated" : "2021-09-17T20:46:56Z"
        }"#;
        let parsed = parse_json_credentials(response).expect("valid JSON");
        assert_eq!(
            parsed,
            JsonCredentials::Error {
                code: "AssumeRoleUnauthorizedAccess".into(),
                message: "EC2 cannot assume the role integration-test.".into(),
            }
        );
    }

    #[test]
    fn success_code_is_case_insensitive() {
        let response = r#"{"Code":"SUCCESS","AccessKeyId":"a","SecretAccessKey":"b","Token":"c","Expiration":"2021-09-18T03:31:56Z"}"#;
        assert!(matches!(
            parse_json_credentials(response),
            Ok(JsonCredentials::RefreshableCredentials(_))
        ));
    }

    #[test]
    fn malformed_json() {
        for response in ["", "[]", "{\"Code\": ", "{} {}", "not json"] {
            let err = parse_json_credentials(response).expect_err("invalid JSON");
            assert_eq!(
                "invalid JSON credentials response",
                err.to_string(),
                "{}",
                response
            );
        }
    }
}
