/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use super::{codes, ExecutableError};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wif_types::subject_token::{TOKEN_TYPE_ID_TOKEN, TOKEN_TYPE_JWT, TOKEN_TYPE_SAML2};
use wif_types::{SubjectToken, SubjectTokenType};

/// Highest response version this crate understands
pub const EXECUTABLE_SUPPORTED_MAX_VERSION: u32 = 1;

/// Response written by an executable to stdout or to its output file
///
/// ```json
/// {
///   "version": 1,
///   "success": true,
///   "token_type": "urn:ietf:params:oauth:token-type:id_token",
///   "id_token": "HEADER.PAYLOAD.SIGNATURE",
///   "expiration_time": 1620499962
/// }
/// ```
///
/// Failures carry `code` and `message` instead of a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutableResponse {
    version: u32,
    success: bool,
    token: Option<SubjectToken>,
    expiration_time: Option<SystemTime>,
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct RawResponse {
    version: Option<u32>,
    success: Option<bool>,
    token_type: Option<String>,
    id_token: Option<String>,
    saml_response: Option<String>,
    expiration_time: Option<u64>,
    code: Option<String>,
    message: Option<String>,
}

/// Why bytes could not be turned into an [`ExecutableResponse`]
#[derive(Debug)]
pub(crate) enum ParseResponseError {
    /// Not JSON, or a field had the wrong JSON type
    Json(serde_json::Error),
    /// Well-formed JSON that breaks the response protocol
    Invalid(ExecutableError),
}

fn missing(field: &str) -> ParseResponseError {
    ParseResponseError::Invalid(ExecutableError::new(
        codes::INVALID_EXECUTABLE_RESPONSE,
        format!("The executable response is missing the `{}` field.", field),
    ))
}

impl ExecutableResponse {
    pub(crate) fn from_slice(body: &[u8]) -> Result<Self, ParseResponseError> {
        let raw: RawResponse = serde_json::from_slice(body).map_err(ParseResponseError::Json)?;
        let version = raw.version.ok_or_else(|| missing("version"))?;
        let success = raw.success.ok_or_else(|| missing("success"))?;
        let expiration_time = raw
            .expiration_time
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

        if !success {
            return Ok(ExecutableResponse {
                version,
                success,
                token: None,
                expiration_time,
                error_code: Some(raw.code.ok_or_else(|| missing("code"))?),
                error_message: Some(raw.message.ok_or_else(|| missing("message"))?),
            });
        }

        let token_type = raw.token_type.ok_or_else(|| missing("token_type"))?;
        let token = match token_type.as_str() {
            TOKEN_TYPE_JWT | TOKEN_TYPE_ID_TOKEN => {
                raw.id_token.ok_or_else(|| missing("id_token"))?
            }
            TOKEN_TYPE_SAML2 => raw.saml_response.ok_or_else(|| missing("saml_response"))?,
            other => {
                return Err(ParseResponseError::Invalid(ExecutableError::new(
                    codes::UNSUPPORTED_TOKEN_TYPE,
                    format!("Invalid executable response. The token type `{}` is not supported.", other),
                )))
            }
        };
        Ok(ExecutableResponse {
            version,
            success,
            token: Some(SubjectToken::new(
                token,
                SubjectTokenType::from_urn(&token_type),
            )),
            expiration_time,
            error_code: None,
            error_message: None,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// The subject token of a successful response
    pub fn token(&self) -> Option<&SubjectToken> {
        self.token.as_ref()
    }

    pub fn expiration_time(&self) -> Option<SystemTime> {
        self.expiration_time
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Responses without an expiration time never expire
    pub fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expiration_time, Some(expiration) if expiration <= now)
    }

    /// True when the response can be reused from the output file without running the executable
    pub(crate) fn is_reusable(&self, now: SystemTime) -> bool {
        self.success && self.expiration_time.is_some() && !self.is_expired(now)
    }

    /// Checks version, then success, then expiration, and returns the subject token
    pub(crate) fn into_subject_token(self, now: SystemTime) -> Result<SubjectToken, ExecutableError> {
        if self.version > EXECUTABLE_SUPPORTED_MAX_VERSION {
            return Err(ExecutableError::new(
                codes::UNSUPPORTED_VERSION,
                format!(
                    "The version of the executable response is not supported. The maximum version currently supported is {}.",
                    EXECUTABLE_SUPPORTED_MAX_VERSION
                ),
            ));
        }
        if !self.success {
            return Err(ExecutableError::new(
                self.error_code.unwrap_or_default(),
                self.error_message.unwrap_or_default(),
            ));
        }
        if self.is_expired(now) {
            return Err(ExecutableError::new(
                codes::INVALID_RESPONSE,
                "The executable response is expired.",
            ));
        }
        self.token.ok_or_else(|| {
            ExecutableError::new(
                codes::INVALID_EXECUTABLE_RESPONSE,
                "The executable response is missing the subject token.",
            )
        })
    }
}
