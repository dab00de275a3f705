/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::{OAuthError, StsError};
use http::StatusCode;
use serde_json::{Map, Value};
use std::fmt;
use std::time::{Duration, SystemTime};
use wif_types::AccessToken;

/// A successful RFC 8693 token exchange response
#[derive(Clone, PartialEq, Eq)]
pub struct StsTokenExchangeResponse {
    access_token: AccessToken,
    issued_token_type: String,
    token_type: String,
    expires_in: Option<Duration>,
    refresh_token: Option<String>,
    scopes: Vec<String>,
    access_boundary_session_key: Option<String>,
}

impl fmt::Debug for StsTokenExchangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsTokenExchangeResponse")
            .field("access_token", &self.access_token)
            .field("issued_token_type", &self.issued_token_type)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "** redacted **"),
            )
            .field("scopes", &self.scopes)
            .field(
                "access_boundary_session_key",
                &self
                    .access_boundary_session_key
                    .as_ref()
                    .map(|_| "** redacted **"),
            )
            .finish()
    }
}

impl StsTokenExchangeResponse {
    /// The issued token. Its expiration is `now + expires_in`, or `None` when the response
    /// omitted `expires_in`.
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn issued_token_type(&self) -> &str {
        &self.issued_token_type
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn access_boundary_session_key(&self) -> Option<&str> {
        self.access_boundary_session_key.as_deref()
    }

    /// Parses a 2xx response body. `now` anchors the expiration of the issued token.
    pub(crate) fn parse(
        status: StatusCode,
        body: &[u8],
        now: SystemTime,
    ) -> Result<Self, StsError> {
        let json: Map<String, Value> = serde_json::from_slice(body).map_err(|err| {
            StsError::parse_with_source(status, "The response is not a JSON object.", err)
        })?;

        let access_token = required_string(&json, "access_token", status)?;
        let issued_token_type = required_string(&json, "issued_token_type", status)?;
        let token_type = required_string(&json, "token_type", status)?;

        let expires_in = match json.get("expires_in") {
            None | Some(Value::Null) => None,
            Some(value) => Some(Duration::from_secs(value.as_u64().ok_or_else(|| {
                StsError::parse(
                    status,
                    format!("Expected a number for expires_in but got: {}", value),
                )
            })?)),
        };
        let refresh_token = optional_string(&json, "refresh_token", status)?;
        let scopes = optional_string(&json, "scope", status)?
            .map(|scope| {
                scope
                    .split_whitespace()
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let access_boundary_session_key =
            optional_string(&json, "access_boundary_session_key", status)?;

        Ok(StsTokenExchangeResponse {
            access_token: AccessToken::new(access_token, expires_in.map(|ttl| now + ttl)),
            issued_token_type,
            token_type,
            expires_in,
            refresh_token,
            scopes,
            access_boundary_session_key,
        })
    }
}

fn required_string(
    json: &Map<String, Value>,
    field: &str,
    status: StatusCode,
) -> Result<String, StsError> {
    optional_string(json, field, status)?.ok_or_else(|| {
        StsError::parse(status, format!("Missing required field: {}", field))
    })
}

fn optional_string(
    json: &Map<String, Value>,
    field: &str,
    status: StatusCode,
) -> Result<Option<String>, StsError> {
    match json.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(StsError::parse(
            status,
            format!("Expected a string for {} but got: {}", field, other),
        )),
    }
}

/// Parses a non-2xx response body as an OAuth 2.0 error
pub(crate) fn parse_error_response(status: StatusCode, body: &[u8]) -> StsError {
    match serde_json::from_slice::<OAuthError>(body) {
        Ok(error) => StsError::OAuth {
            source: error.with_status(status),
        },
        Err(err) => StsError::parse_with_source(
            status,
            format!(
                "The token endpoint returned {} with a body that is not an OAuth error: {}",
                status,
                String::from_utf8_lossy(body)
            ),
            err,
        ),
    }
}
