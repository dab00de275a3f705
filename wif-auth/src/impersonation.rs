/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Service account impersonation through the IAM credentials `generateAccessToken` API

use crate::error::TokenError;
use crate::subject_token::send;
use bytes::Bytes;
use chrono::DateTime;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use wif_types::connector::SharedHttpConnector;
use wif_types::AccessToken;

/// Scope requested from STS before impersonating
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const MIN_TOKEN_LIFETIME_SECONDS: u64 = 600;
const MAX_TOKEN_LIFETIME_SECONDS: u64 = 43200;

#[derive(Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: &'a [String],
    lifetime: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: String,
}

/// Extracts `SA_EMAIL` from `https://.../serviceAccounts/SA_EMAIL:generateAccessToken`
pub(crate) fn service_account_email(url: &str) -> Option<&str> {
    let start = url.find("serviceAccounts/")? + "serviceAccounts/".len();
    let rest = &url[start..];
    let end = rest.find(":generateAccessToken")?;
    Some(&rest[..end]).filter(|email| !email.is_empty())
}

/// Exchanges an access token for an access token of a service account
#[derive(Clone, Debug)]
pub struct ServiceAccountImpersonation {
    url: String,
    scopes: Vec<String>,
    lifetime: Duration,
    connector: SharedHttpConnector,
}

impl ServiceAccountImpersonation {
    /// `lifetime_seconds` defaults to one hour and must be between 600 and 43200
    pub fn new(
        url: impl Into<String>,
        scopes: Vec<String>,
        lifetime_seconds: Option<u64>,
        connector: SharedHttpConnector,
    ) -> Result<Self, TokenError> {
        let lifetime = match lifetime_seconds {
            None => DEFAULT_TOKEN_LIFETIME,
            Some(secs) if (MIN_TOKEN_LIFETIME_SECONDS..=MAX_TOKEN_LIFETIME_SECONDS).contains(&secs) => {
                Duration::from_secs(secs)
            }
            Some(secs) => {
                return Err(TokenError::invalid_configuration(format!(
                    "the service account impersonation token lifetime must be between {} and {} seconds, got {}",
                    MIN_TOKEN_LIFETIME_SECONDS, MAX_TOKEN_LIFETIME_SECONDS, secs
                )))
            }
        };
        Ok(Self {
            url: url.into(),
            scopes,
            lifetime,
            connector,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Email of the impersonated service account, when the URL names one
    pub fn service_account_email(&self) -> Option<&str> {
        service_account_email(&self.url)
    }

    pub(crate) async fn impersonate(&self, source: &AccessToken) -> Result<AccessToken, TokenError> {
        let body = serde_json::to_vec(&GenerateAccessTokenRequest {
            scope: &self.scopes,
            lifetime: format!("{}s", self.lifetime.as_secs()),
        })
        .map_err(TokenError::provider_error)?;
        let request = http::Request::builder()
            .method(Method::POST)
            .uri(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", source.value()))
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))
            .map_err(TokenError::invalid_configuration)?;
        let response = send(&self.connector, request).await?;
        if !response.status().is_success() {
            return Err(TokenError::provider_error(format!(
                "service account impersonation failed with HTTP status {}: {}",
                response.status(),
                String::from_utf8_lossy(response.body())
            )));
        }
        let parsed: GenerateAccessTokenResponse = serde_json::from_slice(response.body())
            .map_err(|err| {
                TokenError::provider_error(format!(
                    "invalid service account impersonation response: {}",
                    err
                ))
            })?;
        let expiration = DateTime::parse_from_rfc3339(&parsed.expire_time).map_err(|err| {
            TokenError::provider_error(format!(
                "invalid `expireTime` in service account impersonation response: {}",
                err
            ))
        })?;
        tracing::debug!(url = %self.url, "impersonated service account");
        Ok(AccessToken::new(
            parsed.access_token,
            Some(SystemTime::from(expiration)),
        ))
    }
}
