/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use http::StatusCode;
use serde::Deserialize;
use std::fmt;
use wif_types::connector::ConnectorError;
use wif_types::BoxError;

/// How a failed exchange may be retried
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryKind {
    /// Socket errors and network timeouts
    TransientError,
    /// 5xx responses and unparseable successful responses
    ServerError,
    /// Retrying will produce the same failure
    NotRetryable,
}

/// An OAuth 2.0 error response (RFC 6749 section 5.2)
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct OAuthError {
    pub error: String,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
    #[serde(skip, default = "default_status")]
    status: StatusCode,
}

fn default_status() -> StatusCode {
    StatusCode::BAD_REQUEST
}

impl OAuthError {
    pub fn new(
        error: impl Into<String>,
        error_description: Option<String>,
        error_uri: Option<String>,
    ) -> Self {
        Self {
            error: error.into(),
            error_description,
            error_uri,
            status: default_status(),
        }
    }

    pub(crate) fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// HTTP status of the response that carried this error
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error code {}", self.error)?;
        if let Some(description) = &self.error_description {
            write!(f, ": {}", description)?;
        }
        if let Some(uri) = &self.error_uri {
            write!(f, " - {}", uri)?;
        }
        Ok(())
    }
}

impl std::error::Error for OAuthError {}

/// Error exchanging a subject token
#[derive(Debug, thiserror::Error)]
pub enum StsError {
    /// The request could not be constructed, for example because the endpoint is not a valid URI.
    /// It was not dispatched over the network.
    #[error("failed to construct the token exchange request")]
    Construction(#[source] http::Error),

    /// No HTTP response was received. The request MAY have been sent.
    #[error("failed to dispatch the token exchange request")]
    Dispatch(#[from] ConnectorError),

    /// The token endpoint returned an OAuth 2.0 error
    #[error("token exchange failed with status {}: {}", .source.status(), .source)]
    OAuth {
        #[source]
        source: OAuthError,
    },

    /// A response was received but it could not be parsed
    #[error("Error parsing token refresh response. {message}")]
    Parse {
        status: StatusCode,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl StsError {
    pub(crate) fn parse(status: StatusCode, message: impl Into<String>) -> Self {
        StsError::Parse {
            status,
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn parse_with_source(
        status: StatusCode,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        StsError::Parse {
            status,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The OAuth error returned by the token endpoint, if this failure carries one
    pub fn oauth_error(&self) -> Option<&OAuthError> {
        match self {
            StsError::OAuth { source } => Some(source),
            _ => None,
        }
    }

    /// Classifies this failure for retry:
    /// - socket errors and network timeouts are transient
    /// - 5xx responses are server errors
    /// - everything else is not retryable, including a successful response that is missing a
    ///   required field
    pub fn retry_kind(&self) -> RetryKind {
        match self {
            StsError::Dispatch(err) if err.is_timeout() || err.is_io() => {
                RetryKind::TransientError
            }
            StsError::OAuth { source } if source.status().is_server_error() => {
                RetryKind::ServerError
            }
            StsError::Parse { status, .. } if status.is_server_error() => RetryKind::ServerError,
            _ => RetryKind::NotRetryable,
        }
    }
}
