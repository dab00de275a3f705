/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::subject_token::executable::ExecutableError;
use wif_sigv4::SigningError;
use wif_sts::{RetryKind, StsError};
use wif_types::connector::ConnectorError;
use wif_types::BoxError;

/// Error obtaining an access token
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The provider was given an invalid configuration
    ///
    /// For example:
    /// - a credential source that names no supported subject token source
    /// - a service account impersonation lifetime outside of the allowed range
    /// - mismatched universe domains between a source credential and a downscoping factory
    #[error("The token provider was not properly configured: {0}")]
    InvalidConfiguration(#[source] BoxError),

    /// The provider experienced an error while loading a subject token or a token
    ///
    /// This may include errors like a 503 from the credential URL or a missing token file.
    #[error("An error occurred while loading the token: {0}")]
    ProviderError(#[source] BoxError),

    /// The executable subject token source failed
    #[error(transparent)]
    Executable(#[from] ExecutableError),

    /// The AWS `GetCallerIdentity` request could not be signed
    #[error("Failed to sign the AWS subject token request: {0}")]
    Signing(#[from] SigningError),

    /// The token exchange failed
    #[error("The token exchange failed: {0}")]
    Sts(#[from] StsError),
}

impl TokenError {
    pub(crate) fn invalid_configuration(err: impl Into<BoxError>) -> Self {
        TokenError::InvalidConfiguration(err.into())
    }

    pub(crate) fn provider_error(err: impl Into<BoxError>) -> Self {
        TokenError::ProviderError(err.into())
    }

    /// Returns true when retrying the same operation may succeed
    ///
    /// Network timeouts, I/O failures, and 5xx responses from the token endpoint are retryable.
    /// Configuration errors and executable failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TokenError::Sts(err) => err.retry_kind() != RetryKind::NotRetryable,
            TokenError::ProviderError(err) => err
                .downcast_ref::<ConnectorError>()
                .map(|err| err.is_timeout() || err.is_io())
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::TokenError;
    use crate::subject_token::executable::ExecutableError;
    use wif_types::connector::ConnectorError;

    #[test]
    fn retryable_classification() {
        assert!(TokenError::provider_error(ConnectorError::timeout("slow")).is_retryable());
        assert!(!TokenError::provider_error("file is missing").is_retryable());
        assert!(!TokenError::invalid_configuration("bad").is_retryable());
        let disabled = TokenError::from(ExecutableError::pluggable_auth_disabled());
        assert!(!disabled.is_retryable());
        assert_eq!(
            disabled.to_string(),
            "Error code PLUGGABLE_AUTH_DISABLED: Pluggable Auth executables need to be explicitly \
             allowed to run by setting the GOOGLE_EXTERNAL_ACCOUNT_ALLOW_EXECUTABLES environment \
             variable to 1."
        );
    }
}
