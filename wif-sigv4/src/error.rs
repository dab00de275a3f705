/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use http::uri::InvalidUri;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
enum SigningErrorKind {
    InvalidUrl { url: String, source: InvalidUri },
    MissingHost { url: String },
    InvalidDateHeader {
        header: &'static str,
        value: String,
        source: chrono::ParseError,
    },
}

/// Error signing request
///
/// Signing errors are caused by the request description itself (a malformed URL or date header),
/// so retrying the same request will fail the same way.
#[derive(Debug)]
pub struct SigningError {
    kind: SigningErrorKind,
}

impl SigningError {
    pub(crate) fn invalid_url(url: &str, source: InvalidUri) -> Self {
        Self {
            kind: SigningErrorKind::InvalidUrl {
                url: url.to_string(),
                source,
            },
        }
    }

    pub(crate) fn missing_host(url: &str) -> Self {
        Self {
            kind: SigningErrorKind::MissingHost {
                url: url.to_string(),
            },
        }
    }

    pub(crate) fn invalid_date_header(
        header: &'static str,
        value: &str,
        source: chrono::ParseError,
    ) -> Self {
        Self {
            kind: SigningErrorKind::InvalidDateHeader {
                header,
                value: value.to_string(),
                source,
            },
        }
    }
}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SigningErrorKind::*;
        match &self.kind {
            InvalidUrl { url, .. } => write!(f, "`{}` is not a valid URL", url),
            MissingHost { url } => write!(f, "`{}` has no host to sign", url),
            InvalidDateHeader { header, value, .. } => {
                write!(f, "the `{}` header `{}` could not be parsed", header, value)
            }
        }
    }
}

impl Error for SigningError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use SigningErrorKind::*;
        match &self.kind {
            InvalidUrl { source, .. } => Some(source),
            MissingHost { .. } => None,
            InvalidDateHeader { source, .. } => Some(source),
        }
    }
}
