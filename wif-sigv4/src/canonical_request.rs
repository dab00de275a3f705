/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::date_fmt::{format_date, format_date_time, parse_date_time, parse_http_date};
use crate::error::SigningError;
use crate::sign::{sha256_hex_string, AwsSecurityCredentials, SignableRequest};
use chrono::{DateTime, Utc};
use http::Uri;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

pub(crate) const HMAC_256: &str = "AWS4-HMAC-SHA256";
pub(crate) const HOST: &str = "host";
pub(crate) const DATE: &str = "date";
pub(crate) const X_AMZ_DATE: &str = "x-amz-date";
pub(crate) const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

#[derive(Debug, PartialEq)]
pub(crate) struct CanonicalRequest<'a> {
    pub(crate) method: &'a str,
    pub(crate) path: String,
    pub(crate) params: String,
    /// Keyed by lower-cased header name; iteration order is the canonical order
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) date: DateTime<Utc>,
    pub(crate) host: String,
    pub(crate) payload_hash: String,
}

impl<'a> CanonicalRequest<'a> {
    /// Construct a CanonicalRequest from a signable request
    ///
    /// ## Behavior
    /// - `host` is always signed, using the URL host without a port
    /// - `x-amz-date` is added unless the caller supplied a `date` header. A caller-supplied
    ///   `x-amz-date` is used verbatim.
    /// - `x-amz-security-token` is added when the credentials carry a session token
    /// - caller headers are merged in with lower-cased names and verbatim values
    pub(crate) fn from(
        req: &'a SignableRequest<'a>,
        credentials: &AwsSecurityCredentials,
        now: DateTime<Utc>,
    ) -> Result<CanonicalRequest<'a>, SigningError> {
        let uri = Uri::try_from(req.url).map_err(|err| SigningError::invalid_url(req.url, err))?;
        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| SigningError::missing_host(req.url))?
            .to_string();

        let supplied: BTreeMap<String, &str> = req
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), *value))
            .collect();

        let mut headers = BTreeMap::new();
        headers.insert(HOST.to_string(), host.clone());
        let date = match (supplied.get(DATE), supplied.get(X_AMZ_DATE)) {
            (Some(date), _) => parse_http_date(date)?,
            (None, Some(amz_date)) => parse_date_time(amz_date)?,
            (None, None) => {
                headers.insert(X_AMZ_DATE.to_string(), format_date_time(&now));
                now
            }
        };
        if let Some(session_token) = credentials.session_token() {
            headers.insert(X_AMZ_SECURITY_TOKEN.to_string(), session_token.to_string());
        }
        for (name, value) in supplied {
            headers.insert(name, value.to_string());
        }

        Ok(CanonicalRequest {
            method: req.method,
            path: Self::path(&uri),
            params: uri.query().unwrap_or_default().to_string(),
            headers,
            date,
            host,
            payload_hash: sha256_hex_string(req.payload),
        })
    }

    fn path(uri: &Uri) -> String {
        match uri.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        }
    }

    /// The `x-amz-date` formatted signing time
    ///
    /// When the caller supplied an `x-amz-date` header, its value is used as-is.
    pub(crate) fn amz_date(&self) -> String {
        match self.headers.get(X_AMZ_DATE) {
            Some(amz_date) if !self.headers.contains_key(DATE) => amz_date.clone(),
            _ => format_date_time(&self.date),
        }
    }

    pub(crate) fn signed_headers(&self) -> SignedHeaders<'_> {
        SignedHeaders {
            inner: self.headers.keys().map(String::as_str).collect(),
        }
    }
}

impl<'a> fmt::Display for CanonicalRequest<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(f, "{}", self.path)?;
        writeln!(f, "{}", self.params)?;
        for (name, value) in &self.headers {
            writeln!(f, "{}:{}", name, value)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.signed_headers())?;
        write!(f, "{}", self.payload_hash)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Default)]
pub(crate) struct SignedHeaders<'a> {
    inner: Vec<&'a str>,
}

impl<'a> SignedHeaders<'a> {
    pub(crate) fn names(&self) -> &[&'a str] {
        &self.inner
    }
}

impl<'a> fmt::Display for SignedHeaders<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.inner.iter().peekable();
        while let Some(next) = iter.next() {
            match iter.peek().is_some() {
                true => write!(f, "{};", next)?,
                false => write!(f, "{}", next)?,
            };
        }
        Ok(())
    }
}

#[derive(PartialEq, Debug, Clone)]
pub(crate) struct Scope<'a> {
    pub(crate) date: DateTime<Utc>,
    pub(crate) region: &'a str,
    pub(crate) service: &'a str,
}

impl<'a> fmt::Display for Scope<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/aws4_request",
            format_date(&self.date),
            self.region,
            self.service
        )
    }
}

#[derive(PartialEq, Debug)]
pub(crate) struct StringToSign<'a> {
    pub(crate) scope: Scope<'a>,
    pub(crate) amz_date: &'a str,
    pub(crate) hashed_creq: &'a str,
}

impl<'a> StringToSign<'a> {
    pub(crate) fn new(
        amz_date: &'a str,
        scope: Scope<'a>,
        hashed_creq: &'a str,
    ) -> Self {
        Self {
            scope,
            amz_date,
            hashed_creq,
        }
    }
}

impl<'a> fmt::Display for StringToSign<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}",
            HMAC_256, self.amz_date, self.scope, self.hashed_creq
        )
    }
}
