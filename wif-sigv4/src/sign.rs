/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::canonical_request::{CanonicalRequest, Scope, StringToSign, HMAC_256};
use crate::date_fmt::format_date;
use crate::error::SigningError;
use chrono::{DateTime, Utc};
use hmac::{digest::FixedOutput, Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Lower-case hex SHA-256 of a request payload or canonical request
pub fn sha256_hex_string(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of every length
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("any key length is valid");
    mac.update(data);
    mac.finalize_fixed().to_vec()
}

/// Hex signature of the `GetCallerIdentity` string to sign
pub fn calculate_signature(signing_key: impl AsRef<[u8]>, string_to_sign: &[u8]) -> String {
    hex::encode(hmac_sha256(signing_key.as_ref(), string_to_sign))
}

/// Derives the signing key of one day, region, and service from an AWS secret access key
///
/// The key is `"AWS4" + secret` chained through HMAC-SHA256 over the date (`YYYYMMDD`), the
/// region, the service, and finally the literal `aws4_request`.
pub fn generate_signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> impl AsRef<[u8]> {
    let seed = format!("AWS4{}", secret).into_bytes();
    [date, region, service, "aws4_request"]
        .iter()
        .fold(seed, |key, part| hmac_sha256(&key, part.as_bytes()))
}

/// AWS access key, secret key, and optional session token
///
/// These are obtained from the environment, instance metadata, or a caller supplied source and are
/// never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsSecurityCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl fmt::Debug for AwsSecurityCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSecurityCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

impl AwsSecurityCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

/// Description of the request to sign
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub region: &'a str,
    pub payload: &'a [u8],
    /// Additional headers to sign. Names are lower-cased; values are signed verbatim.
    pub headers: &'a [(&'a str, &'a str)],
}

impl<'a> SignableRequest<'a> {
    /// A request with an empty payload and no additional headers
    pub fn new(method: &'a str, url: &'a str, region: &'a str) -> Self {
        Self {
            method,
            url,
            region,
            payload: &[],
            headers: &[],
        }
    }
}

/// The result of signing a request
///
/// Holds everything needed to reproduce the signed request: the canonical headers, in canonical
/// order, and the `Authorization` header value derived from them.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsRequestSignature {
    signature: String,
    credential_scope: String,
    canonical_headers: BTreeMap<String, String>,
    authorization_header: String,
    amz_date: String,
    date: String,
    region: String,
    service: String,
    url: String,
    method: String,
}

impl fmt::Debug for AwsRequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsRequestSignature")
            .field("signature", &self.signature)
            .field("credential_scope", &self.credential_scope)
            .field("signed_headers", &self.signed_header_names())
            .field("amz_date", &self.amz_date)
            .field("method", &self.method)
            .field("url", &self.url)
            .finish()
    }
}

impl AwsRequestSignature {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// `{YYYYMMDD}/{region}/{service}/aws4_request`
    pub fn credential_scope(&self) -> &str {
        &self.credential_scope
    }

    /// Canonical headers keyed by lower-cased name, iterated in canonical (sorted) order
    pub fn canonical_headers(&self) -> &BTreeMap<String, String> {
        &self.canonical_headers
    }

    /// Lower-cased names of the signed headers, in canonical order
    pub fn signed_header_names(&self) -> Vec<&str> {
        self.canonical_headers.keys().map(String::as_str).collect()
    }

    /// Value of the `Authorization` header
    pub fn authorization_header(&self) -> &str {
        &self.authorization_header
    }

    /// Signing time in `x-amz-date` format
    pub fn amz_date(&self) -> &str {
        &self.amz_date
    }

    /// Signing date, `YYYYMMDD`
    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Signs `request` with `credentials` using AWS Signature Version 4.
///
/// The service is the first DNS label of the URL host (`sts` for `sts.us-east-2.amazonaws.com`).
/// `now` is only used when the request carries neither a `date` nor an `x-amz-date` header.
pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &AwsSecurityCredentials,
    now: SystemTime,
) -> Result<AwsRequestSignature, SigningError> {
    let now = DateTime::<Utc>::from(now);
    let creq = CanonicalRequest::from(request, credentials, now)?;
    let service = creq.host.split('.').next().unwrap_or_default().to_string();
    let amz_date = creq.amz_date();
    tracing::trace!(canonical_request = %creq);

    let encoded_creq = sha256_hex_string(creq.to_string().as_bytes());
    let scope = Scope {
        date: creq.date,
        region: request.region,
        service: &service,
    };
    let credential_scope = scope.to_string();
    let string_to_sign = StringToSign::new(&amz_date, scope, &encoded_creq).to_string();
    tracing::trace!(string_to_sign = %string_to_sign);

    let date = format_date(&creq.date);
    let signing_key = generate_signing_key(
        credentials.secret_access_key(),
        &date,
        request.region,
        &service,
    );
    let signature = calculate_signature(signing_key, string_to_sign.as_bytes());
    let authorization_header = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        HMAC_256,
        credentials.access_key_id(),
        credential_scope,
        creq.signed_headers(),
        signature
    );

    Ok(AwsRequestSignature {
        signature,
        credential_scope,
        canonical_headers: creq.headers,
        authorization_header,
        amz_date,
        date,
        region: request.region.to_string(),
        service,
        url: request.url.to_string(),
        method: request.method.to_string(),
    })
}
