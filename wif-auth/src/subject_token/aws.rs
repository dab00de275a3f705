/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Subject tokens from AWS credentials
//!
//! The subject token is a serialized, SigV4 signed `GetCallerIdentity` request. The token
//! endpoint replays it against AWS STS to learn the identity of the caller.

use crate::error::TokenError;
use crate::provider_config::ProviderConfig;
use crate::subject_token::{send, SubjectTokenContext};
use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use wif_sigv4::{sign, AwsRequestSignature, AwsSecurityCredentials, SignableRequest};
use wif_types::connector::SharedHttpConnector;
use wif_types::future::BoxFuture;
use wif_types::os_shim_internal::Env;
use wif_types::time::{SharedTimeSource, TimeSource};
use wif_types::{SubjectToken, SubjectTokenType};

const TARGET_RESOURCE_HEADER: &str = "x-goog-cloud-target-resource";
const IMDSV2_TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const IMDSV2_TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const IMDSV2_TOKEN_TTL_SECONDS: &str = "300";

/// Provides the AWS region and credentials used to sign the `GetCallerIdentity` request
///
/// The default implementation, [`ImdsAwsCredentialsSupplier`], reads the environment and falls
/// back to the EC2 instance metadata service. Implement this trait to source them elsewhere.
pub trait AwsSecurityCredentialsSupplier: Send + Sync + Debug {
    fn aws_region<'a>(
        &'a self,
        context: &'a SubjectTokenContext,
    ) -> BoxFuture<'a, Result<String, TokenError>>;

    fn aws_security_credentials<'a>(
        &'a self,
        context: &'a SubjectTokenContext,
    ) -> BoxFuture<'a, Result<AwsSecurityCredentials, TokenError>>;
}

/// A shared, cheaply clonable [`AwsSecurityCredentialsSupplier`]
#[derive(Clone, Debug)]
pub struct SharedAwsSecurityCredentialsSupplier(Arc<dyn AwsSecurityCredentialsSupplier>);

impl SharedAwsSecurityCredentialsSupplier {
    pub fn new(supplier: impl AwsSecurityCredentialsSupplier + 'static) -> Self {
        Self(Arc::new(supplier))
    }
}

impl AwsSecurityCredentialsSupplier for SharedAwsSecurityCredentialsSupplier {
    fn aws_region<'a>(
        &'a self,
        context: &'a SubjectTokenContext,
    ) -> BoxFuture<'a, Result<String, TokenError>> {
        self.0.aws_region(context)
    }

    fn aws_security_credentials<'a>(
        &'a self,
        context: &'a SubjectTokenContext,
    ) -> BoxFuture<'a, Result<AwsSecurityCredentials, TokenError>> {
        self.0.aws_security_credentials(context)
    }
}

/// Region and credentials from the environment or the EC2 instance metadata service
///
/// Region: `AWS_REGION`, then `AWS_DEFAULT_REGION`, then the availability zone returned by
/// `region_url` without its last character.
///
/// Credentials: `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` (with an optional
/// `AWS_SESSION_TOKEN`), then the role credentials under `url`.
///
/// When `imdsv2_session_token_url` is set, every metadata request carries an IMDSv2 session
/// token.
#[derive(Clone, Debug)]
pub struct ImdsAwsCredentialsSupplier {
    region_url: Option<String>,
    url: Option<String>,
    imdsv2_session_token_url: Option<String>,
    env: Env,
    connector: Option<SharedHttpConnector>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

impl ImdsAwsCredentialsSupplier {
    pub fn new(
        region_url: Option<String>,
        url: Option<String>,
        imdsv2_session_token_url: Option<String>,
        conf: &ProviderConfig,
    ) -> Self {
        Self {
            region_url,
            url,
            imdsv2_session_token_url,
            env: conf.env(),
            connector: conf.connector().ok(),
        }
    }

    fn connector(&self) -> Result<&SharedHttpConnector, TokenError> {
        self.connector.as_ref().ok_or_else(|| {
            TokenError::invalid_configuration(
                "an HTTP connector is required to reach the instance metadata service",
            )
        })
    }

    async fn metadata_request(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<String, TokenError> {
        let mut builder = http::Request::builder().method(method).uri(url);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Bytes::new())
            .map_err(TokenError::invalid_configuration)?;
        let response = send(self.connector()?, request).await?;
        if !response.status().is_success() {
            return Err(TokenError::provider_error(format!(
                "instance metadata request to {} failed with HTTP status {}",
                url,
                response.status()
            )));
        }
        String::from_utf8(response.body().to_vec()).map_err(|err| {
            TokenError::provider_error(format!(
                "instance metadata response from {} is not valid UTF-8: {}",
                url, err
            ))
        })
    }

    async fn imdsv2_session_token(&self) -> Result<Option<String>, TokenError> {
        match &self.imdsv2_session_token_url {
            Some(url) => {
                let token = self
                    .metadata_request(
                        Method::PUT,
                        url,
                        &[(IMDSV2_TOKEN_TTL_HEADER, IMDSV2_TOKEN_TTL_SECONDS)],
                    )
                    .await?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    async fn metadata_get(&self, url: &str, session_token: Option<&str>) -> Result<String, TokenError> {
        match session_token {
            Some(token) => {
                self.metadata_request(Method::GET, url, &[(IMDSV2_TOKEN_HEADER, token)])
                    .await
            }
            None => self.metadata_request(Method::GET, url, &[]).await,
        }
    }

    async fn region(&self) -> Result<String, TokenError> {
        if let Some(region) = self
            .env
            .get_non_empty("AWS_REGION")
            .or_else(|| self.env.get_non_empty("AWS_DEFAULT_REGION"))
        {
            return Ok(region);
        }
        let region_url = self.region_url.as_deref().ok_or_else(|| {
            TokenError::invalid_configuration(
                "unable to determine the AWS region: no region in the environment and no `region_url`",
            )
        })?;
        let session_token = self.imdsv2_session_token().await?;
        let zone = self.metadata_get(region_url, session_token.as_deref()).await?;
        let zone = zone.trim();
        // `us-east-2b` is in `us-east-2`
        let mut chars = zone.chars();
        chars.next_back();
        let region = chars.as_str();
        if region.is_empty() {
            return Err(TokenError::provider_error(format!(
                "invalid availability zone `{}` from {}",
                zone, region_url
            )));
        }
        Ok(region.to_string())
    }

    async fn credentials(&self) -> Result<AwsSecurityCredentials, TokenError> {
        if let (Some(access_key_id), Some(secret_access_key)) = (
            self.env.get_non_empty("AWS_ACCESS_KEY_ID"),
            self.env.get_non_empty("AWS_SECRET_ACCESS_KEY"),
        ) {
            return Ok(AwsSecurityCredentials::new(
                access_key_id,
                secret_access_key,
                self.env.get_non_empty("AWS_SESSION_TOKEN"),
            ));
        }
        let url = self.url.as_deref().ok_or_else(|| {
            TokenError::invalid_configuration(
                "unable to determine the AWS credentials: no credentials in the environment and no metadata `url`",
            )
        })?;
        let session_token = self.imdsv2_session_token().await?;
        let role = self.metadata_get(url, session_token.as_deref()).await?;
        let role = role.trim();
        if role.is_empty() {
            return Err(TokenError::provider_error(format!(
                "no IAM role is attached to this instance ({} is empty)",
                url
            )));
        }
        let credentials_url = format!("{}/{}", url.trim_end_matches('/'), role);
        let body = self
            .metadata_get(&credentials_url, session_token.as_deref())
            .await?;
        // `Token` is optional; a document without a key id or secret is unusable
        let credentials: MetadataCredentials = serde_json::from_str(&body).map_err(|err| {
            TokenError::provider_error(format!(
                "invalid role credentials from {}: {}",
                credentials_url, err
            ))
        })?;
        tracing::debug!(role = %role, "loaded AWS credentials from instance metadata");
        Ok(AwsSecurityCredentials::new(
            credentials.access_key_id,
            credentials.secret_access_key,
            credentials.token,
        ))
    }
}

impl AwsSecurityCredentialsSupplier for ImdsAwsCredentialsSupplier {
    fn aws_region<'a>(
        &'a self,
        _context: &'a SubjectTokenContext,
    ) -> BoxFuture<'a, Result<String, TokenError>> {
        Box::pin(self.region())
    }

    fn aws_security_credentials<'a>(
        &'a self,
        _context: &'a SubjectTokenContext,
    ) -> BoxFuture<'a, Result<AwsSecurityCredentials, TokenError>> {
        Box::pin(self.credentials())
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    url: &'a str,
    method: &'a str,
    headers: Vec<EnvelopeHeader<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

#[derive(Serialize)]
struct EnvelopeHeader<'a> {
    key: &'a str,
    value: &'a str,
}

/// Serializes a signed request into the subject token format: URL-encoded JSON with the signed
/// headers in canonical order followed by `Authorization`
fn envelope(signature: &AwsRequestSignature, body: &str) -> Result<String, TokenError> {
    let mut headers: Vec<EnvelopeHeader<'_>> = signature
        .canonical_headers()
        .iter()
        .map(|(key, value)| EnvelopeHeader { key, value })
        .collect();
    headers.push(EnvelopeHeader {
        key: "Authorization",
        value: signature.authorization_header(),
    });
    let envelope = Envelope {
        url: signature.url(),
        method: signature.method(),
        headers,
        body: Some(body).filter(|body| !body.is_empty()),
    };
    let json = serde_json::to_string(&envelope).map_err(TokenError::provider_error)?;
    Ok(form_urlencoded::byte_serialize(json.as_bytes()).collect())
}

/// Produces `aws4_request` subject tokens
#[derive(Clone, Debug)]
pub struct AwsSupplier {
    regional_cred_verification_url: String,
    credentials_supplier: SharedAwsSecurityCredentialsSupplier,
    time_source: SharedTimeSource,
}

impl AwsSupplier {
    /// `regional_cred_verification_url` may contain a `{region}` placeholder
    pub fn new(
        regional_cred_verification_url: impl Into<String>,
        credentials_supplier: SharedAwsSecurityCredentialsSupplier,
        conf: &ProviderConfig,
    ) -> Self {
        Self {
            regional_cred_verification_url: regional_cred_verification_url.into(),
            credentials_supplier,
            time_source: conf.time_source(),
        }
    }

    pub(crate) async fn subject_token(
        &self,
        context: &SubjectTokenContext,
    ) -> Result<SubjectToken, TokenError> {
        let region = self.credentials_supplier.aws_region(context).await?;
        let credentials = self
            .credentials_supplier
            .aws_security_credentials(context)
            .await?;
        let url = self
            .regional_cred_verification_url
            .replace("{region}", &region);
        let headers = [(TARGET_RESOURCE_HEADER, context.audience())];
        let request = SignableRequest {
            headers: &headers,
            ..SignableRequest::new("POST", &url, &region)
        };
        let signature = sign(&request, &credentials, self.time_source.now())?;
        tracing::debug!(region = %region, "signed AWS GetCallerIdentity request");
        Ok(SubjectToken::new(
            envelope(&signature, "")?,
            SubjectTokenType::Aws4Request,
        ))
    }
}
