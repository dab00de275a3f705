/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Workload and workforce identity federation credentials
//!
//! [`ExternalAccountCredentials`] exchange a third party subject token for an access token at
//! an RFC 8693 token endpoint, optionally impersonate a service account with it, and cache the
//! result.
//!
//! ```no_run
//! use wif_auth::external_account::{ExternalAccountConfig, ExternalAccountCredentials};
//! use wif_auth::provider::ProvideAccessToken;
//! # async fn docs() -> Result<(), wif_auth::error::TokenError> {
//! let config = ExternalAccountConfig::from_json(r#"{
//!   "type": "external_account",
//!   "audience": "//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/pool/providers/oidc",
//!   "subject_token_type": "urn:ietf:params:oauth:token-type:jwt",
//!   "credential_source": { "file": "/var/run/secrets/token" }
//! }"#)?;
//! let credentials = ExternalAccountCredentials::builder().config(config).build()?;
//! let token = credentials.access_token().await?;
//! # Ok(())
//! # }
//! ```

use crate::cache::CredentialLifecycle;
use crate::error::TokenError;
use crate::impersonation::{ServiceAccountImpersonation, CLOUD_PLATFORM_SCOPE};
use crate::provider::{self, future, ProvideAccessToken, DEFAULT_UNIVERSE_DOMAIN};
use crate::provider_config::ProviderConfig;
use crate::subject_token::aws::{
    AwsSupplier, ImdsAwsCredentialsSupplier, SharedAwsSecurityCredentialsSupplier,
};
use crate::subject_token::executable::{
    ExecutableOptions, ExecutableSupplier, DEFAULT_EXECUTABLE_TIMEOUT,
};
use crate::subject_token::file::FileSupplier;
use crate::subject_token::url::UrlSupplier;
use crate::subject_token::{SubjectTokenContext, SubjectTokenFormat, SubjectTokenSupplier};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wif_sts::{ClientAuthentication, StsExchangeClient, StsTokenExchangeRequest};
use wif_types::{AccessToken, SubjectTokenType};

const EXTERNAL_ACCOUNT_TYPE: &str = "external_account";
const QUOTA_PROJECT_HEADER: &str = "x-goog-user-project";
const MIN_EXECUTABLE_TIMEOUT_MILLIS: u64 = 5_000;
const MAX_EXECUTABLE_TIMEOUT_MILLIS: u64 = 120_000;

/// Token endpoint of a universe domain
pub fn default_token_url(universe_domain: &str) -> String {
    format!("https://sts.{}/v1/token", universe_domain)
}

/// The external account JSON configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ExternalAccountConfig {
    /// Must be `external_account` when present
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub audience: String,
    pub subject_token_type: String,
    pub token_url: Option<String>,
    pub service_account_impersonation_url: Option<String>,
    pub service_account_impersonation: Option<ImpersonationConfig>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub quota_project_id: Option<String>,
    pub workforce_pool_user_project: Option<String>,
    pub universe_domain: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub credential_source: Option<CredentialSourceConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ImpersonationConfig {
    pub token_lifetime_seconds: Option<u64>,
}

/// `credential_source` of [`ExternalAccountConfig`]. Exactly one kind of source is used:
/// `environment_id` (AWS), then `executable`, then `file`, then `url`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CredentialSourceConfig {
    pub file: Option<String>,
    pub url: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub format: Option<FormatConfig>,
    pub executable: Option<ExecutableConfig>,
    pub environment_id: Option<String>,
    pub region_url: Option<String>,
    pub regional_cred_verification_url: Option<String>,
    pub imdsv2_session_token_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct FormatConfig {
    /// `text` (default) or `json`
    #[serde(rename = "type")]
    pub format_type: Option<String>,
    pub subject_token_field_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ExecutableConfig {
    pub command: String,
    pub timeout_millis: Option<u64>,
    pub output_file: Option<String>,
}

impl ExternalAccountConfig {
    pub fn from_json(json: &str) -> Result<Self, TokenError> {
        serde_json::from_str(json).map_err(|err| {
            TokenError::invalid_configuration(format!(
                "invalid external account configuration: {}",
                err
            ))
        })
    }

    fn universe_domain(&self) -> &str {
        self.universe_domain
            .as_deref()
            .filter(|domain| !domain.is_empty())
            .unwrap_or(DEFAULT_UNIVERSE_DOMAIN)
    }

    fn is_workforce_pool(&self) -> bool {
        self.audience.contains("/workforcePools/")
    }
}

impl FormatConfig {
    fn to_format(&self) -> Result<SubjectTokenFormat, TokenError> {
        match self.format_type.as_deref().unwrap_or("text") {
            "text" => Ok(SubjectTokenFormat::Text),
            "json" => {
                let field = self.subject_token_field_name.clone().ok_or_else(|| {
                    TokenError::invalid_configuration(
                        "`subject_token_field_name` is required for the json format",
                    )
                })?;
                Ok(SubjectTokenFormat::Json {
                    subject_token_field_name: field,
                })
            }
            other => Err(TokenError::invalid_configuration(format!(
                "unsupported credential source format `{}`",
                other
            ))),
        }
    }
}

impl CredentialSourceConfig {
    fn format(&self) -> Result<SubjectTokenFormat, TokenError> {
        self.format
            .as_ref()
            .map(FormatConfig::to_format)
            .unwrap_or(Ok(SubjectTokenFormat::Text))
    }

    fn into_supplier(
        self,
        aws_supplier: Option<SharedAwsSecurityCredentialsSupplier>,
        conf: &ProviderConfig,
    ) -> Result<SubjectTokenSupplier, TokenError> {
        if let Some(environment_id) = &self.environment_id {
            return self.aws_supplier(environment_id, aws_supplier, conf);
        }
        if let Some(executable) = self.executable {
            let timeout_millis = executable
                .timeout_millis
                .unwrap_or(DEFAULT_EXECUTABLE_TIMEOUT.as_millis() as u64);
            if !(MIN_EXECUTABLE_TIMEOUT_MILLIS..=MAX_EXECUTABLE_TIMEOUT_MILLIS)
                .contains(&timeout_millis)
            {
                return Err(TokenError::invalid_configuration(format!(
                    "the executable timeout must be between {} and {} milliseconds",
                    MIN_EXECUTABLE_TIMEOUT_MILLIS, MAX_EXECUTABLE_TIMEOUT_MILLIS
                )));
            }
            let mut options = ExecutableOptions::new(executable.command)
                .with_timeout(Duration::from_millis(timeout_millis));
            if let Some(output_file) = executable.output_file {
                options = options.with_output_file(output_file);
            }
            return Ok(SubjectTokenSupplier::Executable(ExecutableSupplier::new(
                options, conf,
            )?));
        }
        let format = self.format()?;
        if let Some(file) = self.file {
            return Ok(SubjectTokenSupplier::File(FileSupplier::new(
                file, format, conf,
            )));
        }
        if let Some(url) = self.url {
            return Ok(SubjectTokenSupplier::Url(UrlSupplier::new(
                url,
                self.headers.unwrap_or_default(),
                format,
                conf,
            )?));
        }
        Err(TokenError::invalid_configuration(
            "the credential source must contain one of `environment_id`, `executable`, `file`, or `url`",
        ))
    }

    fn aws_supplier(
        &self,
        environment_id: &str,
        aws_supplier: Option<SharedAwsSecurityCredentialsSupplier>,
        conf: &ProviderConfig,
    ) -> Result<SubjectTokenSupplier, TokenError> {
        match environment_id.strip_prefix("aws") {
            Some("1") => {}
            Some(version) => {
                return Err(TokenError::invalid_configuration(format!(
                    "AWS version {} is not supported in the current build",
                    version
                )))
            }
            None => {
                return Err(TokenError::invalid_configuration(format!(
                    "unsupported credential source environment `{}`",
                    environment_id
                )))
            }
        }
        let verification_url = self.regional_cred_verification_url.clone().ok_or_else(|| {
            TokenError::invalid_configuration(
                "`regional_cred_verification_url` is required for AWS credential sources",
            )
        })?;
        let credentials_supplier = aws_supplier.unwrap_or_else(|| {
            SharedAwsSecurityCredentialsSupplier::new(ImdsAwsCredentialsSupplier::new(
                self.region_url.clone(),
                self.url.clone(),
                self.imdsv2_session_token_url.clone(),
                conf,
            ))
        });
        Ok(SubjectTokenSupplier::Aws(AwsSupplier::new(
            verification_url,
            credentials_supplier,
            conf,
        )))
    }
}

/// Builder for [`ExternalAccountCredentials`]
#[derive(Debug, Default)]
pub struct Builder {
    config: Option<ExternalAccountConfig>,
    provider_config: Option<ProviderConfig>,
    subject_token_supplier: Option<SubjectTokenSupplier>,
    aws_security_credentials_supplier: Option<SharedAwsSecurityCredentialsSupplier>,
    expiration_margin: Option<Duration>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The external account configuration (required)
    pub fn config(mut self, config: ExternalAccountConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the environment, file system, clock, HTTP connector, and process spawner
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Use `supplier` instead of the configured `credential_source`
    pub fn subject_token_supplier(mut self, supplier: SubjectTokenSupplier) -> Self {
        self.subject_token_supplier = Some(supplier);
        self
    }

    /// Source the AWS region and credentials of an AWS credential source from `supplier`
    pub fn aws_security_credentials_supplier(
        mut self,
        supplier: SharedAwsSecurityCredentialsSupplier,
    ) -> Self {
        self.aws_security_credentials_supplier = Some(supplier);
        self
    }

    /// Refresh tokens this long before they expire
    pub fn expiration_margin(mut self, margin: Duration) -> Self {
        self.expiration_margin = Some(margin);
        self
    }

    pub fn build(self) -> Result<ExternalAccountCredentials, TokenError> {
        let config = self
            .config
            .ok_or_else(|| TokenError::invalid_configuration("a configuration is required"))?;
        let conf = self.provider_config.unwrap_or_default();

        if let Some(account_type) = &config.account_type {
            if account_type != EXTERNAL_ACCOUNT_TYPE {
                return Err(TokenError::invalid_configuration(format!(
                    "expected credentials of type `{}`, got `{}`",
                    EXTERNAL_ACCOUNT_TYPE, account_type
                )));
            }
        }
        if config.audience.is_empty() {
            return Err(TokenError::invalid_configuration("`audience` is required"));
        }
        if config.subject_token_type.is_empty() {
            return Err(TokenError::invalid_configuration(
                "`subject_token_type` is required",
            ));
        }
        if config.workforce_pool_user_project.is_some() && !config.is_workforce_pool() {
            return Err(TokenError::invalid_configuration(
                "`workforce_pool_user_project` is only valid for workforce pool audiences",
            ));
        }

        let universe_domain = config.universe_domain().to_string();
        let connector = conf.connector()?;
        let token_url = config
            .token_url
            .clone()
            .unwrap_or_else(|| default_token_url(&universe_domain));
        let mut sts = StsExchangeClient::new(token_url, connector.clone(), conf.time_source());
        let client_authentication = config
            .client_id
            .as_ref()
            .map(|id| ClientAuthentication::new(id, config.client_secret.clone()));
        if let Some(auth) = &client_authentication {
            sts = sts.with_client_authentication(auth);
        }

        let scopes = config
            .scopes
            .clone()
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or_else(|| vec![CLOUD_PLATFORM_SCOPE.to_string()]);
        let impersonation = match &config.service_account_impersonation_url {
            Some(url) => Some(ServiceAccountImpersonation::new(
                url,
                scopes.clone(),
                config
                    .service_account_impersonation
                    .as_ref()
                    .and_then(|imp| imp.token_lifetime_seconds),
                connector,
            )?),
            None => None,
        };

        let supplier = match self.subject_token_supplier {
            Some(supplier) => supplier,
            None => config
                .credential_source
                .clone()
                .ok_or_else(|| {
                    TokenError::invalid_configuration("`credential_source` is required")
                })?
                .into_supplier(self.aws_security_credentials_supplier, &conf)?,
        };

        // workforce pools bill the user project unless the client authenticates itself
        let options = match (&config.workforce_pool_user_project, &client_authentication) {
            (Some(project), None) => Some(serde_json::json!({ "userProject": project }).to_string()),
            _ => None,
        };

        let mut context = SubjectTokenContext::new(
            config.audience.clone(),
            SubjectTokenType::from_urn(&config.subject_token_type),
        );
        if let Some(email) = impersonation
            .as_ref()
            .and_then(ServiceAccountImpersonation::service_account_email)
        {
            context = context.with_impersonated_email(email);
        }

        let mut lifecycle = CredentialLifecycle::new(conf.time_source());
        if let Some(margin) = self.expiration_margin {
            lifecycle = lifecycle.with_margin(margin);
        }
        Ok(ExternalAccountCredentials {
            inner: Arc::new(Inner {
                context,
                supplier,
                sts,
                scopes,
                impersonation,
                options,
                quota_project_id: config.quota_project_id,
                universe_domain,
            }),
            lifecycle,
        })
    }
}

#[derive(Debug)]
struct Inner {
    context: SubjectTokenContext,
    supplier: SubjectTokenSupplier,
    sts: StsExchangeClient,
    scopes: Vec<String>,
    impersonation: Option<ServiceAccountImpersonation>,
    options: Option<String>,
    quota_project_id: Option<String>,
    universe_domain: String,
}

/// Credentials that exchange an external subject token for an access token
///
/// Clones share the cached token.
#[derive(Clone, Debug)]
pub struct ExternalAccountCredentials {
    inner: Arc<Inner>,
    lifecycle: CredentialLifecycle<AccessToken>,
}

impl ExternalAccountCredentials {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Forces a token refresh even if the cached token is still valid
    pub async fn refresh(&self) -> provider::Result {
        self.lifecycle.refresh(|| self.inner.fetch_token()).await
    }

    /// Headers that authorize a request: `authorization` and, with a quota project,
    /// `x-goog-user-project`
    pub async fn request_metadata(&self) -> Result<HeaderMap, TokenError> {
        let token = self.token().await?;
        let mut headers = HeaderMap::new();
        let mut authorization = HeaderValue::try_from(format!("Bearer {}", token.value()))
            .map_err(TokenError::provider_error)?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        if let Some(project) = &self.inner.quota_project_id {
            headers.insert(
                HeaderName::from_static(QUOTA_PROJECT_HEADER),
                HeaderValue::try_from(project.as_str()).map_err(TokenError::invalid_configuration)?,
            );
        }
        Ok(headers)
    }

    pub fn quota_project_id(&self) -> Option<&str> {
        self.inner.quota_project_id.as_deref()
    }

    /// Email of the impersonated service account, if any
    pub fn service_account_email(&self) -> Option<&str> {
        self.inner.context.impersonated_email()
    }

    async fn token(&self) -> provider::Result {
        self.lifecycle
            .get_or_refresh(|| self.inner.fetch_token())
            .await
    }
}

impl Inner {
    async fn fetch_token(&self) -> provider::Result {
        let subject_token = self.supplier.subject_token(&self.context).await?;
        // impersonation narrows the scopes, so STS is asked for the broadest scope
        let scopes = match &self.impersonation {
            Some(_) => vec![CLOUD_PLATFORM_SCOPE.to_string()],
            None => self.scopes.clone(),
        };
        let mut request = StsTokenExchangeRequest::new(
            subject_token.into_value(),
            self.context.subject_token_type().as_urn(),
        )
        .with_audience(self.context.audience())
        .with_scopes(scopes);
        if let Some(options) = &self.options {
            request = request.with_internal_options(options.clone());
        }
        let response = self.sts.exchange_token(&request).await?;
        match &self.impersonation {
            Some(impersonation) => impersonation.impersonate(response.access_token()).await,
            None => Ok(response.access_token().clone()),
        }
    }
}

impl ProvideAccessToken for ExternalAccountCredentials {
    fn access_token<'a>(&'a self) -> future::ProvideAccessToken<'a>
    where
        Self: 'a,
    {
        future::ProvideAccessToken::new(self.token())
    }

    fn universe_domain(&self) -> &str {
        &self.inner.universe_domain
    }
}

#[cfg(test)]
mod test {
    use super::{ExternalAccountConfig, ExternalAccountCredentials};
    use crate::error::TokenError;
    use crate::provider::ProvideAccessToken;
    use crate::provider_config::ProviderConfig;
    use bytes::Bytes;
    use futures_util::future::join_all;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};
    use wif_types::connector::{HttpConnector, HttpConnectorFuture, HttpRequest, SharedHttpConnector};
    use wif_types::future::NowOrLater;
    use wif_types::os_shim_internal::{Env, Fs};
    use wif_types::test_connection::TestConnection;
    use wif_types::time::{ManualTimeSource, SharedTimeSource};

    const AUDIENCE: &str =
        "//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/pool/providers/oidc";
    const WORKFORCE_AUDIENCE: &str =
        "//iam.googleapis.com/locations/global/workforcePools/pool/providers/oidc";
    const IMPERSONATION_URL: &str = "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/sa@project.iam.gserviceaccount.com:generateAccessToken";

    fn time() -> ManualTimeSource {
        ManualTimeSource::new(UNIX_EPOCH + Duration::from_secs(1000))
    }

    fn conf(time: &ManualTimeSource, connector: SharedHttpConnector) -> ProviderConfig {
        ProviderConfig::no_configuration()
            .with_fs(Fs::from_slice(&[("/var/run/token", "oidc-jwt")]))
            .with_time_source(SharedTimeSource::new(time.clone()))
            .with_connector(connector)
    }

    fn file_config(extra: serde_json::Value) -> ExternalAccountConfig {
        let mut config = json!({
            "type": "external_account",
            "audience": AUDIENCE,
            "subject_token_type": "urn:ietf:params:oauth:token-type:jwt",
            "credential_source": { "file": "/var/run/token" }
        });
        if let (Some(config), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            config.extend(extra.clone());
        }
        ExternalAccountConfig::from_json(&config.to_string()).unwrap()
    }

    fn sts_response(token: &str, expires_in: u64) -> http::Response<Bytes> {
        http::Response::builder()
            .status(200)
            .body(Bytes::from(
                json!({
                    "access_token": token,
                    "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
                    "token_type": "Bearer",
                    "expires_in": expires_in
                })
                .to_string(),
            ))
            .unwrap()
    }

    fn form(request: &HttpRequest) -> HashMap<String, String> {
        form_urlencoded::parse(request.body()).into_owned().collect()
    }

    fn post(uri: &str) -> HttpRequest {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn exchanges_file_subject_token() {
        let time = time();
        let conn = TestConnection::new(vec![(
            post("https://sts.googleapis.com/v1/token"),
            sts_response("federated-token", 3600),
        )]);
        let credentials = ExternalAccountCredentials::builder()
            .config(file_config(json!({
                "quota_project_id": "billing-project",
                "scopes": ["scope-a", "scope-b"]
            })))
            .configure(&conf(&time, conn.shared()))
            .build()
            .unwrap();

        let token = credentials.access_token().await.unwrap();
        assert_eq!(token.value(), "federated-token");
        assert_eq!(
            token.expiration(),
            Some(UNIX_EPOCH + Duration::from_secs(4600))
        );

        let metadata = credentials.request_metadata().await.unwrap();
        assert_eq!(metadata["authorization"], "Bearer federated-token");
        assert_eq!(metadata["x-goog-user-project"], "billing-project");
        assert_eq!(credentials.universe_domain(), "googleapis.com");

        let requests = conn.requests();
        assert_eq!(requests.len(), 1);
        let params = form(&requests[0].actual);
        assert_eq!(params["audience"], AUDIENCE);
        assert_eq!(params["subject_token"], "oidc-jwt");
        assert_eq!(
            params["subject_token_type"],
            "urn:ietf:params:oauth:token-type:jwt"
        );
        assert_eq!(params["scope"], "scope-a scope-b");
        assert!(!params.contains_key("options"));
    }

    #[tokio::test]
    async fn impersonates_service_account() {
        let time = time();
        let conn = TestConnection::new(vec![
            (
                post("https://sts.googleapis.com/v1/token"),
                sts_response("federated-token", 3600),
            ),
            (
                post(IMPERSONATION_URL),
                http::Response::builder()
                    .status(200)
                    .body(Bytes::from_static(
                        br#"{"accessToken":"sa-token","expireTime":"1970-01-01T01:00:00Z"}"#,
                    ))
                    .unwrap(),
            ),
        ]);
        let credentials = ExternalAccountCredentials::builder()
            .config(file_config(json!({
                "service_account_impersonation_url": IMPERSONATION_URL,
                "service_account_impersonation": { "token_lifetime_seconds": 2800 },
                "scopes": ["https://www.googleapis.com/auth/devstorage.read_only"]
            })))
            .configure(&conf(&time, conn.shared()))
            .build()
            .unwrap();
        assert_eq!(
            credentials.service_account_email(),
            Some("sa@project.iam.gserviceaccount.com")
        );

        let token = credentials.access_token().await.unwrap();
        assert_eq!(token.value(), "sa-token");
        assert_eq!(token.expiration(), Some(UNIX_EPOCH + Duration::from_secs(3600)));

        let requests = conn.requests();
        assert_eq!(
            form(&requests[0].actual)["scope"],
            "https://www.googleapis.com/auth/cloud-platform"
        );
        assert_eq!(
            requests[1].actual.headers()["authorization"],
            "Bearer federated-token"
        );
        let body: serde_json::Value = serde_json::from_slice(requests[1].actual.body()).unwrap();
        assert_eq!(
            body,
            json!({
                "scope": ["https://www.googleapis.com/auth/devstorage.read_only"],
                "lifetime": "2800s"
            })
        );
    }

    #[tokio::test]
    async fn workforce_pool_user_project_is_sent_as_options() {
        let time = time();
        let conn = TestConnection::new(vec![(
            post("https://sts.example.com/v1/token"),
            sts_response("workforce-token", 3600),
        )]);
        let credentials = ExternalAccountCredentials::builder()
            .config(file_config(json!({
                "audience": WORKFORCE_AUDIENCE,
                "workforce_pool_user_project": "user-project",
                "token_url": "https://sts.example.com/v1/token"
            })))
            .configure(&conf(&time, conn.shared()))
            .build()
            .unwrap();
        credentials.access_token().await.unwrap();
        let requests = conn.requests();
        let options: serde_json::Value =
            serde_json::from_str(&form(&requests[0].actual)["options"]).unwrap();
        assert_eq!(options, json!({ "userProject": "user-project" }));
    }

    #[tokio::test]
    async fn client_authentication_replaces_user_project() {
        let time = time();
        let conn = TestConnection::new(vec![(
            post("https://sts.googleapis.com/v1/token"),
            sts_response("workforce-token", 3600),
        )]);
        let credentials = ExternalAccountCredentials::builder()
            .config(file_config(json!({
                "audience": WORKFORCE_AUDIENCE,
                "workforce_pool_user_project": "user-project",
                "client_id": "client",
                "client_secret": "secret"
            })))
            .configure(&conf(&time, conn.shared()))
            .build()
            .unwrap();
        credentials.access_token().await.unwrap();
        let requests = conn.requests();
        assert!(!form(&requests[0].actual).contains_key("options"));
        assert_eq!(
            requests[0].actual.headers()["authorization"],
            "Basic Y2xpZW50OnNlY3JldA=="
        );
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let time = time();
        let conf = conf(&time, TestConnection::new(vec![]).shared());
        let cases = [
            json!({ "type": "service_account" }),
            json!({ "credential_source": {} }),
            json!({ "credential_source": { "environment_id": "aws2", "regional_cred_verification_url": "https://sts" } }),
            json!({ "credential_source": { "environment_id": "azure1" } }),
            json!({ "credential_source": { "executable": { "command": "get-token", "timeout_millis": 1000 } } }),
            json!({ "credential_source": { "file": "/token", "format": { "type": "json" } } }),
            json!({ "workforce_pool_user_project": "project" }),
            json!({ "service_account_impersonation_url": IMPERSONATION_URL, "service_account_impersonation": { "token_lifetime_seconds": 100 } }),
        ];
        for case in cases {
            let result = ExternalAccountCredentials::builder()
                .config(file_config(case.clone()))
                .configure(&conf)
                .build();
            assert!(
                matches!(result, Err(TokenError::InvalidConfiguration(_))),
                "{} should be rejected",
                case
            );
        }
    }

    #[tokio::test]
    async fn universe_domain_selects_token_url() {
        let time = time();
        let conn = TestConnection::new(vec![(
            post("https://sts.example-universe.com/v1/token"),
            sts_response("token", 3600),
        )]);
        let credentials = ExternalAccountCredentials::builder()
            .config(file_config(json!({ "universe_domain": "example-universe.com" })))
            .configure(&conf(&time, conn.shared()))
            .build()
            .unwrap();
        assert_eq!(credentials.universe_domain(), "example-universe.com");
        credentials.access_token().await.unwrap();
        conn.assert_requests_match(&[]);
    }

    #[tokio::test]
    async fn executable_source_is_gated() {
        let time = time();
        let conn = TestConnection::new(vec![]);
        let credentials = ExternalAccountCredentials::builder()
            .config(file_config(json!({
                "credential_source": { "executable": { "command": "/bin/get-token --flag" } }
            })))
            .configure(&conf(&time, conn.shared()).with_env(Env::from_slice(&[])))
            .build()
            .unwrap();
        let err = credentials.access_token().await.unwrap_err();
        assert!(matches!(err, TokenError::Executable(_)));
        assert!(conn.requests().is_empty());
    }

    /// Answers every request after yielding to the runtime, and counts requests
    #[derive(Debug, Clone, Default)]
    struct SlowStsConnector {
        calls: Arc<AtomicUsize>,
    }

    impl HttpConnector for SlowStsConnector {
        fn call(&self, _request: HttpRequest) -> HttpConnectorFuture {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            NowOrLater::new(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(sts_response(&format!("token-{}", n), 3600))
            }))
        }
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_a_single_exchange() {
        let time = time();
        let connector = SlowStsConnector::default();
        let credentials = ExternalAccountCredentials::builder()
            .config(file_config(json!({})))
            .configure(&conf(&time, SharedHttpConnector::new(connector.clone())))
            .build()
            .unwrap();

        let tokens = join_all((0..10).map(|_| credentials.access_token())).await;
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        for token in tokens {
            assert_eq!(token.unwrap().value(), "token-0");
        }

        // once the token is inside of the expiration margin, the next caller refreshes it
        time.advance(Duration::from_secs(3500));
        let token = credentials.access_token().await.unwrap();
        assert_eq!(token.value(), "token-1");

        let forced = credentials.refresh().await.unwrap();
        assert_eq!(forced.value(), "token-2");
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
    }
}
