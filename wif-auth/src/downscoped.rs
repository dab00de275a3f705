/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Credential access boundaries
//!
//! A [`CredentialAccessBoundary`] restricts the permissions of a source credential.
//! [`DownscopedCredentials`] have the token endpoint apply the boundary, while an
//! [`AccessBoundaryFactory`] obtains an intermediary token and session key from which
//! attenuated tokens are minted locally.

use crate::cache::{CredentialLifecycle, Expiry};
use crate::error::TokenError;
use crate::external_account::default_token_url;
use crate::provider::{self, future, ProvideAccessToken, SharedTokenProvider, DEFAULT_UNIVERSE_DOMAIN};
use crate::provider_config::ProviderConfig;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use wif_sts::{
    StsExchangeClient, StsTokenExchangeRequest, StsTokenExchangeResponse,
    TOKEN_TYPE_ACCESS_BOUNDARY_INTERMEDIARY_TOKEN,
};
use wif_types::subject_token::TOKEN_TYPE_ACCESS_TOKEN;
use wif_types::AccessToken;

const MAX_RULES: usize = 10;
const ROLE_PREFIX: &str = "inRole:";

/// A CEL condition that further restricts where a rule applies
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AvailabilityCondition {
    expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl AvailabilityCondition {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            title: None,
            description: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// The permissions available on one resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessBoundaryRule {
    available_resource: String,
    available_permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability_condition: Option<AvailabilityCondition>,
}

impl AccessBoundaryRule {
    /// Every permission must be a role prefixed with `inRole:`
    pub fn new<P>(available_resource: impl Into<String>, available_permissions: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            available_resource: available_resource.into(),
            available_permissions: available_permissions.into_iter().map(Into::into).collect(),
            availability_condition: None,
        }
    }

    pub fn with_availability_condition(mut self, condition: AvailabilityCondition) -> Self {
        self.availability_condition = Some(condition);
        self
    }

    pub fn available_resource(&self) -> &str {
        &self.available_resource
    }

    pub fn available_permissions(&self) -> &[String] {
        &self.available_permissions
    }

    pub fn availability_condition(&self) -> Option<&AvailabilityCondition> {
        self.availability_condition.as_ref()
    }

    fn validate(&self) -> Result<(), TokenError> {
        if self.available_resource.is_empty() {
            return Err(TokenError::invalid_configuration(
                "an access boundary rule must name a resource",
            ));
        }
        if self.available_permissions.is_empty() {
            return Err(TokenError::invalid_configuration(format!(
                "the access boundary rule for `{}` has no permissions",
                self.available_resource
            )));
        }
        if let Some(permission) = self
            .available_permissions
            .iter()
            .find(|permission| !permission.starts_with(ROLE_PREFIX))
        {
            return Err(TokenError::invalid_configuration(format!(
                "permission `{}` must start with `{}`",
                permission, ROLE_PREFIX
            )));
        }
        if matches!(&self.availability_condition, Some(condition) if condition.expression.is_empty())
        {
            return Err(TokenError::invalid_configuration(
                "an availability condition requires an expression",
            ));
        }
        Ok(())
    }
}

/// Between one and ten [`AccessBoundaryRule`]s
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialAccessBoundary {
    rules: Vec<AccessBoundaryRule>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BoundaryDocument<'a> {
    access_boundary: BoundaryRules<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BoundaryRules<'a> {
    access_boundary_rules: &'a [AccessBoundaryRule],
}

impl CredentialAccessBoundary {
    pub fn new(rules: Vec<AccessBoundaryRule>) -> Result<Self, TokenError> {
        if rules.is_empty() || rules.len() > MAX_RULES {
            return Err(TokenError::invalid_configuration(format!(
                "a credential access boundary must contain between 1 and {} rules, got {}",
                MAX_RULES,
                rules.len()
            )));
        }
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[AccessBoundaryRule] {
        &self.rules
    }

    /// `{"accessBoundary":{"accessBoundaryRules":[...]}}`
    pub fn to_json(&self) -> Result<String, TokenError> {
        serde_json::to_string(&BoundaryDocument {
            access_boundary: BoundaryRules {
                access_boundary_rules: &self.rules,
            },
        })
        .map_err(TokenError::invalid_configuration)
    }
}

fn sts_client(
    source: &SharedTokenProvider,
    universe_domain: Option<&str>,
    conf: &ProviderConfig,
) -> Result<(StsExchangeClient, String), TokenError> {
    let universe_domain = universe_domain.unwrap_or(DEFAULT_UNIVERSE_DOMAIN);
    if source.universe_domain() != universe_domain {
        return Err(TokenError::invalid_configuration(format!(
            "the source credential's universe domain `{}` does not match `{}`",
            source.universe_domain(),
            universe_domain
        )));
    }
    let client = StsExchangeClient::new(
        default_token_url(universe_domain),
        conf.connector()?,
        conf.time_source(),
    );
    Ok((client, universe_domain.to_string()))
}

/// Without `expires_in` the issued token lives as long as the token it was exchanged for
fn issued_token(response: &StsTokenExchangeResponse, source: &AccessToken) -> AccessToken {
    let token = response.access_token();
    match response.expires_in() {
        Some(_) => token.clone(),
        None => token.with_expiration(source.expiration()),
    }
}

/// Credentials whose tokens carry a credential access boundary
///
/// Every refresh obtains a token from the source credential and exchanges it for a token
/// restricted to the boundary.
#[derive(Clone, Debug)]
pub struct DownscopedCredentials {
    inner: Arc<DownscopedInner>,
    lifecycle: CredentialLifecycle<AccessToken>,
}

#[derive(Debug)]
struct DownscopedInner {
    source: SharedTokenProvider,
    boundary: String,
    sts: StsExchangeClient,
    universe_domain: String,
}

impl DownscopedCredentials {
    /// `universe_domain` defaults to `googleapis.com` and must match the source credential
    pub fn new(
        source: SharedTokenProvider,
        boundary: &CredentialAccessBoundary,
        universe_domain: Option<&str>,
        conf: &ProviderConfig,
    ) -> Result<Self, TokenError> {
        let (sts, universe_domain) = sts_client(&source, universe_domain, conf)?;
        Ok(Self {
            inner: Arc::new(DownscopedInner {
                source,
                boundary: boundary.to_json()?,
                sts,
                universe_domain,
            }),
            lifecycle: CredentialLifecycle::new(conf.time_source()),
        })
    }

    /// Forces a token refresh even if the cached token is still valid
    pub async fn refresh(&self) -> provider::Result {
        self.lifecycle.refresh(|| self.inner.fetch_token()).await
    }

    async fn token(&self) -> provider::Result {
        self.lifecycle
            .get_or_refresh(|| self.inner.fetch_token())
            .await
    }
}

impl DownscopedInner {
    async fn fetch_token(&self) -> provider::Result {
        let source = self.source.access_token().await?;
        let request = StsTokenExchangeRequest::new(source.value(), TOKEN_TYPE_ACCESS_TOKEN)
            .with_requested_token_type(TOKEN_TYPE_ACCESS_TOKEN)
            .with_internal_options(self.boundary.clone());
        let response = self.sts.exchange_token(&request).await?;
        Ok(issued_token(&response, &source))
    }
}

impl ProvideAccessToken for DownscopedCredentials {
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

/// An intermediary token and the session key used to mint attenuated tokens from it
#[derive(Clone, PartialEq, Eq)]
pub struct IntermediaryCredentials {
    token: AccessToken,
    session_key: String,
}

impl fmt::Debug for IntermediaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntermediaryCredentials")
            .field("token", &self.token)
            .field("session_key", &"** redacted **")
            .finish()
    }
}

impl IntermediaryCredentials {
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// The opaque `access_boundary_session_key`
    pub fn session_key(&self) -> &str {
        &self.session_key
    }
}

impl Expiry for IntermediaryCredentials {
    fn expiration(&self) -> Option<SystemTime> {
        self.token.expiration()
    }
}

/// Obtains and caches [`IntermediaryCredentials`] for a source credential
#[derive(Clone, Debug)]
pub struct AccessBoundaryFactory {
    source: SharedTokenProvider,
    sts: StsExchangeClient,
    lifecycle: CredentialLifecycle<IntermediaryCredentials>,
}

impl AccessBoundaryFactory {
    /// `universe_domain` defaults to `googleapis.com` and must match the source credential
    pub fn new(
        source: SharedTokenProvider,
        universe_domain: Option<&str>,
        conf: &ProviderConfig,
    ) -> Result<Self, TokenError> {
        let (sts, _) = sts_client(&source, universe_domain, conf)?;
        Ok(Self {
            source,
            sts,
            lifecycle: CredentialLifecycle::new(conf.time_source()),
        })
    }

    /// The cached intermediary credentials, refreshed first if they are about to expire
    pub async fn intermediary_credentials(&self) -> Result<IntermediaryCredentials, TokenError> {
        self.lifecycle
            .get_or_refresh(|| self.fetch_intermediary())
            .await
    }

    /// Refreshes the intermediary credentials even if the cached ones are still valid
    pub async fn refresh_credentials(&self) -> Result<IntermediaryCredentials, TokenError> {
        self.lifecycle.refresh(|| self.fetch_intermediary()).await
    }

    async fn fetch_intermediary(&self) -> Result<IntermediaryCredentials, TokenError> {
        let source = self.source.access_token().await?;
        let request = StsTokenExchangeRequest::new(source.value(), TOKEN_TYPE_ACCESS_TOKEN)
            .with_requested_token_type(TOKEN_TYPE_ACCESS_BOUNDARY_INTERMEDIARY_TOKEN);
        let response = self.sts.exchange_token(&request).await?;
        let session_key = response
            .access_boundary_session_key()
            .ok_or_else(|| {
                TokenError::provider_error(
                    "the token exchange response is missing `access_boundary_session_key`",
                )
            })?
            .to_string();
        Ok(IntermediaryCredentials {
            token: issued_token(&response, &source),
            session_key,
        })
    }
}
