/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Sources of subject tokens
//!
//! A [`SubjectTokenSupplier`] produces a fresh [`SubjectToken`] for every token exchange:
//! - [`File`](SubjectTokenSupplier::File): a file, for example a projected Kubernetes token
//! - [`Url`](SubjectTokenSupplier::Url): a local metadata endpoint
//! - [`Executable`](SubjectTokenSupplier::Executable): an external executable
//! - [`Aws`](SubjectTokenSupplier::Aws): a signed AWS `GetCallerIdentity` request
//! - [`Custom`](SubjectTokenSupplier::Custom): any [`ProvideSubjectToken`] implementation

pub mod aws;
pub mod executable;
pub mod file;
mod format;
pub mod url;

pub use format::SubjectTokenFormat;

use crate::error::TokenError;
use std::fmt::Debug;
use std::sync::Arc;
use wif_types::connector::{HttpConnector, HttpRequest, HttpResponse, SharedHttpConnector};
use wif_types::future::BoxFuture;
use wif_types::{SubjectToken, SubjectTokenType};

/// What a supplier knows about the exchange it produces a token for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectTokenContext {
    audience: String,
    subject_token_type: SubjectTokenType,
    impersonated_email: Option<String>,
}

impl SubjectTokenContext {
    pub fn new(audience: impl Into<String>, subject_token_type: SubjectTokenType) -> Self {
        Self {
            audience: audience.into(),
            subject_token_type,
            impersonated_email: None,
        }
    }

    /// Service account that the exchanged token will impersonate
    pub fn with_impersonated_email(mut self, email: impl Into<String>) -> Self {
        self.impersonated_email = Some(email.into());
        self
    }

    /// Audience of the token exchange, typically the workload identity pool provider
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// The configured subject token type
    pub fn subject_token_type(&self) -> &SubjectTokenType {
        &self.subject_token_type
    }

    pub fn impersonated_email(&self) -> Option<&str> {
        self.impersonated_email.as_deref()
    }
}

/// A user supplied source of subject tokens
pub trait ProvideSubjectToken: Send + Sync + Debug {
    fn subject_token<'a>(
        &'a self,
        context: &'a SubjectTokenContext,
    ) -> BoxFuture<'a, Result<SubjectToken, TokenError>>;
}

/// A shared, cheaply clonable [`ProvideSubjectToken`]
#[derive(Clone, Debug)]
pub struct SharedSubjectTokenSupplier(Arc<dyn ProvideSubjectToken>);

impl SharedSubjectTokenSupplier {
    pub fn new(supplier: impl ProvideSubjectToken + 'static) -> Self {
        Self(Arc::new(supplier))
    }
}

/// Where subject tokens come from
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum SubjectTokenSupplier {
    File(file::FileSupplier),
    Url(url::UrlSupplier),
    Executable(executable::ExecutableSupplier),
    Aws(aws::AwsSupplier),
    Custom(SharedSubjectTokenSupplier),
}

impl SubjectTokenSupplier {
    /// Produces a fresh subject token
    pub async fn subject_token(
        &self,
        context: &SubjectTokenContext,
    ) -> Result<SubjectToken, TokenError> {
        match self {
            SubjectTokenSupplier::File(supplier) => supplier.subject_token(context).await,
            SubjectTokenSupplier::Url(supplier) => supplier.subject_token(context).await,
            SubjectTokenSupplier::Executable(supplier) => supplier.subject_token(context).await,
            SubjectTokenSupplier::Aws(supplier) => supplier.subject_token(context).await,
            SubjectTokenSupplier::Custom(supplier) => supplier.0.subject_token(context).await,
        }
    }
}

/// Dispatches `request`. Transport failures keep the [`ConnectorError`](wif_types::connector::ConnectorError)
/// as the error source so they can be classified as retryable.
pub(crate) async fn send(
    connector: &SharedHttpConnector,
    request: HttpRequest,
) -> Result<HttpResponse, TokenError> {
    connector
        .call(request)
        .await
        .map_err(TokenError::provider_error)
}
