/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Workload identity federation credentials.
//!
//! [`ExternalAccountCredentials`](external_account::ExternalAccountCredentials) turn a token
//! issued by a third party identity provider (an OIDC token in a file, a SAML assertion served
//! by a local endpoint, the output of an executable, or a signed AWS request) into an access
//! token, by way of an RFC 8693 token exchange. Tokens are cached and refreshed by a
//! [`CredentialLifecycle`](cache::CredentialLifecycle) that runs at most one refresh at a time.
//!
//! [`downscoped`] restricts the permissions of any credential with a credential access
//! boundary.

#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod cache;
pub mod downscoped;
pub mod error;
pub mod external_account;
pub mod impersonation;
pub mod provider;
pub mod provider_config;
pub mod subject_token;

pub use error::TokenError;
pub use external_account::{ExternalAccountConfig, ExternalAccountCredentials};
pub use provider::{ProvideAccessToken, SharedTokenProvider};
pub use provider_config::ProviderConfig;
pub use wif_types::{AccessToken, SubjectToken, SubjectTokenType};
