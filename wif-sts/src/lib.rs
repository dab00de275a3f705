/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! OAuth 2.0 Token Exchange ([RFC 8693](https://www.rfc-editor.org/rfc/rfc8693)) client.
//!
//! Used for identity federation (exchanging a third-party subject token for an access token) and
//! for credential access boundaries (exchanging an access token for a downscoped token or an
//! intermediary token).

#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod client;
pub mod error;
pub mod request;
pub mod response;

pub use client::{ClientAuthentication, StsExchangeClient};
pub use error::{OAuthError, RetryKind, StsError};
pub use request::{
    ActingParty, StsTokenExchangeRequest, GRANT_TYPE_TOKEN_EXCHANGE,
    TOKEN_TYPE_ACCESS_BOUNDARY_INTERMEDIARY_TOKEN,
};
pub use response::StsTokenExchangeResponse;
