/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Types shared by the workload identity federation crates.
//!
//! This crate contains:
//! - [`AccessToken`] and [`SubjectToken`], the values that flow through a token exchange
//! - [`os_shim_internal`], test seams for the process environment and the file system
//! - [`time`], a clock abstraction so that expiry logic can be tested deterministically
//! - [`connector`], the HTTP transport seam used by every component that talks to the network

#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod access_token;
pub mod connector;
pub mod future;
pub mod os_shim_internal;
pub mod subject_token;
pub mod time;

#[cfg(feature = "test-util")]
pub mod test_connection;

#[cfg(feature = "test-util")]
pub mod test_util;

pub use access_token::AccessToken;
pub use subject_token::{SubjectToken, SubjectTokenType};

/// Boxed error type used at the seams between crates
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
