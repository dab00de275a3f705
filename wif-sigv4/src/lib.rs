/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! AWS Signature Version 4 request signing.
//!
//! An AWS-based subject token is a `GetCallerIdentity` request signed with the workload's AWS
//! credentials. This crate produces that signature:
//!
//! ```rust
//! use wif_sigv4::{sign, AwsSecurityCredentials, SignableRequest};
//! use std::time::SystemTime;
//!
//! let credentials = AwsSecurityCredentials::new("AKIDEXAMPLE", "secret", None);
//! let request = SignableRequest::new(
//!     "POST",
//!     "https://sts.us-east-1.amazonaws.com?Action=GetCallerIdentity&Version=2011-06-15",
//!     "us-east-1",
//! );
//! let signature = sign(&request, &credentials, SystemTime::now()).unwrap();
//! assert!(signature.authorization_header().starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
//! ```

#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod canonical_request;
mod date_fmt;
pub mod error;
pub mod sign;

pub use error::SigningError;
pub use sign::{sign, AwsRequestSignature, AwsSecurityCredentials, SignableRequest};
