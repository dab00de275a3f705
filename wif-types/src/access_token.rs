/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// An OAuth2 access token and the time it stops being valid.
///
/// Tokens are immutable and cheap to clone. A refresh never mutates a token in place: it produces
/// a new `AccessToken` that replaces the previous one wholesale.
///
/// A token without an expiration time never expires.
#[derive(Clone, Eq, PartialEq)]
pub struct AccessToken(Arc<Inner>);

#[derive(Eq, PartialEq)]
struct Inner {
    value: String,
    expiration: Option<SystemTime>,
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AccessToken");
        debug.field("value", &"** redacted **");
        if let Some(expiration) = self.0.expiration {
            if let Ok(since_epoch) = expiration.duration_since(UNIX_EPOCH) {
                debug.field("expires_after_epoch_secs", &since_epoch.as_secs());
            } else {
                debug.field("expiration", &expiration);
            }
        } else {
            debug.field("expiration", &"never");
        }
        debug.finish()
    }
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expiration: Option<SystemTime>) -> Self {
        AccessToken(Arc::new(Inner {
            value: value.into(),
            expiration,
        }))
    }

    /// The bearer value of this token
    pub fn value(&self) -> &str {
        &self.0.value
    }

    /// The time after which this token is no longer valid. `None` means the token does not expire.
    pub fn expiration(&self) -> Option<SystemTime> {
        self.0.expiration
    }

    /// Returns true if `now` is within `margin` of the expiration time (or past it).
    ///
    /// Tokens without an expiration are never expired.
    pub fn expires_within(&self, now: SystemTime, margin: Duration) -> bool {
        match self.0.expiration {
            Some(expiration) => now + margin >= expiration,
            None => false,
        }
    }

    /// Returns a copy of this token with the given expiration
    pub fn with_expiration(&self, expiration: Option<SystemTime>) -> Self {
        AccessToken::new(self.0.value.clone(), expiration)
    }
}
