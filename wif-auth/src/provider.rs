/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! The access token provider abstraction

use crate::error::TokenError;
use std::fmt::Debug;
use std::sync::Arc;
use wif_types::AccessToken;

/// Universe domain of credentials that do not configure one
pub const DEFAULT_UNIVERSE_DOMAIN: &str = "googleapis.com";

pub type Result = std::result::Result<AccessToken, TokenError>;

pub mod future {
    use wif_types::future::{BoxFuture, NowOrLater};
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Future returned by [`ProvideAccessToken`](super::ProvideAccessToken)
    #[derive(Debug)]
    pub struct ProvideAccessToken<'a>(NowOrLater<super::Result, BoxFuture<'a, super::Result>>);

    impl<'a> ProvideAccessToken<'a> {
        pub fn new(future: impl Future<Output = super::Result> + Send + 'a) -> Self {
            ProvideAccessToken(NowOrLater::new(Box::pin(future)))
        }

        pub fn ready(token: super::Result) -> Self {
            ProvideAccessToken(NowOrLater::ready(token))
        }
    }

    impl Future for ProvideAccessToken<'_> {
        type Output = super::Result;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            Pin::new(&mut self.0).poll(cx)
        }
    }
}

/// Asynchronous access token provider
///
/// Implemented by every credential in this crate so that credentials can be layered: a
/// downscoped credential or an access boundary factory takes any `ProvideAccessToken` as its
/// source.
pub trait ProvideAccessToken: Send + Sync + Debug {
    /// Returns a valid access token, refreshing it if needed
    fn access_token<'a>(&'a self) -> future::ProvideAccessToken<'a>
    where
        Self: 'a;

    /// The universe domain tokens from this provider are valid in
    fn universe_domain(&self) -> &str {
        DEFAULT_UNIVERSE_DOMAIN
    }
}

/// A static token is its own provider. It is never refreshed.
impl ProvideAccessToken for AccessToken {
    fn access_token<'a>(&'a self) -> future::ProvideAccessToken<'a>
    where
        Self: 'a,
    {
        future::ProvideAccessToken::ready(Ok(self.clone()))
    }
}

/// A shared, cheaply clonable [`ProvideAccessToken`]
#[derive(Clone, Debug)]
pub struct SharedTokenProvider(Arc<dyn ProvideAccessToken>);

impl SharedTokenProvider {
    pub fn new(provider: impl ProvideAccessToken + 'static) -> Self {
        Self(Arc::new(provider))
    }
}

impl ProvideAccessToken for SharedTokenProvider {
    fn access_token<'a>(&'a self) -> future::ProvideAccessToken<'a>
    where
        Self: 'a,
    {
        self.0.access_token()
    }

    fn universe_domain(&self) -> &str {
        self.0.universe_domain()
    }
}
