/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Futures returned by connectors and token providers

use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pin_project! {
    /// Result of a connector call or a token lookup
    ///
    /// A token served from a cache, or a response scripted by a test connection, is already
    /// known when the call returns. [`NowOrLater::ready`] hands it back without boxing.
    /// Anything that needs I/O (a token exchange, a metadata request) goes through
    /// [`NowOrLater::new`].
    pub struct NowOrLater<T, F> {
        #[pin]
        state: State<T, F>
    }
}

impl<T, F> std::fmt::Debug for NowOrLater<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Ready { .. } => "ready",
            State::Deferred { .. } => "deferred",
        };
        f.debug_struct("NowOrLater").field("state", &state).finish()
    }
}

pin_project! {
    #[project = StateProj]
    enum State<T, F> {
        Ready { value: Option<T> },
        Deferred { #[pin] future: F },
    }
}

impl<T, F> NowOrLater<T, F> {
    /// Resolves once `future` does
    pub fn new(future: F) -> Self {
        Self {
            state: State::Deferred { future },
        }
    }

    /// Resolves to `value` on the first poll
    pub fn ready(value: T) -> Self {
        Self {
            state: State::Ready { value: Some(value) },
        }
    }
}

impl<T, F> Future for NowOrLater<T, F>
where
    F: Future<Output = T>,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().state.project() {
            StateProj::Ready { value } => {
                Poll::Ready(value.take().expect("NowOrLater polled after completion"))
            }
            StateProj::Deferred { future } => future.poll(cx),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::future::{BoxFuture, NowOrLater};
    use futures_util::FutureExt;

    type TokenLookup = NowOrLater<Result<String, String>, BoxFuture<'static, Result<String, String>>>;

    #[test]
    fn cached_value_is_available_without_a_runtime() {
        let lookup = TokenLookup::ready(Ok("cached-token".to_string()));
        assert_eq!(
            lookup.now_or_never().expect("value was ready"),
            Ok("cached-token".to_string())
        );
    }

    #[tokio::test]
    async fn deferred_lookup_resolves_with_its_future() {
        let lookup = TokenLookup::new(Box::pin(async {
            tokio::task::yield_now().await;
            Err("exchange failed".to_string())
        }));
        assert_eq!(format!("{:?}", lookup), r#"NowOrLater { state: "deferred" }"#);
        assert_eq!(lookup.await, Err("exchange failed".to_string()));
    }
}
