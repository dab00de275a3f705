/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Single-flight token cache shared by every credential in this crate

use crate::error::TokenError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace_span, warn, Instrument};
use wif_types::time::{SharedTimeSource, TimeSource};
use wif_types::AccessToken;

/// Tokens are refreshed this long before they actually expire
pub const DEFAULT_EXPIRATION_MARGIN: Duration = Duration::from_secs(3 * 60 + 45);

/// A cached value with an optional expiration time
pub trait Expiry {
    /// `None` means the value never expires
    fn expiration(&self) -> Option<SystemTime>;
}

impl Expiry for AccessToken {
    fn expiration(&self) -> Option<SystemTime> {
        AccessToken::expiration(self)
    }
}

/// Owns the current token of one credential and serializes its refreshes.
///
/// - A cached token outside of the expiration margin is returned without any I/O.
/// - Otherwise the caller takes the refresh lock. Callers that queued behind an in-flight refresh
///   re-check the cache once they get the lock, so concurrent callers share a single refresh.
/// - A failed refresh leaves the previous token in place and returns the error to the caller that
///   ran it. The next caller tries again.
///
/// The cached value is replaced wholesale; readers never see a partially updated token.
pub struct CredentialLifecycle<T> {
    cached: Arc<RwLock<Option<T>>>,
    refresh_lock: Arc<Mutex<()>>,
    time_source: SharedTimeSource,
    margin: Duration,
}

impl<T> Clone for CredentialLifecycle<T> {
    fn clone(&self) -> Self {
        CredentialLifecycle {
            cached: self.cached.clone(),
            refresh_lock: self.refresh_lock.clone(),
            time_source: self.time_source.clone(),
            margin: self.margin,
        }
    }
}

impl<T> fmt::Debug for CredentialLifecycle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLifecycle")
            .field("time_source", &self.time_source)
            .field("margin", &self.margin)
            .finish()
    }
}

impl<T> CredentialLifecycle<T>
where
    T: Expiry + Clone + Send + Sync,
{
    pub fn new(time_source: SharedTimeSource) -> Self {
        CredentialLifecycle {
            cached: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            time_source,
            margin: DEFAULT_EXPIRATION_MARGIN,
        }
    }

    /// Overrides [`DEFAULT_EXPIRATION_MARGIN`]
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// The cached value, fresh or not
    pub async fn cached(&self) -> Option<T> {
        self.cached.read().await.clone()
    }

    fn is_fresh(&self, value: &T) -> bool {
        match value.expiration() {
            Some(expiration) => self.time_source.now() + self.margin < expiration,
            None => true,
        }
    }

    async fn fresh(&self) -> Option<T> {
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|value| self.is_fresh(value))
            .cloned()
    }

    /// Returns the cached value if it is fresh, otherwise runs `refresh` under the refresh lock
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<T, TokenError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TokenError>>,
    {
        if let Some(value) = self.fresh().await {
            return Ok(value);
        }
        let _guard = self.refresh_lock.lock().await;
        // another caller may have refreshed while we waited for the lock
        if let Some(value) = self.fresh().await {
            return Ok(value);
        }
        self.run_refresh(refresh).await
    }

    /// Runs `refresh` under the refresh lock even if the cached value is still fresh
    pub async fn refresh<F, Fut>(&self, refresh: F) -> Result<T, TokenError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TokenError>>,
    {
        let _guard = self.refresh_lock.lock().await;
        self.run_refresh(refresh).await
    }

    async fn run_refresh<F, Fut>(&self, refresh: F) -> Result<T, TokenError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TokenError>>,
    {
        let span = trace_span!("lazy_refresh_token");
        async {
            debug!("refreshing token");
            match refresh().await {
                Ok(value) => {
                    *self.cached.write().await = Some(value.clone());
                    debug!(expiration = ?value.expiration(), "token refreshed");
                    Ok(value)
                }
                Err(err) => {
                    warn!(error = %err, "token refresh failed; keeping the previous token");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{CredentialLifecycle, DEFAULT_EXPIRATION_MARGIN};
    use crate::error::TokenError;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use wif_types::test_util::capture_test_logs;
    use wif_types::time::{ManualTimeSource, SharedTimeSource};
    use wif_types::AccessToken;

    fn epoch_secs(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn token(value: &str, expires_secs: u64) -> AccessToken {
        AccessToken::new(value, Some(epoch_secs(expires_secs)))
    }

    fn test_lifecycle(time: &ManualTimeSource) -> CredentialLifecycle<AccessToken> {
        CredentialLifecycle::new(SharedTimeSource::new(time.clone()))
    }

    /// Refresh function that pops the next result off of a list
    fn next_from(
        list: &Arc<Mutex<Vec<Result<AccessToken, TokenError>>>>,
    ) -> impl std::future::Future<Output = Result<AccessToken, TokenError>> {
        let next = list.lock().unwrap().remove(0);
        async move { next }
    }

    #[tokio::test]
    async fn fresh_tokens_are_returned_without_refreshing() {
        let time = ManualTimeSource::new(epoch_secs(100));
        let lifecycle = test_lifecycle(&time);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let token = lifecycle
                .get_or_refresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(token("first", 1000))
                })
                .await
                .unwrap();
            assert_eq!(token.value(), "first");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn margin_triggers_refresh_before_expiry() {
        let time = ManualTimeSource::new(epoch_secs(100));
        let lifecycle = test_lifecycle(&time);
        let list = Arc::new(Mutex::new(vec![Ok(token("a", 1000)), Ok(token("b", 2000))]));

        let first = lifecycle.get_or_refresh(|| next_from(&list)).await.unwrap();
        assert_eq!(first.value(), "a");

        // still before expiry, but inside of the margin
        time.set_time(epoch_secs(1000) - DEFAULT_EXPIRATION_MARGIN);
        let second = lifecycle.get_or_refresh(|| next_from(&list)).await.unwrap();
        assert_eq!(second.value(), "b");
    }

    #[tokio::test]
    async fn tokens_without_expiration_are_always_fresh() {
        let time = ManualTimeSource::new(epoch_secs(100));
        let lifecycle = test_lifecycle(&time);
        lifecycle
            .get_or_refresh(|| async { Ok(AccessToken::new("forever", None)) })
            .await
            .unwrap();
        time.advance(Duration::from_secs(10 * 365 * 24 * 3600));
        let token = lifecycle
            .get_or_refresh(|| async { Err(TokenError::provider_error("must not refresh")) })
            .await
            .unwrap();
        assert_eq!(token.value(), "forever");
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_refresh() {
        let time = ManualTimeSource::new(epoch_secs(100));
        let lifecycle = test_lifecycle(&time);
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..16).map(|_| {
            let lifecycle = lifecycle.clone();
            let calls = calls.clone();
            async move {
                lifecycle
                    .get_or_refresh(|| async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        // keep the refresh in flight while the other callers queue up
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(token(&format!("token-{}", n), 1000))
                    })
                    .await
            }
        });
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().value(), "token-0");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn near_expiry_token_is_refreshed_once_across_threads() {
        let time = ManualTimeSource::new(epoch_secs(100));
        let lifecycle = test_lifecycle(&time);
        lifecycle
            .get_or_refresh(|| async { Ok(token("old", 1000)) })
            .await
            .unwrap();
        // one second inside of the margin
        time.set_time(epoch_secs(1000) - DEFAULT_EXPIRATION_MARGIN + Duration::from_secs(1));

        let calls = Arc::new(AtomicUsize::new(0));
        let callers = (0..16).map(|_| {
            let lifecycle = lifecycle.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                lifecycle
                    .get_or_refresh(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(token("new", 5000))
                    })
                    .await
            })
        });
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap().value(), "new");
        }
        assert_eq!(lifecycle.cached().await.unwrap().value(), "new");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let (_guard, logs) = capture_test_logs();
        let time = ManualTimeSource::new(epoch_secs(100));
        let lifecycle = test_lifecycle(&time);
        let list = Arc::new(Mutex::new(vec![
            Ok(token("a", 1000)),
            Err(TokenError::provider_error("sts is down")),
            Ok(token("c", 3000)),
        ]));

        lifecycle.get_or_refresh(|| next_from(&list)).await.unwrap();
        time.set_time(epoch_secs(1500));

        let err = lifecycle
            .get_or_refresh(|| next_from(&list))
            .await
            .expect_err("refresh fails");
        assert!(err.to_string().contains("sts is down"));
        assert_eq!(lifecycle.cached().await.unwrap().value(), "a");
        assert!(logs.contents().contains("token refresh failed"));

        let token = lifecycle.get_or_refresh(|| next_from(&list)).await.unwrap();
        assert_eq!(token.value(), "c");
    }

    #[tokio::test]
    async fn forced_refresh_replaces_a_fresh_token() {
        let time = ManualTimeSource::new(epoch_secs(100));
        let lifecycle = test_lifecycle(&time);
        let list = Arc::new(Mutex::new(vec![Ok(token("a", 1000)), Ok(token("b", 1000))]));
        lifecycle.get_or_refresh(|| next_from(&list)).await.unwrap();
        let refreshed = lifecycle.refresh(|| next_from(&list)).await.unwrap();
        assert_eq!(refreshed.value(), "b");
        assert_eq!(lifecycle.cached().await.unwrap().value(), "b");
    }
}
