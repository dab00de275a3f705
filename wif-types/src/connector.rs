/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! HTTP transport seam.
//!
//! Every component that talks to the network (STS, the URL and AWS subject token suppliers,
//! service account impersonation) takes a [`SharedHttpConnector`]. A connector takes a fully
//! formed `http::Request<Bytes>` and returns a future with the fully buffered response. DNS, TLS,
//! and connection pooling are the connector's concern; callers have no knowledge of them.
//!
//! With the `rustls` feature (on by default), [`https()`] returns a connector backed by hyper and
//! rustls.

use crate::future::{BoxFuture, NowOrLater};
use crate::BoxError;
use bytes::Bytes;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Request type accepted by [`HttpConnector`]
pub type HttpRequest = http::Request<Bytes>;
/// Response type returned by [`HttpConnector`]
pub type HttpResponse = http::Response<Bytes>;

/// Future for [`HttpConnector::call`].
pub type HttpConnectorFuture = NowOrLater<
    Result<HttpResponse, ConnectorError>,
    BoxFuture<'static, Result<HttpResponse, ConnectorError>>,
>;

/// Trait with a `call` function that asynchronously converts a request into a response.
pub trait HttpConnector: Send + Sync + fmt::Debug {
    /// Asynchronously converts a request into a response.
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture;
}

/// A shared [`HttpConnector`] implementation.
#[derive(Clone, Debug)]
pub struct SharedHttpConnector(Arc<dyn HttpConnector>);

impl SharedHttpConnector {
    /// Returns a new [`SharedHttpConnector`].
    pub fn new(connection: impl HttpConnector + 'static) -> Self {
        Self(Arc::new(connection))
    }
}

impl HttpConnector for SharedHttpConnector {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        (*self.0).call(request)
    }
}

#[derive(Debug)]
enum ConnectorErrorKind {
    Timeout,
    Io,
    Other,
}

/// Error from an [`HttpConnector`]: no HTTP response was received.
///
/// The request MAY have been sent.
#[derive(Debug)]
pub struct ConnectorError {
    kind: ConnectorErrorKind,
    source: BoxError,
}

impl ConnectorError {
    /// The request timed out before a response was received
    pub fn timeout(source: impl Into<BoxError>) -> Self {
        Self {
            kind: ConnectorErrorKind::Timeout,
            source: source.into(),
        }
    }

    /// An I/O error occurred (for example the connection was reset)
    pub fn io(source: impl Into<BoxError>) -> Self {
        Self {
            kind: ConnectorErrorKind::Io,
            source: source.into(),
        }
    }

    /// Any other failure of the underlying transport
    pub fn other(source: impl Into<BoxError>) -> Self {
        Self {
            kind: ConnectorErrorKind::Other,
            source: source.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ConnectorErrorKind::Timeout)
    }

    pub fn is_io(&self) -> bool {
        matches!(self.kind, ConnectorErrorKind::Io)
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConnectorErrorKind::Timeout => write!(f, "timeout"),
            ConnectorErrorKind::Io => write!(f, "io error"),
            ConnectorErrorKind::Other => write!(f, "other"),
        }?;
        write!(f, ": {}", self.source)
    }
}

impl Error for ConnectorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(feature = "rustls")]
pub use self::hyper_connector::https;

#[cfg(feature = "rustls")]
mod hyper_connector {
    use super::{ConnectorError, HttpConnector, HttpConnectorFuture, HttpRequest};
    use crate::future::NowOrLater;
    use hyper::client::HttpConnector as HyperHttpConnector;
    use hyper_rustls::HttpsConnector;
    use std::fmt;

    /// Return a default HTTPS connector backed by hyper and rustls
    ///
    /// Certificates are verified against the webpki root store.
    pub fn https() -> super::SharedHttpConnector {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        super::SharedHttpConnector::new(HyperAdapter {
            client: hyper::Client::builder().build(https),
        })
    }

    #[derive(Clone)]
    struct HyperAdapter {
        client: hyper::Client<HttpsConnector<HyperHttpConnector>, hyper::Body>,
    }

    impl fmt::Debug for HyperAdapter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("HyperAdapter").finish_non_exhaustive()
        }
    }

    fn to_connector_error(err: hyper::Error) -> ConnectorError {
        if err.is_timeout() {
            ConnectorError::timeout(err)
        } else if err.is_connect() || err.is_incomplete_message() || err.is_closed() {
            ConnectorError::io(err)
        } else {
            ConnectorError::other(err)
        }
    }

    impl HttpConnector for HyperAdapter {
        fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
            let request = request.map(hyper::Body::from);
            let client = self.client.clone();
            NowOrLater::new(Box::pin(async move {
                let response = client.request(request).await.map_err(to_connector_error)?;
                let (parts, body) = response.into_parts();
                let body = hyper::body::to_bytes(body)
                    .await
                    .map_err(to_connector_error)?;
                Ok(http::Response::from_parts(parts, body))
            }))
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ConnectorError, HttpConnector, HttpConnectorFuture, HttpRequest, SharedHttpConnector};
    use crate::future::NowOrLater;
    use bytes::Bytes;

    #[derive(Debug)]
    struct Echo;

    impl HttpConnector for Echo {
        fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
            NowOrLater::ready(Ok(http::Response::new(request.into_body())))
        }
    }

    fn is_send_sync<T: Send + Sync>(_: T) {}

    #[tokio::test]
    async fn shared_connector_delegates() {
        let connector = SharedHttpConnector::new(Echo);
        is_send_sync(connector.clone());
        let response = connector
            .call(http::Request::new(Bytes::from_static(b"hello")))
            .await
            .expect("echo never fails");
        assert_eq!(response.body().as_ref(), b"hello");
    }

    #[test]
    fn connector_error_kinds() {
        let err = ConnectorError::timeout("took too long");
        assert!(err.is_timeout());
        assert!(!err.is_io());
        assert_eq!(err.to_string(), "timeout: took too long");
        assert!(ConnectorError::io("reset").is_io());
    }
}
