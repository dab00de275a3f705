/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Connectors useful for testing.

use crate::connector::{
    ConnectorError, HttpConnector, HttpConnectorFuture, HttpRequest, HttpResponse,
    SharedHttpConnector,
};
use crate::future::NowOrLater;
use bytes::Bytes;
use http::header::HeaderName;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Test connection to capture a single request
#[derive(Debug, Clone)]
pub struct CaptureRequestHandler(Arc<Mutex<CaptureInner>>);

#[derive(Debug)]
struct CaptureInner {
    response: Option<HttpResponse>,
    sender: Option<oneshot::Sender<HttpRequest>>,
}

/// Receiver for [`CaptureRequestHandler`]
#[derive(Debug)]
pub struct CaptureRequestReceiver {
    receiver: oneshot::Receiver<HttpRequest>,
}

impl CaptureRequestReceiver {
    #[track_caller]
    pub fn expect_request(mut self) -> HttpRequest {
        self.receiver.try_recv().expect("no request was received")
    }

    #[track_caller]
    pub fn expect_no_request(mut self) {
        self.receiver
            .try_recv()
            .expect_err("expected no request to be received!");
    }
}

impl HttpConnector for CaptureRequestHandler {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        let mut inner = self.0.lock().unwrap();
        inner
            .sender
            .take()
            .expect("already sent")
            .send(request)
            .expect("channel not ready");
        NowOrLater::ready(Ok(inner
            .response
            .take()
            .expect("could not handle second request")))
    }
}

/// Test connection used to capture a single request
///
/// If response is `None`, it will reply with a 200 response with an empty body
///
/// Example:
/// ```rust
/// use wif_types::connector::HttpConnector;
/// use wif_types::test_connection::capture_request;
/// # async fn docs() {
/// let (connector, request) = capture_request(None);
/// let _ = connector.call(http::Request::new("body".into())).await;
/// assert_eq!(request.expect_request().body().as_ref(), b"body");
/// # }
/// ```
pub fn capture_request(
    response: Option<HttpResponse>,
) -> (CaptureRequestHandler, CaptureRequestReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        CaptureRequestHandler(Arc::new(Mutex::new(CaptureInner {
            response: Some(response.unwrap_or_else(|| {
                http::Response::builder()
                    .status(200)
                    .body(Bytes::new())
                    .expect("unreachable")
            })),
            sender: Some(tx),
        }))),
        CaptureRequestReceiver { receiver: rx },
    )
}

type ConnectVec = Vec<(HttpRequest, HttpResponse)>;

/// An expected request paired with the request that was actually sent
#[derive(Debug)]
pub struct ValidateRequest {
    pub expected: HttpRequest,
    pub actual: HttpRequest,
}

impl ValidateRequest {
    #[track_caller]
    pub fn assert_matches(&self, ignore_headers: &[HeaderName]) {
        let (actual, expected) = (&self.actual, &self.expected);
        for (name, value) in expected.headers() {
            if !ignore_headers.contains(name) {
                let actual_header = actual
                    .headers()
                    .get(name)
                    .unwrap_or_else(|| panic!("Header {:?} missing", name));
                assert_eq!(
                    actual_header.to_str().unwrap(),
                    value.to_str().unwrap(),
                    "Header mismatch for {:?}",
                    name
                );
            }
        }
        match (
            std::str::from_utf8(actual.body()),
            std::str::from_utf8(expected.body()),
        ) {
            (Ok(actual), Ok(expected)) => assert_eq!(actual, expected, "body mismatch"),
            _ => assert_eq!(actual.body(), expected.body()),
        };
        assert_eq!(actual.method(), expected.method(), "method mismatch");
        assert_eq!(actual.uri(), expected.uri(), "uri mismatch");
    }
}

/// A basic test connection. It will:
/// - Respond to requests with a preloaded series of responses
/// - Record requests for future examination
///
/// Usage example:
/// ```rust
/// use wif_types::test_connection::TestConnection;
/// let events = vec![(
///    http::Request::new("request body".into()),
///    http::Response::builder()
///        .status(200)
///        .body("response body".into())
///        .unwrap(),
/// )];
/// let conn = TestConnection::new(events);
/// ```
#[derive(Clone)]
pub struct TestConnection {
    data: Arc<Mutex<ConnectVec>>,
    requests: Arc<Mutex<Vec<ValidateRequest>>>,
}

impl fmt::Debug for TestConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestConnection")
            .field("remaining", &self.data.lock().unwrap().len())
            .finish()
    }
}

impl TestConnection {
    pub fn new(mut data: ConnectVec) -> Self {
        data.reverse();
        TestConnection {
            data: Arc::new(Mutex::new(data)),
            requests: Default::default(),
        }
    }

    pub fn requests(&self) -> impl Deref<Target = Vec<ValidateRequest>> + '_ {
        self.requests.lock().unwrap()
    }

    /// Wraps a clone of this connection in a [`SharedHttpConnector`]
    pub fn shared(&self) -> SharedHttpConnector {
        SharedHttpConnector::new(self.clone())
    }

    #[track_caller]
    pub fn assert_requests_match(&self, ignore_headers: &[HeaderName]) {
        for req in self.requests().iter() {
            req.assert_matches(ignore_headers)
        }
        let remaining_requests = self.data.lock().unwrap().len();
        let actual_requests = self.requests().len();
        assert_eq!(
            remaining_requests, 0,
            "Expected {} additional requests ({} were made)",
            remaining_requests, actual_requests
        );
    }
}

impl HttpConnector for TestConnection {
    fn call(&self, actual: HttpRequest) -> HttpConnectorFuture {
        if let Some((expected, resp)) = self.data.lock().unwrap().pop() {
            self.requests
                .lock()
                .unwrap()
                .push(ValidateRequest { expected, actual });
            NowOrLater::ready(Ok(resp))
        } else {
            NowOrLater::ready(Err(ConnectorError::other("No more data")))
        }
    }
}

/// Connector that replies to every request by calling `f`
pub fn infallible_connection_fn<F>(f: F) -> SharedHttpConnector
where
    F: Fn(HttpRequest) -> HttpResponse + Send + Sync + 'static,
{
    SharedHttpConnector::new(InfallibleConnector { inner: Arc::new(f) })
}

#[derive(Clone)]
struct InfallibleConnector {
    inner: Arc<dyn Fn(HttpRequest) -> HttpResponse + Send + Sync>,
}

impl fmt::Debug for InfallibleConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfallibleConnector").finish()
    }
}

impl HttpConnector for InfallibleConnector {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        NowOrLater::ready(Ok((self.inner)(request)))
    }
}

#[cfg(test)]
mod tests {
    use crate::connector::HttpConnector;
    use crate::test_connection::{capture_request, infallible_connection_fn, TestConnection};
    use bytes::Bytes;

    #[tokio::test]
    async fn replays_in_order_and_records() {
        let conn = TestConnection::new(vec![
            (
                http::Request::new(Bytes::from_static(b"one")),
                http::Response::new(Bytes::from_static(b"first")),
            ),
            (
                http::Request::new(Bytes::from_static(b"two")),
                http::Response::new(Bytes::from_static(b"second")),
            ),
        ]);
        let first = conn.call(http::Request::new("one".into())).await.unwrap();
        let second = conn.call(http::Request::new("two".into())).await.unwrap();
        assert_eq!(first.body().as_ref(), b"first");
        assert_eq!(second.body().as_ref(), b"second");
        conn.call(http::Request::new(Bytes::new()))
            .await
            .expect_err("no more data");
        assert_eq!(conn.requests().len(), 2);
    }

    #[tokio::test]
    async fn capture_request_captures() {
        let (conn, request) = capture_request(None);
        let response = conn
            .call(http::Request::new(Bytes::from_static(b"hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(request.expect_request().body().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn infallible_fn() {
        let conn = infallible_connection_fn(|req| http::Response::new(req.into_body()));
        let response = conn.call(http::Request::new("x".into())).await.unwrap();
        assert_eq!(response.body().as_ref(), b"x");
    }
}
