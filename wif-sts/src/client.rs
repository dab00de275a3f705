/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::StsError;
use crate::request::StsTokenExchangeRequest;
use crate::response::{parse_error_response, StsTokenExchangeResponse};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, Method};
use std::fmt;
use tracing::Instrument;
use wif_types::connector::{HttpConnector, SharedHttpConnector};
use wif_types::time::{SharedTimeSource, TimeSource};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// OAuth client credentials sent with every exchange as `Authorization: Basic`
#[derive(Clone, PartialEq, Eq)]
pub struct ClientAuthentication {
    client_id: String,
    client_secret: Option<String>,
}

impl fmt::Debug for ClientAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuthentication")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

impl ClientAuthentication {
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn header_value(&self) -> HeaderValue {
        let credentials = format!(
            "{}:{}",
            self.client_id,
            self.client_secret.as_deref().unwrap_or_default()
        );
        let mut value = HeaderValue::try_from(format!("Basic {}", base64::encode(credentials)))
            .expect("base64 is a valid header value");
        value.set_sensitive(true);
        value
    }
}

/// Client for an RFC 8693 token exchange endpoint
///
/// The same client serves plain identity federation and credential access boundary issuance;
/// the two differ only in the request.
#[derive(Clone, Debug)]
pub struct StsExchangeClient {
    endpoint: String,
    connector: SharedHttpConnector,
    time_source: SharedTimeSource,
    headers: HeaderMap,
}

impl StsExchangeClient {
    pub fn new(
        endpoint: impl Into<String>,
        connector: SharedHttpConnector,
        time_source: SharedTimeSource,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            connector,
            time_source,
            headers: HeaderMap::new(),
        }
    }

    /// Authenticate exchanges with `Authorization: Basic base64(client_id:client_secret)`
    pub fn with_client_authentication(mut self, auth: &ClientAuthentication) -> Self {
        self.headers.insert(AUTHORIZATION, auth.header_value());
        self
    }

    /// An additional header sent with every exchange
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Exchanges the subject token in `request`
    ///
    /// A non-2xx response is parsed as an OAuth 2.0 error and returned as [`StsError::OAuth`];
    /// [`StsError::retry_kind`] tells whether the failure is worth retrying.
    pub async fn exchange_token(
        &self,
        request: &StsTokenExchangeRequest,
    ) -> Result<StsTokenExchangeResponse, StsError> {
        let span = tracing::debug_span!(
            "sts_exchange",
            endpoint = %self.endpoint,
            subject_token_type = %request.subject_token_type(),
            requested_token_type = %request.requested_token_type()
        );
        self.exchange_token_inner(request).instrument(span).await
    }

    async fn exchange_token_inner(
        &self,
        request: &StsTokenExchangeRequest,
    ) -> Result<StsTokenExchangeResponse, StsError> {
        let mut builder = http::Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let http_request = builder
            .body(Bytes::from(request.to_form_body()))
            .map_err(StsError::Construction)?;
        tracing::trace!(request = ?request, "sending token exchange request");

        let response = self.connector.call(http_request).await?;
        let status = response.status();
        tracing::debug!(status = %status, "received token exchange response");
        if !status.is_success() {
            let err = parse_error_response(status, response.body());
            tracing::debug!(error = %err, "token exchange failed");
            return Err(err);
        }
        StsTokenExchangeResponse::parse(status, response.body(), self.time_source.now())
    }
}

#[cfg(test)]
mod test {
    use super::{ClientAuthentication, StsExchangeClient};
    use crate::error::{RetryKind, StsError};
    use crate::request::StsTokenExchangeRequest;
    use bytes::Bytes;
    use http::StatusCode;
    use std::collections::HashMap;
    use std::time::{Duration, UNIX_EPOCH};
    use wif_types::test_connection::{capture_request, infallible_connection_fn, TestConnection};
    use wif_types::test_util::capture_test_logs;
    use wif_types::time::{ManualTimeSource, SharedTimeSource};

    const ENDPOINT: &str = "https://sts.googleapis.com/v1/token";

    fn time_source() -> SharedTimeSource {
        SharedTimeSource::new(ManualTimeSource::new(UNIX_EPOCH + Duration::from_secs(100)))
    }

    fn json_response(status: u16, body: &str) -> http::Response<Bytes> {
        http::Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Bytes::copy_from_slice(body.as_bytes()))
            .unwrap()
    }

    fn jwt_request() -> StsTokenExchangeRequest {
        StsTokenExchangeRequest::new("subject-jwt", "urn:ietf:params:oauth:token-type:jwt")
            .with_audience("//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/pool/providers/oidc")
            .with_scopes(vec!["a".into(), "b".into()])
    }

    #[tokio::test]
    async fn successful_exchange() {
        let (_guard, logs) = capture_test_logs();
        let (connector, request) = capture_request(Some(json_response(
            200,
            r#"{"access_token":"ya29.sts","issued_token_type":"urn:ietf:params:oauth:token-type:access_token","token_type":"Bearer","expires_in":3600}"#,
        )));
        let client = StsExchangeClient::new(
            ENDPOINT,
            wif_types::connector::SharedHttpConnector::new(connector),
            time_source(),
        );
        let response = client.exchange_token(&jwt_request()).await.unwrap();
        assert_eq!(response.access_token().value(), "ya29.sts");
        assert_eq!(
            response.access_token().expiration(),
            Some(UNIX_EPOCH + Duration::from_secs(3700))
        );

        let sent = request.expect_request();
        assert_eq!(sent.method(), http::Method::POST);
        assert_eq!(sent.uri().to_string(), ENDPOINT);
        assert_eq!(
            sent.headers()["content-type"],
            "application/x-www-form-urlencoded"
        );
        let params: HashMap<String, String> = form_urlencoded::parse(sent.body())
            .into_owned()
            .collect();
        assert_eq!(params["scope"], "a b");
        assert_eq!(params["subject_token"], "subject-jwt");
        assert!(!logs.contents().contains("subject-jwt"));
    }

    #[tokio::test]
    async fn client_authentication_uses_basic_auth() {
        let (connector, request) = capture_request(Some(json_response(
            200,
            r#"{"access_token":"t","issued_token_type":"it","token_type":"Bearer"}"#,
        )));
        let client = StsExchangeClient::new(
            ENDPOINT,
            wif_types::connector::SharedHttpConnector::new(connector),
            time_source(),
        )
        .with_client_authentication(&ClientAuthentication::new(
            "client",
            Some("secret".to_string()),
        ));
        client.exchange_token(&jwt_request()).await.unwrap();
        // base64("client:secret")
        assert_eq!(
            request.expect_request().headers()["authorization"],
            "Basic Y2xpZW50OnNlY3JldA=="
        );
    }

    #[tokio::test]
    async fn oauth_error_is_structured() {
        let conn = TestConnection::new(vec![(
            http::Request::builder()
                .method("POST")
                .uri(ENDPOINT)
                .body(Bytes::from(jwt_request().to_form_body()))
                .unwrap(),
            json_response(
                400,
                r#"{"error":"invalid_grant","error_description":"The subject token is invalid.","error_uri":"https://example.com/docs"}"#,
            ),
        )]);
        let client = StsExchangeClient::new(ENDPOINT, conn.shared(), time_source());
        let err = client
            .exchange_token(&jwt_request())
            .await
            .expect_err("400 response");
        let oauth = err.oauth_error().expect("OAuth error");
        assert_eq!(oauth.error, "invalid_grant");
        assert_eq!(
            oauth.error_description.as_deref(),
            Some("The subject token is invalid.")
        );
        assert_eq!(oauth.error_uri.as_deref(), Some("https://example.com/docs"));
        assert_eq!(err.retry_kind(), RetryKind::NotRetryable);
        conn.assert_requests_match(&[]);
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let conn = infallible_connection_fn(|_| json_response(503, r#"{"error":"unavailable"}"#));
        let client = StsExchangeClient::new(ENDPOINT, conn, time_source());
        let err = client.exchange_token(&jwt_request()).await.unwrap_err();
        assert_eq!(err.retry_kind(), RetryKind::ServerError);
        assert_eq!(err.oauth_error().unwrap().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn missing_required_field_is_not_retryable() {
        let conn = infallible_connection_fn(|_| {
            json_response(200, r#"{"issued_token_type":"urn:ietf:params:oauth:token-type:access_token","token_type":"Bearer"}"#)
        });
        let client = StsExchangeClient::new(ENDPOINT, conn, time_source());
        let err = client.exchange_token(&jwt_request()).await.unwrap_err();
        assert!(matches!(err, StsError::Parse { .. }), "{}", err);
        assert!(err.to_string().contains("access_token"), "{}", err);
        assert_eq!(err.retry_kind(), RetryKind::NotRetryable);
    }

    #[tokio::test]
    async fn dispatch_failures_propagate() {
        let conn = TestConnection::new(vec![]);
        let client = StsExchangeClient::new(ENDPOINT, conn.shared(), time_source());
        let err = client.exchange_token(&jwt_request()).await.unwrap_err();
        assert!(matches!(err, StsError::Dispatch(_)));
        assert_eq!(err.retry_kind(), RetryKind::NotRetryable);
    }

    #[tokio::test]
    async fn invalid_endpoint_is_a_construction_failure() {
        let conn = TestConnection::new(vec![]);
        let client = StsExchangeClient::new("not a uri", conn.shared(), time_source());
        let err = client.exchange_token(&jwt_request()).await.unwrap_err();
        assert!(matches!(err, StsError::Construction(_)));
        assert!(conn.requests().is_empty());
    }
}
