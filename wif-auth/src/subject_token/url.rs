/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::TokenError;
use crate::provider_config::ProviderConfig;
use crate::subject_token::{send, SubjectTokenContext, SubjectTokenFormat};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use wif_types::connector::SharedHttpConnector;
use wif_types::SubjectToken;

/// Fetches the subject token from a URL on every exchange
#[derive(Clone, Debug)]
pub struct UrlSupplier {
    url: String,
    headers: HeaderMap,
    format: SubjectTokenFormat,
    connector: SharedHttpConnector,
}

impl UrlSupplier {
    /// `headers` are sent verbatim with every request
    pub fn new<K, V>(
        url: impl Into<String>,
        headers: impl IntoIterator<Item = (K, V)>,
        format: SubjectTokenFormat,
        conf: &ProviderConfig,
    ) -> Result<Self, TokenError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(|err| {
                TokenError::invalid_configuration(format!(
                    "invalid credential source header name `{}`: {}",
                    name.as_ref(),
                    err
                ))
            })?;
            let value = HeaderValue::from_str(value.as_ref()).map_err(|err| {
                TokenError::invalid_configuration(format!(
                    "invalid value for credential source header `{}`: {}",
                    name, err
                ))
            })?;
            header_map.insert(name, value);
        }
        Ok(Self {
            url: url.into(),
            headers: header_map,
            format,
            connector: conf.connector()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) async fn subject_token(
        &self,
        context: &SubjectTokenContext,
    ) -> Result<SubjectToken, TokenError> {
        let mut builder = http::Request::builder().method(Method::GET).uri(&self.url);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Bytes::new())
            .map_err(TokenError::invalid_configuration)?;
        let response = send(&self.connector, request).await?;
        if !response.status().is_success() {
            return Err(TokenError::provider_error(format!(
                "failed to retrieve the subject token from {}: HTTP status {}",
                self.url,
                response.status()
            )));
        }
        let token = self.format.extract(response.body(), &self.url)?;
        tracing::debug!(url = %self.url, "loaded subject token from url");
        Ok(SubjectToken::new(token, context.subject_token_type().clone()))
    }
}

#[cfg(test)]
mod test {
    use super::UrlSupplier;
    use crate::error::TokenError;
    use crate::provider_config::ProviderConfig;
    use crate::subject_token::{SubjectTokenContext, SubjectTokenFormat};
    use bytes::Bytes;
    use wif_types::connector::{ConnectorError, SharedHttpConnector};
    use wif_types::test_connection::{capture_request, infallible_connection_fn, TestConnection};
    use wif_types::SubjectTokenType;

    const URL: &str = "http://localhost:5000/token";

    fn context() -> SubjectTokenContext {
        SubjectTokenContext::new("audience", SubjectTokenType::Jwt)
    }

    fn ok(body: &'static str) -> http::Response<Bytes> {
        http::Response::builder()
            .status(200)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    #[tokio::test]
    async fn fetches_token_with_headers() {
        let (connector, request) = capture_request(Some(ok(r#"{"token":"url-jwt"}"#)));
        let conf = ProviderConfig::no_configuration()
            .with_connector(SharedHttpConnector::new(connector));
        let supplier = UrlSupplier::new(
            URL,
            [("Metadata-Flavor", "Google")],
            SubjectTokenFormat::Json {
                subject_token_field_name: "token".into(),
            },
            &conf,
        )
        .unwrap();

        let token = supplier.subject_token(&context()).await.unwrap();
        assert_eq!(token.value(), "url-jwt");
        assert_eq!(token.token_type(), &SubjectTokenType::Jwt);

        let sent = request.expect_request();
        assert_eq!(sent.method(), http::Method::GET);
        assert_eq!(sent.uri().to_string(), URL);
        assert_eq!(sent.headers()["metadata-flavor"], "Google");
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let conf = ProviderConfig::no_configuration().with_connector(infallible_connection_fn(
            |_| {
                http::Response::builder()
                    .status(404)
                    .body(Bytes::from_static(b"not found"))
                    .unwrap()
            },
        ));
        let supplier =
            UrlSupplier::new(URL, Vec::<(String, String)>::new(), SubjectTokenFormat::Text, &conf)
                .unwrap();
        let err = supplier.subject_token(&context()).await.unwrap_err();
        assert!(err.to_string().contains("404"), "{}", err);
    }

    #[tokio::test]
    async fn dispatch_failure_keeps_connector_error() {
        let conn = TestConnection::new(vec![]);
        let conf = ProviderConfig::no_configuration().with_connector(conn.shared());
        let supplier =
            UrlSupplier::new(URL, Vec::<(String, String)>::new(), SubjectTokenFormat::Text, &conf)
                .unwrap();
        let err = supplier.subject_token(&context()).await.unwrap_err();
        match &err {
            TokenError::ProviderError(source) => {
                assert!(source.downcast_ref::<ConnectorError>().is_some())
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let conf = ProviderConfig::no_configuration().with_connector(TestConnection::new(vec![]).shared());
        assert!(matches!(
            UrlSupplier::new(URL, [("bad header", "x")], SubjectTokenFormat::Text, &conf),
            Err(TokenError::InvalidConfiguration(_))
        ));
    }
}
