//! HTTP transports.
//!
//! - [`ReqwestTransport`]: production transport over two `reqwest` clients
//! - [`StubTransport`]: answers every endpoint with its sample response

use crate::config::{ConfigError, ProviderConfig};
use ello_core::environment::{CredentialStore, Transport};
use ello_core::{Endpoint, Method, NetworkRoute, ParameterEncoding, RawResponse, TransportError};
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, redirect};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Production transport.
///
/// Holds a primary client and a restricted secondary client (shorter timeout,
/// no redirects) selected by the endpoint's [`NetworkRoute`]. Secondary
/// requests also carry the restricted timeout themselves. Attaches the stored
/// bearer token whenever one exists.
#[derive(Clone)]
pub struct ReqwestTransport {
    primary: Client,
    restricted: Client,
    restricted_timeout: Duration,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl ReqwestTransport {
    /// Build both clients from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base URL is invalid or a client cannot
    /// be built.
    pub fn new(
        config: &ProviderConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ConfigError> {
        let primary = Client::builder().timeout(config.request_timeout).build()?;
        let restricted = Client::builder()
            .timeout(config.restricted_timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            primary,
            restricted,
            restricted_timeout: config.restricted_timeout,
            base_url: config.base_url()?,
            credentials,
        })
    }

    fn client(&self, route: NetworkRoute) -> &Client {
        match route {
            NetworkRoute::Primary => &self.primary,
            NetworkRoute::Secondary => &self.restricted,
        }
    }

    fn build(&self, endpoint: &Endpoint) -> Result<RequestBuilder, TransportError> {
        let url = endpoint
            .url(&self.base_url)
            .map_err(|e| TransportError::Request(format!("invalid URL for {endpoint}: {e}")))?;

        let mut builder = self
            .client(endpoint.route())
            .request(reqwest_method(endpoint.method()), url)
            .header(reqwest::header::ACCEPT, "application/json");

        if endpoint.route() == NetworkRoute::Secondary {
            builder = builder.timeout(self.restricted_timeout);
        }

        for (name, value) in endpoint.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(token) = self.credentials.access_token() {
            builder = builder.bearer_auth(token);
        }

        let parameters = endpoint.parameters();
        if !parameters.is_empty() {
            builder = match endpoint.encoding() {
                ParameterEncoding::Url => builder.query(&query_pairs(parameters)),
                ParameterEncoding::Json => builder.json(parameters),
                ParameterEncoding::Form => builder.form(&query_pairs(parameters)),
            };
        }

        Ok(builder)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let builder = match self.build(&endpoint) {
            Ok(builder) => builder,
            Err(error) => return async move { Err(error) }.boxed(),
        };

        async move {
            let response = builder.send().await.map_err(transport_error)?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(transport_error)?;

            tracing::trace!(endpoint = %endpoint, status, bytes = body.len(), "Response received");

            Ok(RawResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        }
        .boxed()
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Transport that never touches the network.
///
/// Every endpoint answers 200 with its sample response.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubTransport;

impl Transport for StubTransport {
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let response = RawResponse::new(200, endpoint.sample_response());
        async move { Ok(response) }.boxed()
    }
}

const fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

/// Flatten parameters into string pairs. Strings are sent verbatim, other
/// values as their JSON text.
fn query_pairs(parameters: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    parameters
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

pub(crate) fn transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Request(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use ello_testing::MockCredentialStore;
    use serde_json::json;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(
            &ProviderConfig::new("https://ello.co/".into()),
            Arc::new(MockCredentialStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_query_pairs_stringify_values() {
        let mut parameters = serde_json::Map::new();
        parameters.insert("per_page".into(), json!(10));
        parameters.insert("query".into(), json!("cats"));

        let pairs = query_pairs(&parameters);

        assert_eq!(
            pairs,
            vec![
                ("per_page".to_string(), "10".to_string()),
                ("query".to_string(), "cats".to_string()),
            ]
        );
    }

    #[test]
    fn test_url_encoded_parameters_go_in_the_query() {
        let endpoint = Endpoint::get("/api/v2/posts").with_parameter("per_page", 10);

        let request = transport().build(&endpoint).unwrap().build().unwrap();

        assert_eq!(request.url().as_str(), "https://ello.co/api/v2/posts?per_page=10");
        assert_eq!(request.method(), reqwest::Method::GET);
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_json_parameters_go_in_the_body() {
        let endpoint = Endpoint::post("/api/v2/posts").with_parameter("body", "hello");

        let request = transport().build(&endpoint).unwrap().build().unwrap();

        assert_eq!(request.url().query(), None);
        let body = request.body().and_then(reqwest::Body::as_bytes).unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(body).unwrap(),
            json!({"body": "hello"})
        );
    }

    #[test]
    fn test_bearer_token_is_attached_when_present() {
        let credentials = MockCredentialStore::new();
        credentials.store_token(ello_core::TokenSet {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: None,
            password_based: false,
        });
        let transport = ReqwestTransport::new(&ProviderConfig::default(), Arc::new(credentials)).unwrap();

        let request = transport
            .build(&Endpoint::get("/api/v2/categories"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer abc"
        );
    }

    #[test]
    fn test_secondary_route_uses_restricted_timeout() {
        let config = ProviderConfig::new("https://ello.co/".into())
            .with_timeouts(Duration::from_secs(30), Duration::from_secs(3));
        let transport = ReqwestTransport::new(&config, Arc::new(MockCredentialStore::new())).unwrap();

        let secondary = transport
            .build(&Endpoint::get("/api/v2/categories").with_route(NetworkRoute::Secondary))
            .unwrap()
            .build()
            .unwrap();
        let primary = transport
            .build(&Endpoint::get("/api/v2/categories"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(secondary.timeout(), Some(&Duration::from_secs(3)));
        assert_eq!(primary.timeout(), None);
        assert!(std::ptr::eq(
            transport.client(NetworkRoute::Secondary),
            &transport.restricted
        ));
    }

    #[tokio::test]
    async fn test_stub_transport_serves_sample_response() {
        let endpoint = Endpoint::get("/api/v2/categories").with_sample_response(r#"{"categories":[]}"#);

        let response = StubTransport.send(endpoint).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"categories":[]}"#.to_vec());
    }
}
