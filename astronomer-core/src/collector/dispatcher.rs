//! HTTP delivery of envelopes to the ingestion API
//!
//! Every call type is POSTed as JSON to `<scheme>://<host>/v1/<x>`, where
//! `<x>` is the endpoint letter. The delivery scheme mirrors the page: `http:`
//! pages deliver over http, every other page over https. A delivery counts as
//! successful only on a 2xx status with `{"success": true}` in the body.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::IntegrationConfig;
use crate::error::{Error, Result};
use crate::page::{PageEnvironment, Scheme};

use super::envelope::{Endpoint, Envelope};

/// Version prefix of every ingestion route
pub const API_VERSION_PREFIX: &str = "/v1";

/// Body returned by the ingestion API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub success: bool,
}

/// Outcome of a successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub url: String,
    pub status: u16,
    pub response: IngestResponse,
}

/// Scheme used to reach the ingestion host from a page on `page_scheme`
pub fn delivery_scheme(page_scheme: &Scheme) -> Scheme {
    match page_scheme {
        Scheme::Http => Scheme::Http,
        _ => Scheme::Https,
    }
}

/// HTTP client for the ingestion API
pub struct Dispatcher {
    http_client: reqwest::Client,
    host: String,
}

impl Dispatcher {
    /// Create a dispatcher for `host`; no request timeout unless one is given
    pub fn new(host: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let host = host.into().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(Error::Config("ingestion host must not be empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, host })
    }

    pub fn from_config(config: &IntegrationConfig) -> Result<Self> {
        Self::new(
            config.host.clone(),
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full URL for `endpoint` as seen from a page on `page_scheme`
    pub fn endpoint_url(&self, page_scheme: &Scheme, endpoint: Endpoint) -> String {
        format!(
            "{}://{}{}{}",
            delivery_scheme(page_scheme).as_str(),
            self.host,
            API_VERSION_PREFIX,
            endpoint.path()
        )
    }

    /// Deliver an envelope to the endpoint for its call type
    pub async fn send(&self, page: &PageEnvironment, envelope: &Envelope) -> Result<Delivery> {
        self.send_to(page, envelope.endpoint(), envelope).await
    }

    /// POST an arbitrary JSON body to `endpoint`
    pub async fn send_to<T: Serialize + ?Sized>(
        &self,
        page: &PageEnvironment,
        endpoint: Endpoint,
        body: &T,
    ) -> Result<Delivery> {
        let url = self.endpoint_url(&page.scheme, endpoint);
        tracing::debug!(url = %url, "Sending envelope");

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("HTTP request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Delivery(format!("failed to read response from {}: {}", url, e)))?;

        if !status.is_success() {
            return Err(Error::Delivery(format!(
                "API error from {} ({}): {}",
                url, status, text
            )));
        }

        let ingest: IngestResponse = serde_json::from_str(&text).map_err(|e| {
            Error::Delivery(format!("failed to parse response from {}: {}", url, e))
        })?;

        if !ingest.success {
            return Err(Error::Delivery(format!(
                "{} did not acknowledge the envelope: {}",
                url, text
            )));
        }

        tracing::info!(url = %url, status = status.as_u16(), "Envelope delivered");

        Ok(Delivery {
            url,
            status: status.as_u16(),
            response: ingest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn http_page() -> PageEnvironment {
        PageEnvironment::new(Scheme::Http, "localhost")
    }

    #[test]
    fn test_delivery_scheme_follows_page() {
        assert_eq!(delivery_scheme(&Scheme::Http), Scheme::Http);
        assert_eq!(delivery_scheme(&Scheme::Https), Scheme::Https);
        assert_eq!(delivery_scheme(&Scheme::File), Scheme::Https);
        assert_eq!(delivery_scheme(&Scheme::ChromeExtension), Scheme::Https);
        assert_eq!(
            delivery_scheme(&Scheme::Other("ftp".to_string())),
            Scheme::Https
        );
    }

    #[test]
    fn test_endpoint_urls() {
        let dispatcher = Dispatcher::new("api.astronomer.io", None).unwrap();
        assert_eq!(
            dispatcher.endpoint_url(&Scheme::Http, Endpoint::Page),
            "http://api.astronomer.io/v1/p"
        );
        assert_eq!(
            dispatcher.endpoint_url(&Scheme::Https, Endpoint::Identify),
            "https://api.astronomer.io/v1/i"
        );
        assert_eq!(
            dispatcher.endpoint_url(&Scheme::File, Endpoint::Track),
            "https://api.astronomer.io/v1/t"
        );
        assert_eq!(
            dispatcher.endpoint_url(&Scheme::ChromeExtension, Endpoint::Group),
            "https://api.astronomer.io/v1/g"
        );
        assert_eq!(
            dispatcher.endpoint_url(&Scheme::Https, Endpoint::Alias),
            "https://api.astronomer.io/v1/a"
        );
    }

    #[test]
    fn test_from_config() {
        let config = IntegrationConfig {
            timeout_secs: Some(5),
            ..Default::default()
        };
        let dispatcher = Dispatcher::from_config(&config).unwrap();
        assert_eq!(dispatcher.host(), "api.astronomer.io");
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(Dispatcher::new("", None).is_err());
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/i")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({ "userId": "id" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(server.host_with_port(), None).unwrap();
        let delivery = dispatcher
            .send_to(&http_page(), Endpoint::Identify, &json!({ "userId": "id" }))
            .await
            .unwrap();

        assert_eq!(
            delivery.url,
            format!("http://{}/v1/i", server.host_with_port())
        );
        assert_eq!(delivery.status, 200);
        assert!(delivery.response.success);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unacknowledged_is_delivery_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/t")
            .with_status(200)
            .with_body(r#"{"success":false}"#)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(server.host_with_port(), None).unwrap();
        let err = dispatcher
            .send_to(&http_page(), Endpoint::Track, &json!({ "event": "e" }))
            .await
            .unwrap_err();
        assert!(err.is_delivery());
    }

    #[tokio::test]
    async fn test_error_status_is_delivery_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/g")
            .with_status(500)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(server.host_with_port(), None).unwrap();
        let err = dispatcher
            .send_to(&http_page(), Endpoint::Group, &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_delivery());
        assert!(err.to_string().contains("/v1/g"));
    }

    #[tokio::test]
    async fn test_non_json_body_is_delivery_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/a")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(server.host_with_port(), None).unwrap();
        let err = dispatcher
            .send_to(&http_page(), Endpoint::Alias, &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_delivery());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_delivery_error() {
        let dispatcher = Dispatcher::new("127.0.0.1:1", Some(Duration::from_secs(5))).unwrap();
        let err = dispatcher
            .send_to(&http_page(), Endpoint::Page, &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_delivery());
    }
}
