//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries and standardized
//! JSON response handling.

use reqwest::{
    header::{HeaderValue, ACCEPT, CONTENT_TYPE},
    Url,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use thiserror::Error;

/// Everything that can go wrong between issuing a request and holding a JSON value.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The base URL or a joined path did not form a valid absolute URL.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Connection refused, DNS, TLS or any other transport level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("upstream returned status {status}")]
    Status {
        /// Numeric HTTP status.
        status: u16,
    },

    /// The server answered 2xx but not with `application/json`.
    #[error("upstream returned non-JSON content type: {0}")]
    NotJson(String),

    /// The body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest_middleware::Error> for FetchError {
    fn from(e: reqwest_middleware::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles the base URL and
/// automatic retries of transient failures.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a client that retries transient failures (5xx, timeouts,
    /// connection resets) with exponential backoff.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://api.example.com/v1/").
    /// * `max_retries` - How many times a transient failure is retried. With zero,
    ///   a failed request simply waits for the synchronizer's next cycle.
    pub fn with_retries(base_url: &str, max_retries: u32) -> Result<Self, FetchError> {
        // Relative joins drop the last path segment unless the base ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let url = Url::parse(&normalized)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    /// The base every path is joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GETs `path` and returns the body as untyped JSON, ready for validation.
    ///
    /// A non-2xx status and a response whose content type is not JSON are
    /// both errors.
    pub async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        let full_url = self.base_url.join(path)?;
        let mut req = self
            .inner
            .get(full_url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if !query.is_empty() {
            req = req.query(query);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/json") {
            return Err(FetchError::NotJson(content_type));
        }

        let body = response.json::<Value>().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let api = ApiClient::with_retries("https://api.binance.com/api/v3", 0).unwrap();
        assert_eq!(api.base_url().as_str(), "https://api.binance.com/api/v3/");
        assert_eq!(
            api.base_url().join("ticker/24hr").unwrap().as_str(),
            "https://api.binance.com/api/v3/ticker/24hr"
        );
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        assert!(matches!(ApiClient::with_retries("not a url", 0), Err(FetchError::Url(_))));
    }

    #[tokio::test]
    async fn test_get_json_success_with_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fng/"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let api = ApiClient::with_retries(&server.uri(), 0).unwrap();
        let body = api.get_json("fng/", &[("limit", "1")]).await.unwrap();
        assert_eq!(body, json!({"data": []}));
    }

    #[tokio::test]
    async fn test_get_json_status_and_content_type_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&server)
            .await;

        let api = ApiClient::with_retries(&server.uri(), 0).unwrap();
        assert!(matches!(
            api.get_json("down", &[]).await,
            Err(FetchError::Status { status: 503 })
        ));
        assert!(matches!(api.get_json("html", &[]).await, Err(FetchError::NotJson(_))));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/global"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/global"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let no_retry = ApiClient::with_retries(&server.uri(), 0).unwrap();
        assert!(matches!(
            no_retry.get_json("global", &[]).await,
            Err(FetchError::Status { status: 503 })
        ));

        // A fresh 503 ahead of the healthy mock; the retrying client gets past it.
        Mock::given(method("GET"))
            .and(path("/global"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        let retrying = ApiClient::with_retries(&server.uri(), 2).unwrap();
        assert_eq!(retrying.get_json("global", &[]).await.unwrap(), json!({"ok": true}));
    }
}
