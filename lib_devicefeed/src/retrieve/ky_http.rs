//! # HTTP Retrieval Utilities
//!
//! This module provides an asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries and
//! standardized JSON response handling.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

use crate::core::errors::FeedError;

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Converts the response into its data, or an `FeedError::Http` carrying
    /// the status code when the server did not answer 2xx.
    pub fn into_result(self) -> Result<T, FeedError> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(FeedError::Http {
                status: self.status,
                body: self.error_body,
            }),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles the base URL and
/// automatic retries of transient failures.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are appended.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://api.example.com/v1").
    /// * `timeout` - Per-request timeout.
    /// * `max_retries` - Retries for transient failures; zero sends each request once.
    ///
    /// # Errors
    /// `FeedError::Config` if the base URL is not absolute or the client cannot be built.
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, FeedError> {
        // Parse the base URL to ensure it is valid and absolute
        let url = Url::parse(base_url)
            .map_err(|e| FeedError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(FeedError::Config(format!("Base URL '{}' cannot carry paths", base_url)));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("DeviceFeed/1.0")
            .build()
            .map_err(|e| FeedError::Config(format!("HTTP client build failed: {}", e)))?;

        // Configure an exponential backoff policy for transient failures
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        // Construct the client with the retry middleware
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    /// The base URL requests are built from.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the absolute URL for `segments` plus an optional query.
    ///
    /// Each segment is percent-encoded. The query string is only attached
    /// when `query` is non-empty.
    pub fn url_for(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, FeedError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::Config(format!("Base URL '{}' cannot carry paths", self.base_url)))?
            // A trailing slash on the base would otherwise leave an empty segment.
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Performs a GET request and deserializes a JSON body.
    ///
    /// Non-2xx statuses are not errors here: they come back as an
    /// `ApiResponse` with `success == false` and the raw body.
    ///
    /// # Errors
    /// `FeedError::Transport` on network failure, `FeedError::Decode` when a
    /// 2xx body does not match `T`.
    pub async fn get_json<T>(&self, segments: &[&str], query: &[(&str, String)]) -> Result<ApiResponse<T>, FeedError>
    where
        T: DeserializeOwned,
    {
        // 1. Construct the full absolute URL
        let full_url = self.url_for(segments, query)?;
        log::debug!("GET {}", full_url);

        // 2. Execute the request and capture response metadata
        let response: reqwest::Response = self.inner.get(full_url).send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let success = status.is_success();

        // 3. Handle the result based on success status
        if success {
            // Attempt to deserialize the body into the target type T
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            // Capture the error body as a string for debugging
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}
