//! HTTP client for the backend REST API.

use crate::config::ClientConfig;
use crate::error::ApiError;

use super::dto::ApiResponse;

/// Thin wrapper over a [`reqwest::Client`] bound to the backend base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_test: String,
}

impl ApiClient {
    /// Builds a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self::with_client(client, config.base_test.clone()))
    }

    /// Wraps an existing client; `base_test` is the base URL of the test
    /// data endpoint.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_test: impl Into<String>) -> Self {
        let base_test = base_test.into().trim_end_matches('/').to_string();
        Self { client, base_test }
    }

    /// `GET {base_test}/test/data`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] on network failure, a non-2xx status, or
    /// a body that is not an [`ApiResponse`].
    pub async fn fetch_data(&self) -> Result<ApiResponse, ApiError> {
        let url = format!("{}/test/data", self.base_test);
        tracing::debug!(%url, "fetching test data");
        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<ApiResponse>()
            .await?;
        tracing::debug!(code = response.code, "test data fetched");
        Ok(response)
    }
}
