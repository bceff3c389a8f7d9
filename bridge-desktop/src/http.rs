//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{
        status_error, DownloadStream, HttpClient, HttpMethod, HttpRequest, HttpResponse,
        RetryPolicy,
    },
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Desktop [`HttpClient`] backed by a pooled reqwest client.
///
/// Session API calls get a request timeout and status-based retries; media
/// downloads are streamed without either.
pub struct ReqwestHttpClient {
    client: Client,
    /// Applied to API calls that don't set their own timeout.
    default_timeout: Option<Duration>,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with a custom request timeout.
    ///
    /// The timeout applies to API calls; streaming downloads run without a
    /// total timeout and rely on the connect timeout instead.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("audioshelf-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default reqwest client");
                Client::new()
            });

        Self {
            client,
            default_timeout: Some(timeout),
        }
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            default_timeout: None,
        }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(
        &self,
        request: HttpRequest,
        apply_default_timeout: bool,
    ) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        let timeout = request
            .timeout
            .or(self.default_timeout.filter(|_| apply_default_timeout));
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn map_transport_error(error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Network("Request timed out".to_string())
        } else if error.is_connect() {
            BridgeError::Network(format!("Connection failed: {}", error))
        } else {
            BridgeError::Network(error.to_string())
        }
    }

    async fn read_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect::<HashMap<_, _>>();
        let body = response.bytes().await.map_err(Self::map_transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Session API calls: 5xx and 429 are retried, any other status is
    /// returned for the caller to interpret.
    async fn send_with_policy(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = BridgeError::Network("request was not sent".to_string());

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = policy.delay_for(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, url = %request.url, "Retrying request");
                sleep(delay).await;
            }

            let retryable = attempt < max_attempts;
            match self.build_request(request.clone(), true).send().await {
                Ok(response) => {
                    let status = response.status();
                    if retryable && (status.is_server_error() || status.as_u16() == 429) {
                        warn!(status = status.as_u16(), attempt, "Server busy or failing");
                        last_error = status_error(status.as_u16(), "");
                        continue;
                    }
                    return Self::read_response(response).await;
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Request did not reach the server");
                    last_error = Self::map_transport_error(e);
                }
            }
        }

        Err(last_error)
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.send_with_policy(request, policy).await
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<DownloadStream> {
        debug!(url = %request.url, "Opening download stream");

        let response = self
            .build_request(request, false)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status.as_u16(), ""));
        }

        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(DownloadStream {
            content_length,
            reader: Box::new(reader),
        })
    }
}
