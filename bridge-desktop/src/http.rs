//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("drive-share-core/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - Opt-in retry with exponential backoff (single attempt by default)
/// - TLS via rustls
pub struct ReqwestHttpClient {
    client: Client,
    default_policy: RetryPolicy,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with a custom overall request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self::with_client(client))
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            default_policy: RetryPolicy::none(),
        }
    }

    /// Policy used by [`HttpClient::execute`]. Defaults to a single attempt.
    ///
    /// Form-encoded requests (OAuth token grants) always get a single attempt:
    /// an authorization code is single-use and a rejected grant stays rejected.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response.bytes().await.map_err(Self::map_send_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Execute request with retry logic
    ///
    /// Transport errors, 429 and 5xx are retried while attempts remain. Once
    /// attempts are exhausted the last retryable response is returned as-is so
    /// callers can inspect the provider's error payload.
    async fn execute_with_retry_internal(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                attempt,
                max_attempts,
                method = ?request.method,
                url = %request.url,
                "Executing HTTP request"
            );

            let outcome = self.build_request(request.clone()).send().await;
            let retryable = match &outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    status >= 500 || status == 429
                }
                Err(_) => true,
            };

            if !retryable || attempt >= max_attempts {
                return match outcome {
                    Ok(response) => Self::into_response(response).await,
                    Err(e) => {
                        warn!(error = %e, attempt, "HTTP request failed");
                        Err(Self::map_send_error(e))
                    }
                };
            }

            match &outcome {
                Ok(response) => warn!(
                    status = response.status().as_u16(),
                    attempt, "HTTP request failed with retryable status"
                ),
                Err(e) => warn!(error = %e, attempt, "HTTP request failed"),
            }

            let delay = policy.delay_for(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let policy = if is_token_grant(&request) {
            RetryPolicy::none()
        } else {
            self.default_policy.clone()
        };
        self.execute_with_retry_internal(request, policy).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.execute_with_retry_internal(request, policy).await
    }
}

fn is_token_grant(request: &HttpRequest) -> bool {
    request
        .header_value("Content-Type")
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status` with an empty body to every connection, counting hits.
    async fn serve_status(status: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/", addr), hits)
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Post),
            reqwest::Method::POST
        );
    }

    #[tokio::test]
    async fn test_default_client_makes_single_attempt() {
        let (url, hits) = serve_status("503 Service Unavailable").await;
        let client = ReqwestHttpClient::new().unwrap();

        let response = client
            .execute(HttpRequest::new(HttpMethod::Get, url))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_opt_in_retry_policy_retries_server_errors() {
        let (url, hits) = serve_status("503 Service Unavailable").await;
        let client = ReqwestHttpClient::new()
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                use_exponential_backoff: true,
            });

        let response = client
            .execute(HttpRequest::new(HttpMethod::Get, url))
            .await
            .unwrap();

        assert!(response.is_server_error());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_token_grants_ignore_retry_policy() {
        let (url, hits) = serve_status("503 Service Unavailable").await;
        let client = ReqwestHttpClient::new()
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                use_exponential_backoff: true,
            });

        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=authorization_code&code=abc123".as_bytes().to_vec().into());
        let response = client.execute(request).await.unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, hits) = serve_status("404 Not Found").await;
        let client = ReqwestHttpClient::new()
            .unwrap()
            .with_retry_policy(RetryPolicy::default());

        let response = client
            .execute(HttpRequest::new(HttpMethod::Get, url))
            .await
            .unwrap();

        assert!(response.is_client_error());
        assert_eq!(response.body.as_ref(), b"{}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
