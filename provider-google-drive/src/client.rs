//! Authenticated Drive requests.
//!
//! Every call fetches a valid access token first, attaches it as a bearer
//! token with the configured per-request timeout, and turns non-2xx answers
//! into [`UploadError::UploadTransportError`] carrying Drive's own message.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_auth::TokenRefresher;
use core_runtime::config::DriveSettings;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Result, UploadError};
use crate::types::ApiErrorResponse;

/// Supplies bearer tokens for Drive calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> core_auth::Result<String>;
}

#[async_trait]
impl AccessTokenSource for TokenRefresher {
    async fn access_token(&self) -> core_auth::Result<String> {
        self.ensure_valid().await
    }
}

/// Fixed token, for hosts that manage tokens themselves and for tests.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> core_auth::Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
pub struct DriveClient {
    http_client: Arc<dyn HttpClient>,
    tokens: Arc<dyn AccessTokenSource>,
    settings: DriveSettings,
}

impl DriveClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        tokens: Arc<dyn AccessTokenSource>,
        settings: DriveSettings,
    ) -> Self {
        Self {
            http_client,
            tokens,
            settings,
        }
    }

    pub fn settings(&self) -> &DriveSettings {
        &self.settings
    }

    /// Send `request` with a bearer token; `Ok` only for 2xx answers.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.tokens.access_token().await?;
        let request = request
            .bearer_token(token)
            .header("Accept", "application/json")
            .timeout(self.settings.request_timeout);

        let method = request.method;
        let url = request.url.clone();
        let response = self.http_client.execute(request).await?;

        if response.is_success() {
            debug!(?method, status = response.status, "Drive request succeeded");
            return Ok(response);
        }

        let message = api_error_message(&response);
        warn!(?method, url = %url, status = response.status, error = %message, "Drive request failed");
        Err(UploadError::UploadTransportError {
            status: Some(response.status),
            message,
        })
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let response = self.send(request).await?;
        response
            .json()
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))
    }
}

fn api_error_message(response: &HttpResponse) -> String {
    match response.json::<ApiErrorResponse>() {
        Ok(body) => body.error.message,
        Err(_) => {
            let text = String::from_utf8_lossy(&response.body);
            if text.trim().is_empty() {
                format!("HTTP {}", response.status)
            } else {
                text.into_owned()
            }
        }
    }
}
