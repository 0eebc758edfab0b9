//! OAuth 2.0 Authorization Code Grant with PKCE
//!
//! This module implements the provider-facing half of RFC 6749 (OAuth 2.0) and
//! RFC 7636 (PKCE) for an installed desktop application.
//!
//! # Overview
//!
//! The OAuth flow manager handles:
//! - Building authorization URLs with PKCE challenge and state nonce
//! - Exchanging authorization codes for a [`TokenPair`]
//! - Refreshing access tokens
//!
//! Nothing here retries: an invalid grant or a denied consent never becomes
//! valid by asking again.
//!
//! # Security
//!
//! - Generates cryptographically secure random state and code verifier
//! - The state nonce is checked by the loopback listener before any exchange
//! - Never logs sensitive values (tokens, codes, verifiers, client secret)
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
//! use core_auth::OAuthCredential;
//! use bridge_traits::SystemClock;
//! use std::sync::Arc;
//!
//! # fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let config = OAuthConfig::google(OAuthCredential::new("client-id", "client-secret"));
//! let manager = OAuthFlowManager::new(config, http_client, Arc::new(SystemClock));
//!
//! let verifier = PkceVerifier::new();
//! let url = manager.build_auth_url("http://localhost:8085/", &verifier)?;
//! // Open url in a browser...
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{OAuthCredential, TokenPair};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use bytes::Bytes;
use core_runtime::config::{AuthSettings, DRIVE_FILE_SCOPE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// OAuth 2.0 provider configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub credential: OAuthCredential,
    /// List of OAuth scopes to request
    pub scopes: Vec<String>,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Per-request timeout for token endpoint calls
    pub request_timeout: Duration,
}

impl OAuthConfig {
    /// Google endpoints with the `drive.file` scope.
    pub fn google(credential: OAuthCredential) -> Self {
        Self {
            credential,
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self {
            credential: OAuthCredential::new(&settings.client_id, &settings.client_secret),
            scopes: settings.scopes.clone(),
            auth_url: settings.auth_url.clone(),
            token_url: settings.token_url.clone(),
            request_timeout: settings.request_timeout,
        }
    }
}

/// PKCE (Proof Key for Code Exchange) verifier plus the state nonce.
///
/// # Security
///
/// The verifier must never be transmitted to the authorization server; only
/// the challenge derived from it is. `Debug` output hides both values.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Generates a 32-byte code verifier and a 16-byte state nonce, both
    /// base64-url-encoded without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &"[REDACTED]")
            .finish()
    }
}

/// Talks to the provider's authorization and token endpoints.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            http_client,
            clock,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the consent URL the user opens in a browser.
    ///
    /// Requests offline access and forces the consent prompt so that the
    /// provider always issues a refresh token.
    #[instrument(skip(self, verifier))]
    pub fn build_auth_url(&self, redirect_uri: &str, verifier: &PkceVerifier) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Other(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.credential.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", verifier.state())
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("code_challenge", &verifier.challenge())
            .append_pair("code_challenge_method", "S256");

        debug!("Built authorization URL");
        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `expires_in` is converted to an absolute instant using the injected
    /// clock at the moment the response arrives.
    ///
    /// The redirect's state nonce must already have been checked against
    /// `verifier` (see [`CallbackListener`](crate::CallbackListener)).
    ///
    /// # Errors
    ///
    /// - `AuthProviderError` if the endpoint answers non-2xx, omits the refresh
    ///   token or sends an unusable `expires_in`
    /// - `NetworkError` on transport failures
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
        redirect_uri: &str,
    ) -> Result<TokenPair> {
        let params = [
            ("code", code),
            ("client_id", self.config.credential.client_id.as_str()),
            ("client_secret", self.config.credential.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code_verifier", verifier.verifier()),
        ];

        debug!("Exchanging authorization code for tokens");
        let response = self.post_form(&params).await?;

        if !response.is_success() {
            let detail = describe_provider_error(&response);
            warn!(status = response.status, error = %detail, "Authorization code exchange failed");
            return Err(AuthError::AuthProviderError(format!(
                "Token endpoint returned {}: {}",
                response.status, detail
            )));
        }

        let token_response: TokenResponse = parse_token_response(&response)?;
        let refresh_token = token_response.refresh_token.ok_or_else(|| {
            AuthError::AuthProviderError(
                "Token response did not include a refresh token".to_string(),
            )
        })?;

        info!(
            expires_in = token_response.expires_in,
            "Exchanged authorization code for tokens"
        );

        self.token_pair(token_response.access_token, refresh_token, token_response.expires_in)
    }

    /// Refresh an access token.
    ///
    /// A rotated refresh token from the provider replaces `refresh_token`;
    /// otherwise `refresh_token` is carried over unchanged.
    ///
    /// # Errors
    ///
    /// - `RefreshFailed` when the provider rejects the grant (4xx other than
    ///   408 and 429)
    /// - `NetworkError` on transport failures, 5xx answers, 408 or 429
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let params = [
            ("refresh_token", refresh_token),
            ("client_id", self.config.credential.client_id.as_str()),
            ("client_secret", self.config.credential.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        debug!("Refreshing access token");
        let response = self.post_form(&params).await?;

        if response.is_client_error() && !is_transient_status(response.status) {
            let detail = describe_provider_error(&response);
            warn!(status = response.status, error = %detail, "Token refresh rejected");
            return Err(AuthError::RefreshFailed {
                status: response.status,
                message: detail,
            });
        }

        if !response.is_success() {
            let detail = describe_provider_error(&response);
            warn!(status = response.status, error = %detail, "Token endpoint unavailable");
            return Err(AuthError::NetworkError(format!(
                "Token endpoint returned {}: {}",
                response.status, detail
            )));
        }

        let token_response: TokenResponse = parse_token_response(&response)?;
        let refresh_token = match token_response.refresh_token {
            Some(rotated) => {
                debug!("Provider rotated the refresh token");
                rotated
            }
            None => {
                debug!("Provider kept the existing refresh token");
                refresh_token.to_string()
            }
        };

        info!(
            expires_in = token_response.expires_in,
            "Refreshed access token"
        );

        self.token_pair(token_response.access_token, refresh_token, token_response.expires_in)
    }

    fn token_pair(
        &self,
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    ) -> Result<TokenPair> {
        TokenPair::from_expires_in(access_token, refresh_token, expires_in, self.clock.now())
            .ok_or_else(|| {
                warn!(expires_in, "Token response carried an out-of-range expiry");
                AuthError::AuthProviderError(format!(
                    "Malformed token response: expires_in {} is out of range",
                    expires_in
                ))
            })
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<HttpResponse> {
        let encoded_body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(Bytes::from(encoded_body))
            .timeout(self.config.request_timeout);

        self.http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))
    }
}

/// Token response from the OAuth provider.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Request timeout and rate limiting say nothing about the refresh token.
fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429)
}

/// `{"error": "...", "error_description": "..."}` as returned by the token endpoint.
#[derive(Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse> {
    response
        .json()
        .map_err(|e| AuthError::AuthProviderError(format!("Malformed token response: {}", e)))
}

/// Render the provider's error payload, falling back to the raw body.
fn describe_provider_error(response: &HttpResponse) -> String {
    match response.json::<ProviderErrorBody>() {
        Ok(ProviderErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{}: {}", error, description),
        Ok(ProviderErrorBody { error, .. }) => error,
        Err(_) => response
            .text()
            .unwrap_or_else(|_| "Unable to read error response".to_string()),
    }
}
