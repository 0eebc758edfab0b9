//! # Core Configuration Module
//!
//! Provides configuration management for the Drive Share core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the OAuth client settings, Drive endpoints and the
//! bridge implementations the core depends on. It enforces fail-fast
//! validation so that misconfiguration surfaces at startup rather than in the
//! middle of a sign-in or upload.
//!
//! ## Required Settings
//!
//! - [`AuthSettings`] - OAuth client id and secret (never generated internally)
//!
//! ## Bridges (with platform defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `BrowserLauncher` - Shows the consent page (desktop default: system browser)
//! - `Clock` - Time source (default: system clock)
//! - `SecureStore` - Optional; only used when the host opts into keyring persistence
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient` and `BrowserLauncher` are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AuthSettings, CoreConfig};
//!
//! let config = CoreConfig::builder()
//!     .auth(AuthSettings::from_env()?)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::{AuthSettings, CoreConfig};
//!
//! // Empty client credentials are rejected
//! let config = CoreConfig::builder()
//!     .auth(AuthSettings::new("", ""))
//!     .build()
//!     .expect("Should fail - missing client credentials");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{BrowserLauncher, Clock, HttpClient, SecureStore, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Google OAuth 2.0 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Drive v3 metadata API.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Drive v3 upload API.
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
/// Scope limited to files created by this application.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Port the loopback redirect listener binds when none is configured.
pub const DEFAULT_REDIRECT_PORT: u16 = 8085;
pub const DEFAULT_VIEW_URL_TEMPLATE: &str = "https://drive.google.com/file/d/{id}/view";
pub const DEFAULT_CONTENT_URL_TEMPLATE: &str = "https://drive.google.com/uc?id={id}&export=download";
pub const DEFAULT_FOLDER_CACHE_CAPACITY: usize = 256;

const ENV_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";
const ENV_REDIRECT_PORT: &str = "DRIVE_SHARE_REDIRECT_PORT";

/// Placeholder substituted with the remote object id in URL templates.
const ID_PLACEHOLDER: &str = "{id}";

// ============================================================================
// Auth settings
// ============================================================================

/// OAuth client configuration.
///
/// `client_id`/`client_secret` form the immutable OAuth credential for the
/// process lifetime. `Debug` output redacts the secret.
#[derive(Clone)]
pub struct AuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    /// Loopback port for the redirect listener; `0` picks an ephemeral port.
    pub redirect_port: u16,
    /// How long the interactive flow waits for the browser redirect.
    pub authorization_timeout: Duration,
    /// Tokens are treated as expired this long before their literal expiry.
    pub refresh_margin: Duration,
    /// Per-request timeout for token endpoint calls.
    pub request_timeout: Duration,
}

impl AuthSettings {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            redirect_port: DEFAULT_REDIRECT_PORT,
            authorization_timeout: Duration::from_secs(5 * 60),
            refresh_margin: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Reads `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and the optional
    /// `DRIVE_SHARE_REDIRECT_PORT` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    Error::Config(format!("Environment variable {} is not set", key))
                })
        };

        let mut settings = Self::new(required(ENV_CLIENT_ID)?, required(ENV_CLIENT_SECRET)?);

        if let Some(port) = lookup(ENV_REDIRECT_PORT) {
            settings.redirect_port = port.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a port number, got '{}'",
                    ENV_REDIRECT_PORT, port
                ))
            })?;
        }

        Ok(settings)
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Override the provider endpoints (used by tests and self-hosted proxies).
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config(
                "OAuth client id cannot be empty. Set GOOGLE_CLIENT_ID or pass it to AuthSettings::new()."
                    .to_string(),
            ));
        }

        if self.client_secret.trim().is_empty() {
            return Err(Error::Config(
                "OAuth client secret cannot be empty. Set GOOGLE_CLIENT_SECRET or pass it to AuthSettings::new()."
                    .to_string(),
            ));
        }

        if self.scopes.is_empty() {
            return Err(Error::Config(
                "At least one OAuth scope is required".to_string(),
            ));
        }

        validate_url("auth_url", &self.auth_url)?;
        validate_url("token_url", &self.token_url)?;
        validate_timeout("authorization_timeout", self.authorization_timeout)?;
        validate_timeout("auth request_timeout", self.request_timeout)?;

        Ok(())
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_port", &self.redirect_port)
            .field("authorization_timeout", &self.authorization_timeout)
            .field("refresh_margin", &self.refresh_margin)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

// ============================================================================
// Drive settings
// ============================================================================

/// Drive endpoints and upload behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveSettings {
    pub api_base: String,
    pub upload_base: String,
    /// Folder paths are resolved starting from this folder id.
    pub root_folder_id: String,
    /// Fallback view URL when the upload response omits `webViewLink`.
    pub view_url_template: String,
    /// Fallback direct URL when the upload response omits `webContentLink`.
    pub content_url_template: String,
    /// Maximum cached `(parent, name) -> folder id` entries; `0` disables caching.
    pub folder_cache_capacity: usize,
    /// Per-request timeout for Drive calls, including the upload itself.
    pub request_timeout: Duration,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            root_folder_id: "root".to_string(),
            view_url_template: DEFAULT_VIEW_URL_TEMPLATE.to_string(),
            content_url_template: DEFAULT_CONTENT_URL_TEMPLATE.to_string(),
            folder_cache_capacity: DEFAULT_FOLDER_CACHE_CAPACITY,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl DriveSettings {
    /// Override both API bases (used by tests pointing at a local fake).
    pub fn with_endpoints(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    pub fn with_root_folder_id(mut self, id: impl Into<String>) -> Self {
        self.root_folder_id = id.into();
        self
    }

    pub fn with_url_templates(mut self, view: impl Into<String>, content: impl Into<String>) -> Self {
        self.view_url_template = view.into();
        self.content_url_template = content.into();
        self
    }

    pub fn with_folder_cache_capacity(mut self, capacity: usize) -> Self {
        self.folder_cache_capacity = capacity;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fallback view URL for `id`.
    pub fn view_url(&self, id: &str) -> String {
        self.view_url_template.replace(ID_PLACEHOLDER, id)
    }

    /// Fallback direct content URL for `id`.
    pub fn content_url(&self, id: &str) -> String {
        self.content_url_template.replace(ID_PLACEHOLDER, id)
    }

    pub fn validate(&self) -> Result<()> {
        validate_url("api_base", &self.api_base)?;
        validate_url("upload_base", &self.upload_base)?;

        if self.root_folder_id.trim().is_empty() {
            return Err(Error::Config("Root folder id cannot be empty".to_string()));
        }

        for (name, template) in [
            ("view_url_template", &self.view_url_template),
            ("content_url_template", &self.content_url_template),
        ] {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(Error::Config(format!(
                    "{} must contain the {} placeholder",
                    name, ID_PLACEHOLDER
                )));
            }
        }

        validate_timeout("drive request_timeout", self.request_timeout)
    }
}

fn validate_url(name: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::Config(format!("{} is not a valid URL ('{}'): {}", name, value, e)))
}

fn validate_timeout(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::Config(format!("{} must be greater than zero", name)));
    }
    Ok(())
}

// ============================================================================
// Core config
// ============================================================================

/// Core configuration for the Drive Share core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub auth: AuthSettings,
    pub drive: DriveSettings,
    pub http_client: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
    pub browser: Arc<dyn BrowserLauncher>,
    /// Only consulted when the host asks for keyring-backed token persistence.
    pub secure_store: Option<Arc<dyn SecureStore>>,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("auth", &self.auth)
            .field("drive", &self.drive)
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .field("browser", &"BrowserLauncher { ... }")
            .field(
                "secure_store",
                &self.secure_store.as_ref().map(|_| "SecureStore { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.drive.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for token and Drive requests. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform HTTP client."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_browser() -> Result<Arc<dyn BrowserLauncher>> {
    Err(Error::CapabilityMissing {
        capability: "BrowserLauncher".to_string(),
        message: "BrowserLauncher implementation is required to show the consent page. \
                 Desktop: enable the 'desktop-shims' feature to use the system browser. \
                 Headless hosts: inject NoopBrowser and copy the logged URL manually."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_browser() -> Result<Arc<dyn BrowserLauncher>> {
    Ok(Arc::new(bridge_desktop::SystemBrowser::new()))
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    auth: Option<AuthSettings>,
    drive: Option<DriveSettings>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    secure_store: Option<Arc<dyn SecureStore>>,
}

impl CoreConfigBuilder {
    /// Sets the OAuth client settings (required).
    pub fn auth(mut self, settings: AuthSettings) -> Self {
        self.auth = Some(settings);
        self
    }

    /// Sets the Drive settings. Defaults to the public Google endpoints.
    pub fn drive(mut self, settings: DriveSettings) -> Self {
        self.drive = Some(settings);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the browser launcher used by the interactive flow.
    pub fn browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Sets the secure store used for optional token persistence.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when auth settings are missing or any value is invalid
    /// - `Error::CapabilityMissing` when a bridge has no implementation and no
    ///   platform default is available
    pub fn build(self) -> Result<CoreConfig> {
        let auth = self.auth.ok_or_else(|| {
            Error::Config(
                "OAuth client settings are required. Use .auth(AuthSettings::new(..)) or AuthSettings::from_env()."
                    .to_string(),
            )
        })?;

        // Validate plain settings before constructing any default bridge
        let drive = self.drive.unwrap_or_default();
        auth.validate()?;
        drive.validate()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let browser = match self.browser {
            Some(browser) => browser,
            None => provide_default_browser()?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        Ok(CoreConfig {
            auth,
            drive,
            http_client,
            clock,
            browser,
            secure_store: self.secure_store,
        })
    }
}
