//! Core service façade.
//!
//! [`DriveShareService`] wires a [`CoreConfig`] into the authorization flow,
//! the token refresher and the Drive uploader, and is the single entry point
//! host applications use:
//!
//! 1. [`DriveShareService::authorize`] runs the interactive sign-in once
//! 2. [`DriveShareService::connect`] starts a session from a token pair the
//!    host persisted, together with the persistence hook for refreshed tokens
//! 3. [`DriveShareService::upload`] stores and shares files
//!
//! Desktop hosts enable the `desktop-shims` feature for the default HTTP
//! client and system browser; `secure-store` adds keyring-backed persistence.

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{
    AuthError, FlowState, FnPersistence, NoopPersistence, SecureStorePersistence, TokenPair,
    TokenPersistence,
};
pub use core_runtime::config::{AuthSettings, CoreConfig, CoreConfigBuilder, DriveSettings};
pub use core_runtime::events::{AuthEvent, CoreEvent, EventBus, EventStream, UploadEvent};
pub use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use provider_google_drive::{
    FileCategory, ProgressEvent, UploadError, UploadResult, UploadStage, UploadTask,
};

#[cfg(feature = "secure-store")]
pub use bridge_desktop::KeyringSecureStore;

use std::sync::Arc;

use core_auth::{AuthorizationFlow, OAuthConfig, OAuthFlowManager, TokenRefresher};
use provider_google_drive::ObjectUploader;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Refresher and uploader bound to one token pair.
struct Session {
    refresher: Arc<TokenRefresher>,
    uploader: ObjectUploader,
}

/// Primary façade exposed to host applications.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct DriveShareService {
    config: CoreConfig,
    events: EventBus,
    oauth: Arc<OAuthFlowManager>,
    flow: AuthorizationFlow,
    session: RwLock<Option<Arc<Session>>>,
}

impl DriveShareService {
    /// Build the service from a validated configuration.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::default();
        let oauth = Arc::new(OAuthFlowManager::new(
            OAuthConfig::from_settings(&config.auth),
            config.http_client.clone(),
            config.clock.clone(),
        ));
        let flow = AuthorizationFlow::new(
            oauth.clone(),
            config.browser.clone(),
            config.clock.clone(),
            &config.auth,
        )
        .with_event_bus(events.clone());

        Ok(Self {
            config,
            events,
            oauth,
            flow,
            session: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn flow_state(&self) -> FlowState {
        self.flow.state()
    }

    /// Run the interactive sign-in and return the first token pair.
    ///
    /// The pair is not kept; pass it (after persisting it) to [`connect`](Self::connect).
    pub async fn authorize(&self) -> Result<TokenPair> {
        self.authorize_with_cancel(CancellationToken::new()).await
    }

    /// Like [`authorize`](Self::authorize); cancelling `cancel` aborts the wait.
    #[instrument(skip(self, cancel))]
    pub async fn authorize_with_cancel(&self, cancel: CancellationToken) -> Result<TokenPair> {
        Ok(self.flow.begin_with_cancel(cancel).await?)
    }

    /// Start a session from `tokens`; refreshed pairs go to `persistence`.
    ///
    /// Replaces any previous session.
    #[instrument(skip(self, tokens, persistence))]
    pub async fn connect(&self, tokens: TokenPair, persistence: Arc<dyn TokenPersistence>) {
        let refresher = Arc::new(
            TokenRefresher::new(
                tokens,
                self.oauth.clone(),
                self.config.clock.clone(),
                self.config.auth.refresh_margin,
                persistence,
            )
            .with_event_bus(self.events.clone()),
        );
        let uploader = ObjectUploader::new(
            self.config.http_client.clone(),
            refresher.clone(),
            self.config.drive.clone(),
        )
        .with_event_bus(self.events.clone());

        *self.session.write().await = Some(Arc::new(Session { refresher, uploader }));
        info!("Google Drive session connected");
    }

    /// Restore a session from the configured secure store.
    ///
    /// Returns `false` when no store is configured or nothing was persisted.
    #[instrument(skip(self))]
    pub async fn connect_from_secure_store(&self) -> Result<bool> {
        let Some(store) = self.config.secure_store.clone() else {
            warn!("No secure store configured");
            return Ok(false);
        };

        let persistence = SecureStorePersistence::new(store);
        match persistence.load().await? {
            Some(tokens) => {
                self.connect(tokens, Arc::new(persistence)).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop the current session, if any.
    pub async fn disconnect(&self) {
        if self.session.write().await.take().is_some() {
            info!("Google Drive session disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Snapshot of the session's current token pair.
    pub async fn tokens(&self) -> Option<TokenPair> {
        let session = self.session.read().await.clone()?;
        Some(session.refresher.tokens().await)
    }

    /// A valid access token, refreshed if it is within the safety margin.
    pub async fn access_token(&self) -> Result<String> {
        let session = self.current_session().await?;
        Ok(session.refresher.ensure_valid().await?)
    }

    /// Upload and share `task.local_file`.
    pub async fn upload(&self, task: UploadTask) -> Result<UploadResult> {
        let session = self.current_session().await?;
        Ok(session.uploader.upload(task).await?)
    }

    async fn current_session(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(CoreError::NotConnected)
    }
}
