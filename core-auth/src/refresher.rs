//! Single-flight access token refresh.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::oauth::OAuthFlowManager;
use crate::persistence::TokenPersistence;
use crate::types::TokenPair;
use crate::PROVIDER_NAME;

/// Owns the session's [`TokenPair`] and keeps its access token valid.
///
/// Every authenticated request goes through [`TokenRefresher::ensure_valid`].
/// Reads share an async `RwLock`; refreshes are serialized by a separate
/// `Mutex` so that concurrent callers observing an expired token trigger a
/// single network round trip and then reuse its result.
///
/// A refreshed pair that the persistence hook failed to save stays queued and
/// is saved again at the start of every later `ensure_valid` until it lands.
pub struct TokenRefresher {
    tokens: RwLock<TokenPair>,
    refresh_lock: Mutex<()>,
    unsaved: Mutex<Option<TokenPair>>,
    oauth: Arc<OAuthFlowManager>,
    clock: Arc<dyn Clock>,
    margin: chrono::Duration,
    persistence: Arc<dyn TokenPersistence>,
    event_bus: Option<EventBus>,
}

impl TokenRefresher {
    pub fn new(
        tokens: TokenPair,
        oauth: Arc<OAuthFlowManager>,
        clock: Arc<dyn Clock>,
        margin: Duration,
        persistence: Arc<dyn TokenPersistence>,
    ) -> Self {
        Self {
            tokens: RwLock::new(tokens),
            refresh_lock: Mutex::new(()),
            unsaved: Mutex::new(None),
            oauth,
            clock,
            margin: chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero()),
            persistence,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Snapshot of the current pair.
    pub async fn tokens(&self) -> TokenPair {
        self.tokens.read().await.clone()
    }

    /// Return an access token that stays valid for at least the margin.
    ///
    /// # Errors
    ///
    /// - `RefreshFailed` when the provider rejects the refresh token; the
    ///   caller must run the interactive flow again
    /// - `NetworkError` when the token endpoint cannot be reached
    #[instrument(skip(self))]
    pub async fn ensure_valid(&self) -> Result<String> {
        self.flush_unsaved().await;

        if let Some(token) = self.current_if_fresh().await {
            debug!("Access token still valid");
            return Ok(token);
        }

        let _refreshing = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.current_if_fresh().await {
            debug!("Access token refreshed by a concurrent caller");
            return Ok(token);
        }

        info!("Access token expired or expiring soon, refreshing");
        self.emit(AuthEvent::TokenRefreshing {
            provider: PROVIDER_NAME.to_string(),
        });

        let refresh_token = self.tokens.read().await.refresh_token.clone();
        let refreshed = match self.oauth.refresh_access_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                self.emit(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: !e.requires_reauthorization(),
                });
                return Err(e);
            }
        };

        *self.tokens.write().await = refreshed.clone();

        self.save(refreshed.clone()).await;

        self.emit(AuthEvent::TokenRefreshed {
            provider: PROVIDER_NAME.to_string(),
            expires_at: refreshed.expires_at.timestamp(),
        });
        info!(expires_at = %refreshed.expires_at, "Access token refreshed");

        Ok(refreshed.access_token)
    }

    /// `true` while a refreshed pair is waiting to be saved.
    pub async fn has_unsaved_tokens(&self) -> bool {
        self.unsaved.lock().await.is_some()
    }

    /// Persist `tokens`, queueing them when the hook fails. A newer pair
    /// replaces whatever was queued.
    async fn save(&self, tokens: TokenPair) {
        let mut unsaved = self.unsaved.lock().await;
        let saved = self.persistence.persist(&tokens).await;
        match saved {
            Ok(()) => {
                *unsaved = None;
            }
            Err(e) => {
                error!(error = %e, "Refreshed tokens could not be persisted, queued for retry");
                *unsaved = Some(tokens);
                self.emit(AuthEvent::AuthError {
                    message: AuthError::PersistenceFailed(e.to_string()).to_string(),
                    recoverable: true,
                });
            }
        }
    }

    /// Retry a queued save. Skipped while another caller holds the queue.
    async fn flush_unsaved(&self) {
        let Ok(mut unsaved) = self.unsaved.try_lock() else {
            return;
        };
        let Some(tokens) = unsaved.as_ref() else {
            return;
        };
        let saved = self.persistence.persist(tokens).await;
        match saved {
            Ok(()) => {
                info!("Queued tokens persisted");
                *unsaved = None;
            }
            Err(e) => warn!(error = %e, "Queued tokens still could not be persisted"),
        }
    }

    async fn current_if_fresh(&self) -> Option<String> {
        let tokens = self.tokens.read().await;
        (!tokens.needs_refresh(self.clock.now(), self.margin)).then(|| tokens.access_token.clone())
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}
