//! Token Persistence Hook
//!
//! The core never stores tokens on its own. After every successful refresh the
//! [`TokenRefresher`](crate::TokenRefresher) awaits the host's
//! [`TokenPersistence`] with the new pair; the host decides where it goes.
//!
//! Provided implementations:
//!
//! - [`NoopPersistence`] for session-only tokens
//! - [`FnPersistence`] wrapping a plain closure
//! - [`SecureStorePersistence`] writing JSON into a platform `SecureStore`

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::storage::SecureStore;
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};
use crate::types::TokenPair;

/// Key used by [`SecureStorePersistence`] unless overridden.
pub const DEFAULT_TOKEN_KEY: &str = "google_drive_tokens";

/// Receives every token pair produced by a refresh.
///
/// Called exactly once per successful refresh, after the in-memory pair has
/// been replaced, so `tokens` always holds the new values.
#[async_trait]
pub trait TokenPersistence: Send + Sync {
    async fn persist(&self, tokens: &TokenPair) -> Result<()>;
}

/// Keeps tokens in memory only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersistence;

#[async_trait]
impl TokenPersistence for NoopPersistence {
    async fn persist(&self, _tokens: &TokenPair) -> Result<()> {
        Ok(())
    }
}

/// Adapts a synchronous closure into a [`TokenPersistence`].
///
/// ```
/// use core_auth::persistence::FnPersistence;
///
/// let persistence = FnPersistence::new(|tokens| {
///     println!("new expiry: {}", tokens.expires_at);
///     Ok(())
/// });
/// # let _ = persistence;
/// ```
pub struct FnPersistence<F> {
    callback: F,
}

impl<F> FnPersistence<F>
where
    F: Fn(&TokenPair) -> Result<()> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> TokenPersistence for FnPersistence<F>
where
    F: Fn(&TokenPair) -> Result<()> + Send + Sync,
{
    async fn persist(&self, tokens: &TokenPair) -> Result<()> {
        (self.callback)(tokens)
    }
}

impl<F> fmt::Debug for FnPersistence<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPersistence").finish_non_exhaustive()
    }
}

/// Stores the token pair as JSON under a single key of a `SecureStore`.
///
/// # Security Considerations
///
/// - Token values are never logged
/// - Corrupted entries are deleted on load rather than surfaced
#[derive(Clone)]
pub struct SecureStorePersistence {
    store: Arc<dyn SecureStore>,
    key: String,
}

impl SecureStorePersistence {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self::with_key(store, DEFAULT_TOKEN_KEY)
    }

    pub fn with_key(store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load a previously persisted pair.
    ///
    /// Returns:
    /// - `Ok(Some(tokens))` if a valid pair exists
    /// - `Ok(None)` if nothing is stored or the stored entry was corrupted
    /// - `Err` if the secure store is unavailable
    pub async fn load(&self) -> Result<Option<TokenPair>> {
        let Some(bytes) = self
            .store
            .get_secret(&self.key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?
        else {
            debug!(key = %self.key, "No persisted tokens");
            return Ok(None);
        };

        match serde_json::from_slice::<TokenPair>(&bytes) {
            Ok(tokens) => {
                debug!(key = %self.key, expires_at = %tokens.expires_at, "Loaded persisted tokens");
                Ok(Some(tokens))
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Persisted tokens are corrupted, deleting");
                if let Err(delete_err) = self.store.delete_secret(&self.key).await {
                    warn!(key = %self.key, error = %delete_err, "Failed to delete corrupted tokens");
                }
                Ok(None)
            }
        }
    }

    /// Remove the persisted pair, e.g. after the user disconnects.
    pub async fn clear(&self) -> Result<()> {
        self.store
            .delete_secret(&self.key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;
        info!(key = %self.key, "Persisted tokens cleared");
        Ok(())
    }
}

#[async_trait]
impl TokenPersistence for SecureStorePersistence {
    async fn persist(&self, tokens: &TokenPair) -> Result<()> {
        let json = serde_json::to_vec(tokens).map_err(|e| AuthError::SerializationFailed {
            context: "token pair".to_string(),
            source: e,
        })?;

        self.store.set_secret(&self.key, &json).await.map_err(|e| {
            warn!(key = %self.key, error = %e, "Failed to write tokens to secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        info!(key = %self.key, expires_at = %tokens.expires_at, "Tokens persisted");
        Ok(())
    }
}

impl fmt::Debug for SecureStorePersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureStorePersistence")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
