//! # Authentication Module
//!
//! OAuth 2.0 lifecycle for a Google Drive desktop client.
//!
//! ## Overview
//!
//! This crate obtains the first token pair through the interactive
//! authorization code grant (PKCE plus a loopback redirect listener) and keeps
//! its access token valid afterwards. Persisting tokens across restarts is
//! left to the host through the [`TokenPersistence`] hook.
//!
//! ## Features
//!
//! - Authorization URL building with PKCE and a state nonce
//! - Single-use loopback listener with timeout and cancellation
//! - Single-flight token refresh with a safety margin
//! - Optional keyring-backed persistence via `SecureStore`
//! - Auth state event emission

pub mod callback;
pub mod error;
pub mod flow;
pub mod oauth;
pub mod persistence;
pub mod refresher;
pub mod types;

/// Provider name carried by auth events.
pub const PROVIDER_NAME: &str = "GoogleDrive";

pub use callback::CallbackListener;
pub use error::{AuthError, Result};
pub use flow::AuthorizationFlow;
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use persistence::{FnPersistence, NoopPersistence, SecureStorePersistence, TokenPersistence};
pub use refresher::TokenRefresher;
pub use types::{FlowState, OAuthCredential, PendingAuthorization, TokenPair};
