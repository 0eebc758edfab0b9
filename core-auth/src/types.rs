use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::oauth::PkceVerifier;

/// OAuth client credential.
///
/// Supplied by configuration and immutable for the process lifetime; never
/// generated internally. The `Debug` implementation redacts the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredential {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for OAuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Access token, refresh token and absolute expiry.
///
/// The host owns this value across restarts; the core never stores it on its
/// own. Within a session it is replaced in place by the `TokenRefresher`.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug`
/// implementation redacts both tokens.
///
/// # Examples
///
/// ```
/// use core_auth::TokenPair;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let tokens = TokenPair::from_expires_in("ya29.a0", "1//0g", 3600, now).unwrap();
///
/// assert!(!tokens.needs_refresh(now, Duration::seconds(300)));
/// assert!(tokens.needs_refresh(now + Duration::seconds(3400), Duration::seconds(300)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Convert a relative `expires_in` (seconds) to an absolute instant at `now`.
    ///
    /// Returns `None` when the expiry cannot be represented.
    pub fn from_expires_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let expires_at = now.checked_add_signed(Duration::try_seconds(expires_in)?)?;
        Some(Self::new(access_token, refresh_token, expires_at))
    }

    /// `true` unless `now + margin` is strictly before the expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }

    /// Time left before the literal expiry, `None` once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        (now < self.expires_at).then(|| self.expires_at - now)
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Interactive authorization state.
///
/// ```text
/// Idle -> Listening -> CodeReceived -> Exchanging -> Succeeded
///            |              |              |
///            +--------------+--------------+-------> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowState {
    #[default]
    Idle,
    Listening,
    CodeReceived,
    Exchanging,
    Succeeded,
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Succeeded | FlowState::Failed)
    }

    /// `true` while a redirect listener is (or is about to be) open.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            FlowState::Listening | FlowState::CodeReceived | FlowState::Exchanging
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FlowState::Idle => "Idle",
            FlowState::Listening => "Waiting for browser...",
            FlowState::CodeReceived => "Authorization code received",
            FlowState::Exchanging => "Exchanging code...",
            FlowState::Succeeded => "Signed In",
            FlowState::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// State held only while an interactive authorization runs.
#[derive(Clone)]
pub struct PendingAuthorization {
    pub verifier: PkceVerifier,
    pub port: u16,
    pub deadline: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn state_nonce(&self) -> &str {
        self.verifier.state()
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

impl fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("port", &self.port)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
