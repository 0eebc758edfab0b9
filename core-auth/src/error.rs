use thiserror::Error;

/// Outcomes of the authorization and token lifecycle.
///
/// Every variant renders a distinct message, and [`AuthError::user_message`]
/// gives the notice a host shows to the user.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The user denied consent or the caller cancelled the flow.
    #[error("Authorization was cancelled")]
    AuthCancelled,

    #[error("No authorization redirect received within {timeout_secs} seconds")]
    AuthTimeout { timeout_secs: u64 },

    /// The redirect carried a state nonce other than the one issued.
    #[error("Authorization state mismatch: redirect did not originate from this sign-in")]
    AuthStateMismatch,

    /// The provider reported an error on the redirect or the code exchange.
    #[error("Authorization provider error: {0}")]
    AuthProviderError(String),

    /// The provider rejected the refresh token; interactive sign-in is required.
    #[error("Token refresh rejected by provider (HTTP {status}): {message}")]
    RefreshFailed { status: u16, message: String },

    #[error("An authorization flow is already in progress")]
    SignInInProgress,

    #[error("Failed to start redirect listener on port {port}: {reason}")]
    ListenerFailed { port: u16, reason: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Failed to serialize {context}: {source}")]
    SerializationFailed {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Token persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Auth error: {0}")]
    Other(String),
}

impl AuthError {
    /// Short, actionable notice suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::AuthCancelled => "Sign-in was cancelled. Start it again when you are ready.",
            AuthError::AuthTimeout { .. } => {
                "Sign-in took too long. Please try again and finish in the browser window."
            }
            AuthError::AuthStateMismatch => {
                "Sign-in could not be verified. Close other sign-in tabs and try again."
            }
            AuthError::AuthProviderError(_) => {
                "Google rejected the sign-in. Check the app credentials and try again."
            }
            AuthError::RefreshFailed { .. } => {
                "Your Google Drive connection has expired. Reconnect your account."
            }
            AuthError::SignInInProgress => "A sign-in is already open in your browser.",
            AuthError::ListenerFailed { .. } => {
                "Could not receive the sign-in response. Another application may be using the port."
            }
            AuthError::NetworkError(_) => "Could not reach Google. Check your network connection.",
            AuthError::SecureStorageUnavailable(_) | AuthError::PersistenceFailed(_) => {
                "Your sign-in could not be saved and will be needed again next time."
            }
            AuthError::SerializationFailed { .. } | AuthError::Other(_) => {
                "Something went wrong while signing in. Please try again."
            }
        }
    }

    /// `true` when only a new interactive sign-in can recover.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, AuthError::RefreshFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
