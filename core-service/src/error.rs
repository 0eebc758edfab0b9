use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Upload error: {0}")]
    Upload(#[from] provider_google_drive::UploadError),

    #[error("No Google Drive session; authorize or connect first")]
    NotConnected,
}

impl CoreError {
    /// Short, actionable notice suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            CoreError::Config(_) => {
                "Google Drive sharing is not configured correctly. Check the client ID and secret."
            }
            CoreError::Auth(e) => e.user_message(),
            CoreError::Upload(e) => e.user_message(),
            CoreError::NotConnected => "Connect your Google Drive account first.",
        }
    }

    /// `true` when the host should run `authorize` again.
    pub fn requires_reauthorization(&self) -> bool {
        match self {
            CoreError::Auth(e) => e.requires_reauthorization(),
            CoreError::Upload(provider_google_drive::UploadError::Auth(e)) => {
                e.requires_reauthorization()
            }
            CoreError::NotConnected => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use core_auth::AuthError;
    use provider_google_drive::UploadError;

    #[test]
    fn test_upload_auth_failure_requires_reauthorization() {
        let error: CoreError = UploadError::Auth(AuthError::RefreshFailed {
            status: 400,
            message: "invalid_grant".to_string(),
        })
        .into();
        assert!(error.requires_reauthorization());
        assert_eq!(
            error.user_message(),
            "Your Google Drive connection has expired. Reconnect your account."
        );
    }

    #[test]
    fn test_transport_failure_does_not_require_reauthorization() {
        let error: CoreError = UploadError::UploadTransportError {
            status: Some(503),
            message: "Backend Error".to_string(),
        }
        .into();
        assert!(!error.requires_reauthorization());
    }
}
