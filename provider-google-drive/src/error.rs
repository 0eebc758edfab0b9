//! Error types for the Google Drive upload pipeline

use std::path::PathBuf;

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

/// Upload pipeline errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// Network failure or a non-2xx answer from Drive
    #[error("{}", transport_message(.status, .message))]
    UploadTransportError { status: Option<u16>, message: String },

    /// A destination folder could not be found or created
    #[error("Failed to resolve folder '{segment}' under '{parent_id}': {source}")]
    FolderResolutionError {
        parent_id: String,
        segment: String,
        #[source]
        source: Box<UploadError>,
    },

    /// Public-read permission could not be applied. Never returned from
    /// `upload`; carried by logs and events only.
    #[error("Failed to share object {remote_id}: {message}")]
    PermissionSetFailed { remote_id: String, message: String },

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid upload task: {0}")]
    InvalidTask(String),

    /// Drive answered 2xx with a body we could not interpret
    #[error("Unexpected Drive response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Drive request failed (HTTP {}): {}", status, message),
        None => format!("Drive request failed: {}", message),
    }
}

impl From<BridgeError> for UploadError {
    fn from(error: BridgeError) -> Self {
        UploadError::UploadTransportError {
            status: None,
            message: error.to_string(),
        }
    }
}

impl UploadError {
    /// HTTP status behind this error, looking through folder resolution.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::UploadTransportError { status, .. } => *status,
            UploadError::FolderResolutionError { source, .. } => source.status(),
            _ => None,
        }
    }

    /// `true` when Drive reported a missing object, e.g. a deleted parent folder.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Short, actionable notice suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            UploadError::UploadTransportError { status: Some(401 | 403), .. } => {
                "Google Drive refused the upload. Reconnect your account and try again."
            }
            UploadError::UploadTransportError { .. } => {
                "The upload to Google Drive failed. Check your connection and try again."
            }
            UploadError::FolderResolutionError { .. } => {
                "The destination folder could not be prepared in Google Drive."
            }
            UploadError::PermissionSetFailed { .. } => {
                "The file was uploaded but could not be shared publicly."
            }
            UploadError::Cancelled => "The upload was cancelled.",
            UploadError::Io { .. } => "The file could not be read from disk.",
            UploadError::InvalidTask(_) => "The selected file cannot be uploaded.",
            UploadError::InvalidResponse(_) => {
                "Google Drive returned an unexpected response. Please try again."
            }
            UploadError::Auth(e) => e.user_message(),
        }
    }
}

/// Result type for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = UploadError::UploadTransportError {
            status: Some(404),
            message: "File not found: abc.".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Drive request failed (HTTP 404): File not found: abc."
        );
        assert!(error.is_not_found());
    }

    #[test]
    fn test_bridge_error_becomes_transport_error() {
        let error: UploadError = BridgeError::Timeout("120s".to_string()).into();
        assert!(matches!(
            error,
            UploadError::UploadTransportError { status: None, .. }
        ));
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_folder_error_exposes_inner_status() {
        let error = UploadError::FolderResolutionError {
            parent_id: "root".to_string(),
            segment: "Videos".to_string(),
            source: Box::new(UploadError::UploadTransportError {
                status: Some(404),
                message: "File not found".to_string(),
            }),
        };
        assert!(error.is_not_found());
        assert!(error.to_string().contains("'Videos'"));
    }

    #[test]
    fn test_auth_errors_keep_their_notice() {
        let error: UploadError = AuthError::RefreshFailed {
            status: 400,
            message: "invalid_grant".to_string(),
        }
        .into();
        assert_eq!(
            error.user_message(),
            AuthError::RefreshFailed {
                status: 400,
                message: String::new()
            }
            .user_message()
        );
    }
}
