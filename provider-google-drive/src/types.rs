//! Google Drive API request and response types
//!
//! Data structures for the subset of Google Drive API v3 used by uploads.

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Fields requested from the multipart upload
pub const UPLOAD_FIELDS: &str = "id,name,mimeType,webViewLink,webContentLink";

/// Google Drive API file resource, as returned for uploads and folders
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub mime_type: Option<String>,

    /// Link for opening the file in a browser
    #[serde(default)]
    pub web_view_link: Option<String>,

    /// Direct download link (absent for Google-native documents)
    #[serde(default)]
    pub web_content_link: Option<String>,
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

/// Metadata sent on create: the JSON part of a multipart upload, or the whole
/// body when creating a folder.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
}

impl FileMetadata {
    pub fn folder(name: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parents: vec![parent_id.into()],
        }
    }
}

/// Body of `POST /files/{id}/permissions`
///
/// See: https://developers.google.com/drive/api/v3/reference/permissions
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionRequest {
    pub role: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl PermissionRequest {
    /// Anyone with the link can read.
    pub fn public_reader() -> Self {
        Self {
            role: "reader".to_string(),
            kind: "anyone".to_string(),
        }
    }
}

/// Drive's error envelope: `{"error": {"code": 404, "message": "..."}}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<u16>,
    pub message: String,
}
