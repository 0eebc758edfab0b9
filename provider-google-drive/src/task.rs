//! Upload input and output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::progress::{ProgressCallback, ProgressEvent};

/// What kind of media the host is sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Video,
    Audio,
    Document,
    Image,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Video => "video",
            FileCategory::Audio => "audio",
            FileCategory::Document => "document",
            FileCategory::Image => "image",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One object to upload.
///
/// ```
/// use provider_google_drive::{FileCategory, UploadTask};
///
/// let task = UploadTask::new("/tmp/clip.mp4", "Notes/Attachments", FileCategory::Video)
///     .with_mime_type("video/mp4")
///     .with_progress(|event| println!("{}% {}", event.percent, event.message));
/// assert_eq!(task.file_name().as_deref(), Some("clip.mp4"));
/// ```
#[derive(Clone)]
pub struct UploadTask {
    pub local_file: PathBuf,
    pub destination_folder_path: String,
    pub category: FileCategory,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub on_progress: Option<ProgressCallback>,
    pub cancellation: Option<CancellationToken>,
}

impl UploadTask {
    pub fn new(
        local_file: impl Into<PathBuf>,
        destination_folder_path: impl Into<String>,
        category: FileCategory,
    ) -> Self {
        Self {
            local_file: local_file.into(),
            destination_folder_path: destination_folder_path.into(),
            category,
            file_name: None,
            mime_type: None,
            on_progress: None,
            cancellation: None,
        }
    }

    /// Store the object under `name` instead of the local file name.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Remote name: the override, else the local file name.
    pub fn file_name(&self) -> Option<String> {
        self.file_name
            .clone()
            .or_else(|| file_name_of(&self.local_file))
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("local_file", &self.local_file)
            .field("destination_folder_path", &self.destination_folder_path)
            .field("category", &self.category)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("has_progress_callback", &self.on_progress.is_some())
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub remote_id: String,
    /// Page for viewing the object in a browser.
    pub primary_view_url: String,
    /// URL resolving to the raw bytes.
    pub direct_content_url: String,
    pub name: String,
    pub mime_type: String,
    pub category: FileCategory,
    /// Whether the public-read permission was applied.
    pub shared: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_override() {
        let task = UploadTask::new("/data/raw.bin", "", FileCategory::Document);
        assert_eq!(task.file_name().as_deref(), Some("raw.bin"));

        let task = task.with_file_name("report.pdf");
        assert_eq!(task.file_name().as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_directory_like_path_has_no_name() {
        let task = UploadTask::new("/", "", FileCategory::Image);
        assert_eq!(task.file_name(), None);
    }

    #[test]
    fn test_category_serialization() {
        assert_eq!(serde_json::to_string(&FileCategory::Audio).unwrap(), "\"audio\"");
        assert_eq!(FileCategory::Video.to_string(), "video");
    }
}
