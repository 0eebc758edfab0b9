//! Caller-facing upload pipeline.

use std::sync::Arc;

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::config::DriveSettings;
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use core_runtime::logging::strip_path;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client::{AccessTokenSource, DriveClient};
use crate::error::{Result, UploadError};
use crate::folders::FolderResolver;
use crate::multipart::{check_mime_type, MultipartBody};
use crate::progress::{ProgressCallback, ProgressEvent, UploadStage};
use crate::task::{UploadResult, UploadTask};
use crate::types::{DriveFile, FileMetadata, PermissionRequest, UPLOAD_FIELDS};

/// Used when the task names no MIME type.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Stores local files in Drive and shares them publicly.
///
/// `Send + Sync`; share one instance behind an `Arc` and run uploads
/// concurrently. Each upload runs its stages sequentially:
///
/// ```text
/// Preparing(10) -> Uploading(30) -> SettingPermission(70) -> Complete(100)
///       \________________\____________________\_____________> Error(0)
/// ```
///
/// The returned `Result` is the only outcome channel; the `Error` progress
/// event is informational. A failed permission step does not fail the upload,
/// it only clears [`UploadResult::shared`].
pub struct ObjectUploader {
    client: DriveClient,
    folders: FolderResolver,
    event_bus: Option<EventBus>,
}

impl ObjectUploader {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        tokens: Arc<dyn AccessTokenSource>,
        settings: DriveSettings,
    ) -> Self {
        let client = DriveClient::new(http_client, tokens, settings);
        Self {
            folders: FolderResolver::new(client.clone()),
            client,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn folders(&self) -> &FolderResolver {
        &self.folders
    }

    /// Upload `task.local_file` into `task.destination_folder_path`.
    ///
    /// # Errors
    ///
    /// - `Io` / `InvalidTask` when the local file cannot be read or named
    /// - `FolderResolutionError` when the destination cannot be prepared
    /// - `UploadTransportError` when the upload request fails
    /// - `Auth` when no valid access token can be obtained
    /// - `Cancelled` when the task's cancellation token fires
    #[instrument(skip(self, task), fields(category = %task.category))]
    pub async fn upload(&self, task: UploadTask) -> Result<UploadResult> {
        let progress = ProgressReporter {
            upload_id: Uuid::new_v4().to_string(),
            callback: task.on_progress.clone(),
            event_bus: self.event_bus.clone(),
        };

        let outcome = match task.cancellation.clone() {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(UploadError::Cancelled),
                result = self.run(&task, &progress) => result,
            },
            None => self.run(&task, &progress).await,
        };

        match &outcome {
            Ok(result) => progress.emit(UploadEvent::Completed {
                upload_id: progress.upload_id.clone(),
                remote_id: result.remote_id.clone(),
                shared: result.shared,
            }),
            Err(e) => {
                warn!(error = %e, "Upload failed");
                progress.report(UploadStage::Error, e.to_string());
                progress.emit(UploadEvent::Failed {
                    upload_id: progress.upload_id.clone(),
                    message: e.to_string(),
                });
            }
        }
        outcome
    }

    async fn run(&self, task: &UploadTask, progress: &ProgressReporter) -> Result<UploadResult> {
        let local_path = task.local_file.to_string_lossy();
        let name = task.file_name().ok_or_else(|| {
            UploadError::InvalidTask(format!("{} has no file name", strip_path(&local_path)))
        })?;
        let mime_type = task
            .mime_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        check_mime_type(&mime_type)?;
        progress.report(UploadStage::Preparing, format!("Preparing {}", name));

        let content = tokio::fs::read(&task.local_file)
            .await
            .map_err(|source| UploadError::Io {
                path: task.local_file.clone(),
                source,
            })?;
        info!(
            file = strip_path(&local_path),
            size = content.len(),
            mime_type = %mime_type,
            "Read local file"
        );

        let destination = task.destination_folder_path.as_str();
        let folder_id = self.resolve_destination(destination).await?;

        progress.report(UploadStage::Uploading, format!("Uploading {}", name));
        let uploaded = match self.upload_content(&name, &mime_type, &folder_id, &content).await {
            Err(e) if e.is_not_found() && self.folders.cache().is_enabled() => {
                warn!("Destination folder no longer exists, resolving it again");
                self.folders.invalidate(destination);
                let folder_id = self.folders.resolve(destination).await?;
                self.upload_content(&name, &mime_type, &folder_id, &content)
                    .await?
            }
            other => other?,
        };
        info!(remote_id = %uploaded.id, "Object uploaded");

        progress.report(UploadStage::SettingPermission, "Making the file viewable by link");
        let shared = self.share_publicly(&uploaded.id, progress).await;

        let settings = self.client.settings();
        let result = UploadResult {
            primary_view_url: uploaded
                .web_view_link
                .unwrap_or_else(|| settings.view_url(&uploaded.id)),
            direct_content_url: uploaded
                .web_content_link
                .unwrap_or_else(|| settings.content_url(&uploaded.id)),
            name: uploaded.name.unwrap_or(name),
            mime_type: uploaded.mime_type.unwrap_or(mime_type),
            category: task.category,
            shared,
            remote_id: uploaded.id,
        };

        progress.report(UploadStage::Complete, "Upload complete");
        Ok(result)
    }

    /// Resolve the folder, retrying once without stale cache entries.
    async fn resolve_destination(&self, path: &str) -> Result<String> {
        match self.folders.resolve(path).await {
            Err(e) if e.is_not_found() && self.folders.cache().is_enabled() => {
                warn!(error = %e, "Cached folder is gone, resolving again");
                self.folders.invalidate(path);
                self.folders.resolve(path).await
            }
            other => other,
        }
    }

    async fn upload_content(
        &self,
        name: &str,
        mime_type: &str,
        folder_id: &str,
        content: &[u8],
    ) -> Result<DriveFile> {
        let metadata = FileMetadata {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parents: vec![folder_id.to_string()],
        };
        let multipart = MultipartBody::encode(&metadata, content)?;
        let url = format!(
            "{}/files?uploadType=multipart&fields={}",
            self.client.settings().upload_base,
            UPLOAD_FIELDS
        );

        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("Content-Type", multipart.content_type())
            .body(multipart.into_bytes());
        self.client.send_json(request).await
    }

    /// Grant anyone-with-the-link read access. Failures are reported, never raised.
    async fn share_publicly(&self, remote_id: &str, progress: &ProgressReporter) -> bool {
        let url = format!(
            "{}/files/{}/permissions",
            self.client.settings().api_base,
            urlencoding::encode(remote_id)
        );
        let outcome = match HttpRequest::new(HttpMethod::Post, url).json(&PermissionRequest::public_reader()) {
            Ok(request) => self.client.send(request).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => true,
            Err(e) => {
                let failure = UploadError::PermissionSetFailed {
                    remote_id: remote_id.to_string(),
                    message: e.to_string(),
                };
                warn!(error = %failure, "Uploaded object stays private");
                progress.emit(UploadEvent::PermissionFailed {
                    upload_id: progress.upload_id.clone(),
                    remote_id: remote_id.to_string(),
                    message: e.to_string(),
                });
                false
            }
        }
    }
}

/// Fans a stage out to the task callback and the event bus.
struct ProgressReporter {
    upload_id: String,
    callback: Option<ProgressCallback>,
    event_bus: Option<EventBus>,
}

impl ProgressReporter {
    fn report(&self, stage: UploadStage, message: impl Into<String>) {
        let event = ProgressEvent::new(stage, message);
        if let Some(callback) = &self.callback {
            callback(&event);
        }
        self.emit(UploadEvent::Progress {
            upload_id: self.upload_id.clone(),
            stage: stage.as_str().to_string(),
            message: event.message,
            percent: event.percent,
        });
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Upload(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticToken;
    use crate::task::FileCategory;
    use crate::testing::FakeDrive;
    use std::io::Write;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn settings() -> DriveSettings {
        DriveSettings::default().with_endpoints(FakeDrive::API_BASE, FakeDrive::UPLOAD_BASE)
    }

    fn uploader(drive: Arc<FakeDrive>) -> ObjectUploader {
        ObjectUploader::new(drive, Arc::new(StaticToken::new("token")), settings())
    }

    fn local_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("clip")
            .suffix(".mp4")
            .tempfile()
            .unwrap();
        file.write_all(content).unwrap();
        file
    }

    fn recording_task(
        path: &std::path::Path,
        destination: &str,
    ) -> (UploadTask, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let task = UploadTask::new(path, destination, FileCategory::Video)
            .with_mime_type("video/mp4")
            .with_progress(move |event| sink.lock().unwrap().push(event.clone()));
        (task, events)
    }

    #[test]
    fn test_uploader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ObjectUploader>();
    }

    #[tokio::test]
    async fn test_upload_reports_stages_in_order() {
        let drive = Arc::new(FakeDrive::new());
        let file = local_file(b"frame data");
        let (task, events) = recording_task(file.path(), "Notes/Media");

        let result = uploader(drive.clone()).upload(task).await.unwrap();

        let stages: Vec<_> = events.lock().unwrap().iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                UploadStage::Preparing,
                UploadStage::Uploading,
                UploadStage::SettingPermission,
                UploadStage::Complete
            ]
        );
        let percents: Vec<_> = events.lock().unwrap().iter().map(|e| e.percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));

        assert!(result.shared);
        assert_eq!(result.mime_type, "video/mp4");
        assert_eq!(result.category, FileCategory::Video);
        let stored = drive.uploaded(&result.remote_id).unwrap();
        assert_eq!(stored.content, b"frame data");
        assert_eq!(stored.parents, vec![drive.folder_id("Notes/Media").unwrap()]);
        assert_eq!(drive.permissions(), vec![result.remote_id.clone()]);
        assert!(result.primary_view_url.contains(&result.remote_id));
    }

    #[tokio::test]
    async fn test_permission_failure_still_succeeds() {
        let drive = Arc::new(FakeDrive::new().with_permission_status(403));
        let file = local_file(b"doc");
        let bus = EventBus::new(32);
        let mut events = bus.subscribe();
        let uploader = uploader(drive.clone()).with_event_bus(bus);

        let task = UploadTask::new(file.path(), "", FileCategory::Document);
        let result = uploader.upload(task).await.unwrap();

        assert!(!result.shared);
        assert_eq!(result.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(drive.uploaded(&result.remote_id).unwrap().parents, vec!["root"]);

        let mut saw_permission_failure = false;
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::Upload(UploadEvent::PermissionFailed { remote_id, .. }) = event {
                assert_eq!(remote_id, result.remote_id);
                saw_permission_failure = true;
            }
        }
        assert!(saw_permission_failure);
    }

    #[tokio::test]
    async fn test_mime_type_with_line_break_is_rejected_before_network() {
        let drive = Arc::new(FakeDrive::new());
        let file = local_file(b"doc");
        let task = UploadTask::new(file.path(), "Docs", FileCategory::Document)
            .with_mime_type("text/plain\r\nX-Injected: 1");

        let err = uploader(drive.clone()).upload(task).await.unwrap_err();

        assert!(matches!(err, UploadError::InvalidTask(_)));
        assert_eq!(drive.request_count(), 0);
    }

    #[tokio::test]
    async fn test_links_synthesized_from_templates() {
        let drive = Arc::new(FakeDrive::new().without_links());
        let file = local_file(b"img");

        let result = uploader(drive)
            .upload(UploadTask::new(file.path(), "Pics", FileCategory::Image))
            .await
            .unwrap();

        assert_eq!(
            result.primary_view_url,
            format!("https://drive.google.com/file/d/{}/view", result.remote_id)
        );
        assert_eq!(
            result.direct_content_url,
            format!("https://drive.google.com/uc?id={}&export=download", result.remote_id)
        );
    }

    #[tokio::test]
    async fn test_stale_folder_is_resolved_again() {
        let drive = Arc::new(FakeDrive::new());
        let uploader = uploader(drive.clone());
        let first = local_file(b"one");
        uploader
            .upload(UploadTask::new(first.path(), "A/B", FileCategory::Audio))
            .await
            .unwrap();
        let stale = drive.folder_id("A/B").unwrap();

        drive.delete_folder(&stale);
        let second = local_file(b"two");
        let result = uploader
            .upload(UploadTask::new(second.path(), "A/B", FileCategory::Audio))
            .await
            .unwrap();

        let fresh = drive.folder_id("A/B").unwrap();
        assert_ne!(fresh, stale);
        assert_eq!(drive.uploaded(&result.remote_id).unwrap().parents, vec![fresh]);
        assert_eq!(drive.folder_creates(), 3);
    }

    #[tokio::test]
    async fn test_missing_local_file_reports_error_stage() {
        let drive = Arc::new(FakeDrive::new());
        let (task, events) = recording_task(std::path::Path::new("/nonexistent/clip.mp4"), "A");

        let err = uploader(drive.clone()).upload(task).await.unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));

        let events = events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.stage, UploadStage::Error);
        assert_eq!(last.percent, 0);
        assert_eq!(drive.request_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejection_is_transport_error() {
        let drive = Arc::new(FakeDrive::new().with_upload_status(500));
        let file = local_file(b"x");

        let err = uploader(drive)
            .upload(UploadTask::new(file.path(), "", FileCategory::Video))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::UploadTransportError { status: Some(500), .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_task() {
        let drive = Arc::new(FakeDrive::new());
        let file = local_file(b"x");
        let token = CancellationToken::new();
        token.cancel();

        let task = UploadTask::new(file.path(), "A", FileCategory::Video).with_cancellation(token);
        let err = uploader(drive.clone()).upload(task).await.unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(drive.request_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_share_folders() {
        let drive = Arc::new(FakeDrive::new());
        let uploader = Arc::new(uploader(drive.clone()));
        let files: Vec<_> = (0..4).map(|i| local_file(&[i])).collect();

        let handles: Vec<_> = files
            .iter()
            .map(|file| {
                let uploader = uploader.clone();
                let task = UploadTask::new(file.path(), "Shared/Batch", FileCategory::Image);
                tokio::spawn(async move { uploader.upload(task).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().shared);
        }
        assert_eq!(drive.folder_creates(), 2);
    }
}
