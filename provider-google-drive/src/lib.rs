//! Google Drive upload provider
//!
//! Stores a local file in the user's Drive under a folder path, makes it
//! readable by link and returns URLs for it.
//!
//! - [`ObjectUploader`]: the upload pipeline with staged progress
//! - [`FolderResolver`] / [`FolderCache`]: path-to-folder-id resolution
//! - [`MultipartBody`]: the `multipart/related` request encoder
//! - [`DriveClient`]: bearer-authenticated Drive requests

pub mod client;
pub mod error;
pub mod folders;
pub mod multipart;
pub mod progress;
pub mod task;
pub mod types;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use client::{AccessTokenSource, DriveClient, StaticToken};
pub use error::{Result, UploadError};
pub use folders::{FolderCache, FolderResolver};
pub use multipart::MultipartBody;
pub use progress::{ProgressCallback, ProgressEvent, UploadStage};
pub use task::{FileCategory, UploadResult, UploadTask};
pub use uploader::{ObjectUploader, DEFAULT_MIME_TYPE};
