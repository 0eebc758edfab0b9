//! Destination folder resolution.
//!
//! A slash-separated path is walked from the configured root; each segment is
//! looked up by name, parent, folder MIME type and `trashed = false`, and
//! created when missing. Resolved ids are memoized in a bounded LRU cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use bridge_traits::http::{HttpMethod, HttpRequest};
use lru::LruCache;
use tracing::{debug, info, instrument};

use crate::client::DriveClient;
use crate::error::{Result, UploadError};
use crate::types::{DriveFile, FileMetadata, FilesListResponse, FOLDER_MIME_TYPE};

type FolderKey = (String, String);

/// Process-local `(parent_id, name) -> folder_id` memo.
///
/// Stale entries are tolerated: callers invalidate a path when Drive reports
/// one of its folders missing. Concurrent writers race with last-writer-wins.
pub struct FolderCache {
    entries: Option<Mutex<LruCache<FolderKey, String>>>,
}

impl FolderCache {
    /// `capacity == 0` disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn get(&self, parent_id: &str, name: &str) -> Option<String> {
        let entries = self.entries.as_ref()?;
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&(parent_id.to_string(), name.to_string()))
            .cloned()
    }

    pub fn insert(&self, parent_id: &str, name: &str, folder_id: &str) {
        if let Some(entries) = &self.entries {
            entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .put((parent_id.to_string(), name.to_string()), folder_id.to_string());
        }
    }

    pub fn remove(&self, parent_id: &str, name: &str) -> Option<String> {
        let entries = self.entries.as_ref()?;
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.pop(&(parent_id.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| {
            entries.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }
}

/// Split a destination path into its non-empty segments.
///
/// `"A//B/"` and `"/A/B"` both yield `["A", "B"]`; `""` and `"/"` yield nothing.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Quote a value for a Drive `q` string literal.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub struct FolderResolver {
    client: DriveClient,
    cache: FolderCache,
    root_id: String,
    segment_locks: tokio::sync::Mutex<HashMap<FolderKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderResolver {
    pub fn new(client: DriveClient) -> Self {
        let settings = client.settings();
        let cache = FolderCache::new(settings.folder_cache_capacity);
        let root_id = settings.root_folder_id.clone();
        Self {
            client,
            cache,
            root_id,
            segment_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &FolderCache {
        &self.cache
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Resolve `path` to a folder id, creating missing folders.
    ///
    /// An empty path resolves to the root.
    #[instrument(skip(self))]
    pub async fn resolve(&self, path: &str) -> Result<String> {
        let mut parent_id = self.root_id.clone();

        for segment in path_segments(path) {
            parent_id = self.resolve_segment(&parent_id, segment).await.map_err(|e| {
                UploadError::FolderResolutionError {
                    parent_id: parent_id.clone(),
                    segment: segment.to_string(),
                    source: Box::new(e),
                }
            })?;
        }

        debug!(folder_id = %parent_id, "Destination folder resolved");
        Ok(parent_id)
    }

    /// Drop every cached entry along `path`.
    pub fn invalidate(&self, path: &str) {
        let mut parent_id = self.root_id.clone();
        for segment in path_segments(path) {
            match self.cache.remove(&parent_id, segment) {
                Some(folder_id) => parent_id = folder_id,
                None => break,
            }
        }
        debug!("Folder cache entries invalidated");
    }

    async fn resolve_segment(&self, parent_id: &str, name: &str) -> Result<String> {
        if let Some(folder_id) = self.cache.get(parent_id, name) {
            return Ok(folder_id);
        }

        let key = (parent_id.to_string(), name.to_string());
        let lock = self
            .segment_locks
            .lock()
            .await
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        let resolved = {
            let _serialized = lock.lock().await;
            match self.cache.get(parent_id, name) {
                Some(folder_id) => Ok(folder_id),
                None => self.lookup_or_create(parent_id, name).await,
            }
        };

        let mut locks = self.segment_locks.lock().await;
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&key);
        }
        drop(locks);

        resolved
    }

    async fn lookup_or_create(&self, parent_id: &str, name: &str) -> Result<String> {
        let folder_id = match self.find_folder(parent_id, name).await? {
            Some(folder_id) => folder_id,
            None => self.create_folder(parent_id, name).await?,
        };
        self.cache.insert(parent_id, name, &folder_id);
        Ok(folder_id)
    }

    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<String>> {
        let query = format!(
            "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
            escape_query_value(name),
            escape_query_value(parent_id),
            FOLDER_MIME_TYPE
        );
        let url = format!(
            "{}/files?q={}&fields={}&spaces=drive",
            self.client.settings().api_base,
            urlencoding::encode(&query),
            urlencoding::encode("files(id,name)")
        );

        let listing: FilesListResponse = self
            .client
            .send_json(HttpRequest::new(HttpMethod::Get, url))
            .await?;
        Ok(listing.files.into_iter().next().map(|file| file.id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let url = format!("{}/files?fields=id", self.client.settings().api_base);
        let request = HttpRequest::new(HttpMethod::Post, url)
            .json(&FileMetadata::folder(name, parent_id))?;

        let created: DriveFile = self.client.send_json(request).await?;
        info!(folder_id = %created.id, "Created folder");
        Ok(created.id)
    }
}
