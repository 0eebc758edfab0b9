//! `multipart/related` body for Drive's single-request upload.
//!
//! Layout:
//!
//! ```text
//! --<boundary>
//! Content-Type: application/json; charset=UTF-8
//!
//! {"name":...,"mimeType":...,"parents":[...]}
//! --<boundary>
//! Content-Type: <mime type>
//! Content-Transfer-Encoding: base64
//!
//! <base64 content>
//! --<boundary>--
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{Result, UploadError};
use crate::types::FileMetadata;

/// Encoded upload body plus the boundary it was built with.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: Bytes,
}

impl MultipartBody {
    /// Encode `metadata` and `content` with a fresh random boundary.
    pub fn encode(metadata: &FileMetadata, content: &[u8]) -> Result<Self> {
        check_mime_type(&metadata.mime_type)?;
        let boundary = format!("drive_share_{}", Uuid::new_v4().simple());
        let json = serde_json::to_vec(metadata)
            .map_err(|e| UploadError::InvalidTask(format!("Unencodable metadata: {}", e)))?;
        let encoded = STANDARD.encode(content);

        let mut body = BytesMut::with_capacity(json.len() + encoded.len() + 4 * boundary.len() + 160);
        body.put_slice(format!("--{}\r\n", boundary).as_bytes());
        body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.put_slice(&json);
        body.put_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
        body.put_slice(format!("Content-Type: {}\r\n", metadata.mime_type).as_bytes());
        body.put_slice(b"Content-Transfer-Encoding: base64\r\n\r\n");
        body.put_slice(encoded.as_bytes());
        body.put_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Ok(Self {
            boundary,
            body: body.freeze(),
        })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }
}

/// A MIME type goes verbatim into a part header, so it must be a single
/// printable line.
pub(crate) fn check_mime_type(mime_type: &str) -> Result<()> {
    if mime_type.trim().is_empty() || mime_type.chars().any(char::is_control) {
        return Err(UploadError::InvalidTask(format!(
            "Invalid MIME type {:?}",
            mime_type
        )));
    }
    Ok(())
}
