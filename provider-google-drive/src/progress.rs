//! Staged upload progress.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Pipeline stage; each maps to a fixed percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStage {
    Preparing,
    Uploading,
    SettingPermission,
    Complete,
    Error,
}

impl UploadStage {
    pub fn percent(&self) -> u8 {
        match self {
            UploadStage::Preparing => 10,
            UploadStage::Uploading => 30,
            UploadStage::SettingPermission => 70,
            UploadStage::Complete => 100,
            UploadStage::Error => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Preparing => "Preparing",
            UploadStage::Uploading => "Uploading",
            UploadStage::SettingPermission => "SettingPermission",
            UploadStage::Complete => "Complete",
            UploadStage::Error => "Error",
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: UploadStage,
    pub message: String,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(stage: UploadStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            percent: stage.percent(),
        }
    }
}

/// Receives every [`ProgressEvent`] of one upload, in order.
///
/// Called inline on the uploading task; keep it cheap.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
