//! Queued file model
//!
//! A `QueuedFile` lives from drop-time until explicit removal or a full
//! queue clear. It survives failed and cancelled sessions so it can be
//! re-submitted.

use chrono::{DateTime, Utc};
use ingest_common::events::{FileKind, FileState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{IngestError, IngestResult};

/// Queue-local file identifier
///
/// Assigned from a per-queue counter at enqueue time, never reused and
/// independent of the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(u64);

impl LocalId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f-{}", self.0)
    }
}

/// Raw file handed to `enqueue`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub path: PathBuf,
    /// Name sent to the backend; events refer to the file by this name
    pub name: String,
    pub size_bytes: u64,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            size_bytes,
        }
    }

    /// Build a handle from a file on disk
    pub async fn from_path(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                IngestError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                ))
            })?;

        Ok(Self::new(path, name, metadata.len()))
    }
}

/// One file in the upload queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedFile {
    pub local_id: LocalId,
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub kind: FileKind,
    pub state: FileState,
    /// Meaningful only while in flight; 100 for terminal success
    pub progress_percent: u8,
    /// Last status message from the server
    pub message: String,
    /// Set only in the `error` state
    pub error_detail: Option<String>,
    /// Set only in the `duplicate` state
    pub duplicate_reason: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl QueuedFile {
    pub(crate) fn new(local_id: LocalId, handle: FileHandle, kind: FileKind) -> Self {
        Self {
            local_id,
            name: handle.name,
            path: handle.path,
            size_bytes: handle.size_bytes,
            kind,
            state: FileState::Pending,
            progress_percent: 0,
            message: String::new(),
            error_detail: None,
            duplicate_reason: None,
            added_at: Utc::now(),
        }
    }

    /// Progress if it is defined for the current state
    pub fn progress(&self) -> Option<u8> {
        if self.state.is_in_flight() {
            Some(self.progress_percent)
        } else if self.state.is_success() {
            Some(100)
        } else {
            None
        }
    }

    /// Progress column text (`-` when undefined)
    pub fn progress_display(&self) -> String {
        match self.progress() {
            Some(p) => format!("{}%", p),
            None => "-".to_string(),
        }
    }
}
