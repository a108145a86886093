//! Upload workflow type definitions
//!
//! Supporting types shared by the orchestrator and anything rendering it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of document accepted into the upload queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Zip,
}

impl FileKind {
    /// Derive the kind from a file name's extension (case-insensitive)
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileKind::Pdf),
            "zip" => Some(FileKind::Zip),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            FileKind::Pdf => "application/pdf",
            FileKind::Zip => "application/zip",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Pdf => f.write_str("pdf"),
            FileKind::Zip => f.write_str("zip"),
        }
    }
}

/// Lifecycle state of a single queued file
///
/// `pending → uploading → {processing | processing_zip} →
/// {completed | zip_extracted | error | duplicate}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Accepted into the queue, not yet submitted
    Pending,
    /// Part of a batch submission, no server event yet
    Uploading,
    /// Server accepted the file and began extraction
    Processing,
    /// Archive expansion in progress (zip only)
    ProcessingZip,
    /// Terminal success
    Completed,
    /// Archive fully expanded (zip only, terminal)
    ZipExtracted,
    /// Terminal failure
    Error,
    /// Content hash already known to the backend (terminal)
    Duplicate,
}

impl FileState {
    /// Parse the `status` string carried by a progress event
    pub fn from_wire(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(FileState::Pending),
            "uploading" => Some(FileState::Uploading),
            "processing" => Some(FileState::Processing),
            "processing_zip" => Some(FileState::ProcessingZip),
            "completed" | "complete" | "success" => Some(FileState::Completed),
            "zip_extracted" => Some(FileState::ZipExtracted),
            "error" | "failed" => Some(FileState::Error),
            "duplicate" => Some(FileState::Duplicate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileState::Pending => "pending",
            FileState::Uploading => "uploading",
            FileState::Processing => "processing",
            FileState::ProcessingZip => "processing_zip",
            FileState::Completed => "completed",
            FileState::ZipExtracted => "zip_extracted",
            FileState::Error => "error",
            FileState::Duplicate => "duplicate",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileState::Completed | FileState::ZipExtracted | FileState::Error | FileState::Duplicate
        )
    }

    /// Uploading or being processed server-side
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            FileState::Uploading | FileState::Processing | FileState::ProcessingZip
        )
    }

    /// Terminal success (counted as completed)
    pub fn is_success(self) -> bool {
        matches!(self, FileState::Completed | FileState::ZipExtracted)
    }

    /// States only reachable by archives
    pub fn is_zip_only(self) -> bool {
        matches!(self, FileState::ProcessingZip | FileState::ZipExtracted)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one batch submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No submission yet (or session discarded)
    #[default]
    Idle,
    /// Batch request issued, awaiting response or `start` event
    Submitting,
    Active,
    Paused,
    /// Cancel requested, awaiting confirmation
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Submitting => "submitting",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Cancelling => "cancelling",
            SessionState::Cancelled => "cancelled",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }

    /// A session in one of these states blocks a new submission
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            SessionState::Submitting
                | SessionState::Active
                | SessionState::Paused
                | SessionState::Cancelling
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Cancelled | SessionState::Completed | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Success,
    Warning,
    Error,
    Duplicate,
}

impl LogSeverity {
    /// Severity matching a file entering `state`
    pub fn for_file_state(state: FileState) -> Self {
        match state {
            FileState::Completed | FileState::ZipExtracted => LogSeverity::Success,
            FileState::Error => LogSeverity::Error,
            FileState::Duplicate => LogSeverity::Duplicate,
            _ => LogSeverity::Info,
        }
    }
}

/// Aggregate counters for the summary panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStats {
    /// Files counted
    pub total: usize,
    /// Terminal success (`completed` and `zip_extracted`)
    pub completed: usize,
    /// Terminal `error`
    pub failed: usize,
    /// Terminal `duplicate`
    pub duplicates: usize,
    /// `uploading`, `processing` or `processing_zip`
    pub processing: usize,
}

impl UploadStats {
    /// Files accounted for by a terminal or in-flight state
    pub fn accounted(&self) -> usize {
        self.completed + self.failed + self.duplicates + self.processing
    }
}
