//! Per-file state machine
//!
//! Pure transition logic over a [`QueuedFile`]; no I/O, no logging. The
//! caller decides what to record based on the returned [`Transition`].
//!
//! Rules:
//! - terminal states (`completed`, `zip_extracted`, `error`, `duplicate`)
//!   are never left through a server event; re-delivery of the same
//!   terminal state is a no-op
//! - `processing_zip` and `zip_extracted` only apply to archives
//! - progress is clamped to 0–100 and never decreases within an attempt

use ingest_common::events::{FileKind, FileState};

use crate::models::QueuedFile;

/// Outcome of applying a status to a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// State changed
    Applied { from: FileState, to: FileState },
    /// Same non-terminal state, progress moved forward
    Progressed { percent: u8 },
    /// Same non-terminal state, nothing to update
    Unchanged,
    /// Same terminal state delivered again
    Redelivered,
    /// File already terminal in a different state
    IgnoredTerminal {
        current: FileState,
        attempted: FileState,
    },
    /// Transition not allowed for this file
    Rejected { reason: String },
}

impl Transition {
    /// Whether the file was modified
    pub fn changed(&self) -> bool {
        matches!(self, Transition::Applied { .. } | Transition::Progressed { .. })
    }
}

/// Put a file into `uploading` for a new attempt
pub fn begin_upload(file: &mut QueuedFile) {
    file.state = FileState::Uploading;
    file.progress_percent = 0;
    file.message.clear();
    file.error_detail = None;
    file.duplicate_reason = None;
}

/// Apply a server-reported status
pub fn apply_status(
    file: &mut QueuedFile,
    target: FileState,
    message: &str,
    progress: Option<f64>,
) -> Transition {
    if file.state.is_terminal() {
        return if file.state == target {
            Transition::Redelivered
        } else {
            Transition::IgnoredTerminal {
                current: file.state,
                attempted: target,
            }
        };
    }

    if target == FileState::Pending {
        return Transition::Rejected {
            reason: "a submitted file cannot return to pending".to_string(),
        };
    }

    if target.is_zip_only() && file.kind != FileKind::Zip {
        return Transition::Rejected {
            reason: format!("{} only applies to zip archives", target),
        };
    }

    if !message.is_empty() {
        file.message = message.to_string();
    }

    if target == file.state {
        return match advance_progress(file, progress) {
            Some(percent) => Transition::Progressed { percent },
            None => Transition::Unchanged,
        };
    }

    let from = file.state;
    file.state = target;
    match target {
        FileState::Completed | FileState::ZipExtracted => {
            file.progress_percent = 100;
        }
        FileState::Error => {
            file.error_detail = Some(non_empty_or(message, "Processing failed"));
        }
        FileState::Duplicate => {
            file.duplicate_reason = Some(non_empty_or(message, "File already uploaded"));
        }
        _ => {
            advance_progress(file, progress);
        }
    }

    Transition::Applied { from, to: target }
}

/// Force a non-terminal file into `error` (submission rollback, session failure)
///
/// Terminal files are left alone.
pub fn fail(file: &mut QueuedFile, detail: &str) -> Transition {
    if file.state.is_terminal() {
        return Transition::IgnoredTerminal {
            current: file.state,
            attempted: FileState::Error,
        };
    }

    let from = file.state;
    file.state = FileState::Error;
    file.message = detail.to_string();
    file.error_detail = Some(detail.to_string());
    Transition::Applied {
        from,
        to: FileState::Error,
    }
}

/// Returns the new percent if it moved forward
fn advance_progress(file: &mut QueuedFile, progress: Option<f64>) -> Option<u8> {
    let value = progress?;
    if !value.is_finite() {
        return None;
    }
    let percent = value.round().clamp(0.0, 100.0) as u8;
    if percent > file.progress_percent {
        file.progress_percent = percent;
        Some(percent)
    } else {
        None
    }
}

fn non_empty_or(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}
