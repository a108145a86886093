//! File identity & queue store
//!
//! Holds the files accepted into the upload queue, independent of any
//! upload session. Server-side cleanup for removed files is not issued
//! here; the store only reports what needs deleting.

use ingest_common::events::{FileKind, FileState};
use ingest_common::human_size::format_bytes;
use std::fmt;

use crate::models::{FileHandle, LocalId, QueuedFile};

/// Admission limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub max_file_size_bytes: u64,
    pub max_queue_len: usize,
}

/// Reason a file was not admitted (non-fatal, reported per file)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    TooLarge {
        name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },
    QueueFull {
        name: String,
        limit: usize,
    },
    UnsupportedKind {
        name: String,
    },
}

impl AdmissionError {
    pub fn file_name(&self) -> &str {
        match self {
            AdmissionError::TooLarge { name, .. }
            | AdmissionError::QueueFull { name, .. }
            | AdmissionError::UnsupportedKind { name } => name,
        }
    }
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::TooLarge {
                name,
                size_bytes,
                limit_bytes,
            } => write!(
                f,
                "{} is {}, larger than the {} limit",
                name,
                format_bytes(*size_bytes),
                format_bytes(*limit_bytes)
            ),
            AdmissionError::QueueFull { name, limit } => {
                write!(f, "{} not added: the queue is full ({} files)", name, limit)
            }
            AdmissionError::UnsupportedKind { name } => {
                write!(f, "{} not added: only PDF and ZIP files are accepted", name)
            }
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Result of one `enqueue` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    pub accepted: Vec<LocalId>,
    pub rejected: Vec<AdmissionError>,
}

/// The upload queue
#[derive(Debug, Clone)]
pub struct QueueStore {
    files: Vec<QueuedFile>,
    next_id: u64,
    limits: QueueLimits,
}

impl QueueStore {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            files: Vec::new(),
            next_id: 1,
            limits,
        }
    }

    /// Admit files, each with a fresh local id in state `pending`
    pub fn enqueue(&mut self, handles: Vec<FileHandle>) -> EnqueueReport {
        let mut report = EnqueueReport::default();

        for handle in handles {
            let Some(kind) = FileKind::from_file_name(&handle.name) else {
                report
                    .rejected
                    .push(AdmissionError::UnsupportedKind { name: handle.name });
                continue;
            };

            if handle.size_bytes > self.limits.max_file_size_bytes {
                report.rejected.push(AdmissionError::TooLarge {
                    name: handle.name,
                    size_bytes: handle.size_bytes,
                    limit_bytes: self.limits.max_file_size_bytes,
                });
                continue;
            }

            if self.files.len() >= self.limits.max_queue_len {
                report.rejected.push(AdmissionError::QueueFull {
                    name: handle.name,
                    limit: self.limits.max_queue_len,
                });
                continue;
            }

            let local_id = LocalId::new(self.next_id);
            self.next_id += 1;
            self.files.push(QueuedFile::new(local_id, handle, kind));
            report.accepted.push(local_id);
        }

        report
    }

    pub fn remove(&mut self, local_id: LocalId) -> Option<QueuedFile> {
        let index = self.files.iter().position(|f| f.local_id == local_id)?;
        Some(self.files.remove(index))
    }

    /// Remove everything, returning the removed files
    pub fn clear(&mut self) -> Vec<QueuedFile> {
        std::mem::take(&mut self.files)
    }

    pub fn get(&self, local_id: LocalId) -> Option<&QueuedFile> {
        self.files.iter().find(|f| f.local_id == local_id)
    }

    pub fn get_mut(&mut self, local_id: LocalId) -> Option<&mut QueuedFile> {
        self.files.iter_mut().find(|f| f.local_id == local_id)
    }

    pub fn files(&self) -> &[QueuedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files a new submission would send: everything not already a
    /// success or a duplicate
    pub fn eligible_for_submit(&self) -> Vec<LocalId> {
        self.files
            .iter()
            .filter(|f| !f.state.is_success() && f.state != FileState::Duplicate)
            .map(|f| f.local_id)
            .collect()
    }

    /// Resolve a server file name to a session member
    ///
    /// Events carry only the file name. With several members sharing a
    /// name the first non-terminal one (queue order) wins, falling back to
    /// the first member with that name.
    pub fn find_member_by_name(&self, name: &str, members: &[LocalId]) -> Option<LocalId> {
        let mut candidates = self
            .files
            .iter()
            .filter(|f| f.name == name && members.contains(&f.local_id));

        let first = candidates.next()?;
        if !first.state.is_terminal() {
            return Some(first.local_id);
        }
        candidates
            .find(|f| !f.state.is_terminal())
            .map(|f| f.local_id)
            .or(Some(first.local_id))
    }
}
