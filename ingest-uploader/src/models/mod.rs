//! Data models for the upload orchestrator

pub mod activity_log;
pub mod queued_file;
pub mod upload_session;

pub use activity_log::{ActivityLog, ActivityLogEntry};
pub use queued_file::{FileHandle, LocalId, QueuedFile};
pub use upload_session::{ControlAction, SessionTransition, UploadSession, UploadSummary};
