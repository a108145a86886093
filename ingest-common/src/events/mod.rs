//! Event types for the ingestion client
//!
//! Two families live here:
//! - [`ServerEvent`]: what the backend pushes over its event stream
//! - [`IngestEvent`]: local change notifications published on the [`EventBus`]
//!   for whatever renders the queue (list, summary panel, log panel, toasts)

mod upload_types;
mod wire_types;

pub use upload_types::{FileKind, FileState, LogSeverity, SessionState, UploadStats};
pub use wire_types::{
    CompletePayload, ErrorPayload, ProgressPayload, ServerEvent, SessionPayload, StartPayload,
    EVENT_CANCELLED, EVENT_COMPLETE, EVENT_ERROR, EVENT_PAUSED, EVENT_PROGRESS, EVENT_RESUMED,
    EVENT_START,
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Local change notifications
///
/// Emitted by the orchestrator after every processed message; consumers
/// re-read whatever part of the snapshot they render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// Queue contents or a per-file state changed
    ///
    /// Triggers:
    /// - UI: Re-render the file list
    FilesChanged {
        /// Files currently queued
        queued: usize,
        /// When the change was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Aggregate counters recomputed
    ///
    /// Triggers:
    /// - UI: Update the summary panel
    ///
    /// `stats` covers the whole queue; `session_stats` only the members of
    /// the current session.
    StatsChanged {
        stats: UploadStats,
        session_stats: UploadStats,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Upload session changed state
    ///
    /// Triggers:
    /// - UI: Enable/disable cancel, pause and resume controls
    SessionChanged {
        /// Server-issued session id, if bound
        session_id: Option<String>,
        old_state: SessionState,
        new_state: SessionState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Activity log entry appended
    ///
    /// Triggers:
    /// - UI: Append to the log panel
    LogAppended {
        severity: LogSeverity,
        message: String,
        file_name: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User-facing notification (submission-level failures, admission warnings)
    ///
    /// Triggers:
    /// - UI: Show a toast
    Notification {
        severity: LogSeverity,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Event stream connected or lost
    StreamStatus {
        connected: bool,
        detail: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl IngestEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            IngestEvent::FilesChanged { .. } => "FilesChanged",
            IngestEvent::StatsChanged { .. } => "StatsChanged",
            IngestEvent::SessionChanged { .. } => "SessionChanged",
            IngestEvent::LogAppended { .. } => "LogAppended",
            IngestEvent::Notification { .. } => "Notification",
            IngestEvent::StreamStatus { .. } => "StreamStatus",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Distribution bus for local change notifications
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the orchestrator)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use ingest_common::events::{EventBus, IngestEvent, UploadStats};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(IngestEvent::StatsChanged {
///     stats: UploadStats::default(),
///     session_stats: UploadStats::default(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "StatsChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IngestEvent,
    ) -> Result<usize, broadcast::error::SendError<IngestEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IngestEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
