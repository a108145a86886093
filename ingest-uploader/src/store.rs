//! Upload store
//!
//! The single owner of queue, session and activity log state. Every
//! mutation goes through a method here; network work is never performed
//! directly. Instead, operations return an [`Effect`] describing the
//! request to issue, and the outcome is fed back through the matching
//! `*_finished` method. Change notifications accumulate in an outbox
//! drained with [`UploadStore::take_events`].

use chrono::Utc;
use ingest_common::events::{
    CompletePayload, FileKind, FileState, IngestEvent, LogSeverity, ProgressPayload,
    ServerEvent, SessionState, StartPayload, UploadStats,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::error::{IngestError, IngestResult};
use crate::file_state::{self, Transition};
use crate::models::{
    ActivityLog, ActivityLogEntry, ControlAction, FileHandle, LocalId, QueuedFile,
    SessionTransition, UploadSession, UploadSummary,
};
use crate::queue::{EnqueueReport, QueueLimits, QueueStore};
use crate::stats::compute_stats;

/// One file in a batch upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub local_id: LocalId,
    pub name: String,
    pub path: PathBuf,
    pub kind: FileKind,
    pub size_bytes: u64,
}

impl From<&QueuedFile> for UploadPart {
    fn from(file: &QueuedFile) -> Self {
        Self {
            local_id: file.local_id,
            name: file.name.clone(),
            path: file.path.clone(),
            kind: file.kind,
            size_bytes: file.size_bytes,
        }
    }
}

/// Network request the orchestrator must issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// `POST /upload` with every part
    Upload { attempt: u64, files: Vec<UploadPart> },
    /// `POST /{cancel,pause,resume}-upload/{sessionId}`
    Control {
        attempt: u64,
        action: ControlAction,
        session_id: String,
    },
    /// `DELETE /delete/{fileName}`
    DeleteFile { file_name: String },
    /// `DELETE /bulk-delete`
    BulkDelete { file_names: Vec<String> },
}

/// Construction options
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub limits: QueueLimits,
    /// 0 = unbounded
    pub activity_log_capacity: usize,
    /// Events held while the session id is unknown
    pub early_event_buffer: usize,
}

/// Everything the UI renders, copied out of the store
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub files: Vec<QueuedFile>,
    pub session: UploadSession,
    pub stats: UploadStats,
    pub session_stats: UploadStats,
    pub activity_log: Vec<ActivityLogEntry>,
    pub stream_connected: bool,
}

pub struct UploadStore {
    queue: QueueStore,
    session: UploadSession,
    activity: ActivityLog,
    stats: UploadStats,
    /// Counters over the current session's members only
    session_stats: UploadStats,
    /// Bumped per submission and whenever a session is discarded, so late
    /// responses for an abandoned attempt are recognised
    attempt: u64,
    early_events: VecDeque<ServerEvent>,
    early_event_buffer: usize,
    stream_connected: Option<bool>,
    files_dirty: bool,
    outbox: Vec<IngestEvent>,
}

impl UploadStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            queue: QueueStore::new(options.limits),
            session: UploadSession::default(),
            activity: ActivityLog::new(options.activity_log_capacity),
            stats: UploadStats::default(),
            session_stats: UploadStats::default(),
            attempt: 0,
            early_events: VecDeque::new(),
            early_event_buffer: options.early_event_buffer,
            stream_connected: None,
            files_dirty: false,
            outbox: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn files(&self) -> &[QueuedFile] {
        self.queue.files()
    }

    pub fn file(&self, local_id: LocalId) -> Option<&QueuedFile> {
        self.queue.get(local_id)
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    pub fn session_stats(&self) -> UploadStats {
        self.session_stats
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            files: self.queue.files().to_vec(),
            session: self.session.clone(),
            stats: self.stats,
            session_stats: self.session_stats,
            activity_log: self.activity.to_vec(),
            stream_connected: self.stream_connected.unwrap_or(false),
        }
    }

    /// Drain pending change notifications
    pub fn take_events(&mut self) -> Vec<IngestEvent> {
        if self.files_dirty {
            self.files_dirty = false;
            let timestamp = Utc::now();
            self.outbox.push(IngestEvent::FilesChanged {
                queued: self.queue.len(),
                timestamp,
            });
            self.outbox.push(IngestEvent::StatsChanged {
                stats: self.stats,
                session_stats: self.session_stats,
                timestamp,
            });
        }
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------
    // Queue operations
    // ------------------------------------------------------------------

    pub fn enqueue(&mut self, handles: Vec<FileHandle>) -> EnqueueReport {
        let report = self.queue.enqueue(handles);

        for local_id in &report.accepted {
            if let Some(file) = self.queue.get(*local_id) {
                let message = format!("Added {} ({})", file.name, file.kind);
                let name = file.name.clone();
                self.record(LogSeverity::Info, message, Some(&name));
            }
        }
        for rejection in &report.rejected {
            warn!(file_name = %rejection.file_name(), "File rejected: {}", rejection);
            self.record(
                LogSeverity::Warning,
                rejection.to_string(),
                Some(rejection.file_name()),
            );
            self.notify(LogSeverity::Warning, rejection.to_string());
        }

        if !report.accepted.is_empty() {
            self.mark_files_changed();
        }
        report
    }

    /// Remove one file; a `completed` file also needs server-side deletion
    pub fn remove(&mut self, local_id: LocalId) -> IngestResult<Option<Effect>> {
        let file = self
            .queue
            .remove(local_id)
            .ok_or(IngestError::NotInQueue(local_id))?;
        self.session.members.retain(|id| *id != local_id);
        self.mark_files_changed();
        self.record(
            LogSeverity::Info,
            format!("Removed {}", file.name),
            Some(&file.name),
        );

        if file.state == FileState::Completed {
            Ok(Some(Effect::DeleteFile {
                file_name: file.name,
            }))
        } else {
            Ok(None)
        }
    }

    /// Remove every file and discard the session; completed files are
    /// deleted server-side with one bulk request
    pub fn clear(&mut self) -> Option<Effect> {
        let removed = self.queue.clear();
        let completed: Vec<String> = removed
            .iter()
            .filter(|f| f.state == FileState::Completed)
            .map(|f| f.name.clone())
            .collect();

        if self.session.state != SessionState::Idle {
            if self.session.state.is_in_flight() {
                warn!(
                    session_id = ?self.session.session_id,
                    "Queue cleared while a session was in flight; no longer tracking it"
                );
            }
            self.discard_session();
        }

        self.mark_files_changed();
        self.record(
            LogSeverity::Info,
            format!("Queue cleared ({} files)", removed.len()),
            None,
        );

        if completed.is_empty() {
            None
        } else {
            Some(Effect::BulkDelete {
                file_names: completed,
            })
        }
    }

    /// Outcome of a `DeleteFile`/`BulkDelete` effect
    pub fn cleanup_finished(&mut self, description: &str, result: Result<(), String>) {
        match result {
            Ok(()) => {
                debug!("Server-side cleanup succeeded: {}", description);
                self.record(
                    LogSeverity::Info,
                    format!("Deleted {} from the server", description),
                    None,
                );
            }
            Err(message) => {
                warn!("Server-side cleanup failed for {}: {}", description, message);
                self.record(
                    LogSeverity::Warning,
                    format!("Could not delete {} from the server: {}", description, message),
                    None,
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Session operations
    // ------------------------------------------------------------------

    /// Start a batch submission with every eligible file
    pub fn submit(&mut self) -> IngestResult<Effect> {
        let state = self.session.state;
        if state.is_in_flight() {
            return Err(IngestError::SessionInFlight(state));
        }

        let eligible = self.queue.eligible_for_submit();
        if eligible.is_empty() {
            self.record(
                LogSeverity::Error,
                "Nothing to upload: add PDF or ZIP files first",
                None,
            );
            return Err(IngestError::QueueEmpty);
        }

        self.attempt += 1;
        self.early_events.clear();
        let transition = self.session.begin(eligible.clone());
        self.emit_transition(transition);

        let mut parts = Vec::with_capacity(eligible.len());
        for local_id in &eligible {
            if let Some(file) = self.queue.get_mut(*local_id) {
                file_state::begin_upload(file);
                parts.push(UploadPart::from(&*file));
            }
        }
        self.mark_files_changed();

        info!(attempt = self.attempt, files = parts.len(), "Submitting upload batch");
        self.record(
            LogSeverity::Info,
            format!("Uploading {} file(s)", parts.len()),
            None,
        );

        Ok(Effect::Upload {
            attempt: self.attempt,
            files: parts,
        })
    }

    /// Outcome of an `Upload` effect
    pub fn submit_finished(&mut self, attempt: u64, result: Result<UploadSummary, String>) {
        if attempt != self.attempt || self.session.state == SessionState::Idle {
            debug!(attempt, "Ignoring upload response for a discarded submission");
            return;
        }

        match result {
            Ok(summary) => {
                info!(
                    successful = summary.successful,
                    failed = summary.failed,
                    duplicates = summary.duplicates,
                    "Upload request finished"
                );
                self.record(
                    LogSeverity::Info,
                    format!(
                        "Upload request finished: {} successful, {} failed, {} duplicates",
                        summary.successful, summary.failed, summary.duplicates
                    ),
                    None,
                );

                if self.session.session_id.is_none() {
                    if let Some(session_id) = summary.session_id.clone() {
                        self.bind_session(session_id);
                    }
                }
                if self.session.summary.is_none() {
                    self.session.summary = Some(summary);
                }
                if self.session.state == SessionState::Submitting {
                    self.set_session_state(SessionState::Active);
                }
            }
            Err(message) => {
                error!(attempt, error = %message, "Upload request failed");
                let detail = format!("Upload failed: {}", message);

                let members = self.session.members.clone();
                let mut rolled_back = 0;
                for local_id in members {
                    if let Some(file) = self.queue.get_mut(local_id) {
                        if file.state == FileState::Uploading {
                            file_state::fail(file, &detail);
                            rolled_back += 1;
                        }
                    }
                }
                if rolled_back > 0 {
                    self.mark_files_changed();
                }

                if self.session.state.is_in_flight() {
                    self.set_session_state(SessionState::Failed);
                }
                self.record(LogSeverity::Error, detail.clone(), None);
                self.notify(LogSeverity::Error, detail);
            }
        }
    }

    /// Issue cancel, pause or resume against the current session
    pub fn request_control(&mut self, action: ControlAction) -> IngestResult<Effect> {
        let state = self.session.state;
        if state != action.required_state() {
            return Err(IngestError::InvalidSessionState {
                action: action.as_str(),
                state,
            });
        }
        if let Some(pending) = self.session.pending_control {
            return Err(IngestError::ControlPending(pending));
        }
        let session_id = self
            .session
            .session_id
            .clone()
            .ok_or(IngestError::NoSessionId)?;

        self.session.pending_control = Some(action);
        if action == ControlAction::Cancel {
            self.session.state_before_cancel = Some(state);
            self.set_session_state(SessionState::Cancelling);
        }

        info!(session_id = %session_id, action = %action, "Control request issued");
        self.record(
            LogSeverity::Info,
            format!("Requested {} of session {}", action, session_id),
            None,
        );

        Ok(Effect::Control {
            attempt: self.attempt,
            action,
            session_id,
        })
    }

    /// Outcome of a `Control` effect
    pub fn control_finished(
        &mut self,
        attempt: u64,
        action: ControlAction,
        result: Result<(), String>,
    ) {
        if attempt != self.attempt {
            debug!(attempt, action = %action, "Ignoring control response for a discarded session");
            return;
        }
        if self.session.pending_control == Some(action) {
            self.session.pending_control = None;
        }

        match result {
            Ok(()) => {
                self.record(
                    LogSeverity::Info,
                    format!("Server acknowledged {} request, awaiting confirmation", action),
                    None,
                );
            }
            Err(message) => {
                warn!(action = %action, error = %message, "Control request failed");
                if action == ControlAction::Cancel && self.session.state == SessionState::Cancelling
                {
                    if let Some(previous) = self.session.state_before_cancel.take() {
                        self.set_session_state(previous);
                    }
                }
                let text = format!("{} request failed: {}", action, message);
                self.record(LogSeverity::Error, text.clone(), None);
                self.notify(LogSeverity::Error, text);
            }
        }
    }

    /// Stop tracking the session locally without claiming the server stopped
    pub fn force_stop(&mut self) -> IngestResult<()> {
        let state = self.session.state;
        if !state.is_in_flight() {
            return Err(IngestError::InvalidSessionState {
                action: "force stop",
                state,
            });
        }

        let label = self
            .session
            .session_id
            .clone()
            .unwrap_or_else(|| "(no id yet)".to_string());
        warn!(session_id = %label, state = %state, "Force-stopping session tracking");

        self.discard_session();
        self.record(
            LogSeverity::Warning,
            format!(
                "Stopped tracking session {}; the server may still be processing it",
                label
            ),
            None,
        );
        self.notify(
            LogSeverity::Warning,
            "Stopped listening for upload progress. Server-side processing was not cancelled.",
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event stream
    // ------------------------------------------------------------------

    /// Connection state of the event stream
    pub fn stream_status(&mut self, connected: bool, detail: &str) {
        let previous = self.stream_connected.replace(connected);

        if connected {
            info!("Connected to upload event stream");
            self.record(LogSeverity::Info, "Connected to upload event stream", None);
        } else if previous != Some(false) {
            warn!(reason = %detail, "Upload event stream lost");
            self.record(
                LogSeverity::Warning,
                format!("Event stream disconnected ({}), reconnecting", detail),
                None,
            );
        } else {
            debug!(reason = %detail, "Event stream still unavailable");
            return;
        }

        self.outbox.push(IngestEvent::StreamStatus {
            connected,
            detail: detail.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// A frame arrived on the stream but could not be decoded
    pub fn undecodable_event(&mut self, detail: &str) {
        self.record(
            LogSeverity::Warning,
            format!("Ignored malformed server event: {}", detail),
            None,
        );
    }

    /// Route one backend event
    pub fn apply_server_event(&mut self, event: ServerEvent) {
        let event = match event {
            ServerEvent::Start(payload) => {
                self.handle_start(payload);
                return;
            }
            other => other,
        };

        let Some(session_id) = event.session_id().map(str::to_string) else {
            self.dispatch(event);
            return;
        };

        if self.session.matches(&session_id) {
            self.dispatch(event);
        } else if self.awaiting_session_id() {
            self.buffer_early(event);
        } else {
            debug!(
                session_id = %session_id,
                tracked = ?self.session.session_id,
                event = event.event_name(),
                "Dropping event for a session that is not tracked"
            );
        }
    }

    fn handle_start(&mut self, payload: StartPayload) {
        if self.session.matches(&payload.session_id) {
            self.session.total_files = payload.total_files;
            self.record(
                LogSeverity::Info,
                format!(
                    "Session {} announced again ({} files)",
                    payload.session_id, payload.total_files
                ),
                None,
            );
            return;
        }

        if !self.awaiting_session_id() {
            debug!(session_id = %payload.session_id, "Ignoring start of an untracked session");
            return;
        }

        self.session.total_files = payload.total_files;
        self.record(
            LogSeverity::Info,
            format!("Upload session started: {} files", payload.total_files),
            None,
        );
        self.bind_session(payload.session_id);
    }

    /// In flight without a server id; `upload:start` may trail the HTTP response
    fn awaiting_session_id(&self) -> bool {
        self.session.session_id.is_none() && self.session.state.is_in_flight()
    }

    fn bind_session(&mut self, session_id: String) {
        info!(session_id = %session_id, "Tracking upload session");
        self.session.session_id = Some(session_id.clone());
        if self.session.state == SessionState::Submitting {
            self.set_session_state(SessionState::Active);
        }

        let buffered: Vec<ServerEvent> = self.early_events.drain(..).collect();
        if !buffered.is_empty() {
            debug!(count = buffered.len(), "Replaying events received before the session id");
        }
        for event in buffered {
            if event.session_id() == Some(session_id.as_str()) {
                self.dispatch(event);
            } else {
                debug!(event = event.event_name(), "Discarding buffered event for another session");
            }
        }
    }

    fn buffer_early(&mut self, event: ServerEvent) {
        if self.early_event_buffer == 0 {
            debug!(event = event.event_name(), "Early event buffering disabled, dropping");
            return;
        }
        if self.early_events.len() >= self.early_event_buffer {
            warn!(
                capacity = self.early_event_buffer,
                "Early event buffer full, dropping oldest event"
            );
            self.early_events.pop_front();
        }
        debug!(event = event.event_name(), "Buffering event until the session id is known");
        self.early_events.push_back(event);
    }

    fn dispatch(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Start(payload) => self.handle_start(payload),
            ServerEvent::Progress(payload) => self.handle_progress(payload),
            ServerEvent::Complete(payload) => self.handle_complete(payload),
            ServerEvent::Error(payload) => self.handle_session_error(&payload.message),
            ServerEvent::Cancelled(_) => self.handle_confirmation(
                SessionState::Cancelled,
                &[
                    SessionState::Submitting,
                    SessionState::Active,
                    SessionState::Paused,
                    SessionState::Cancelling,
                ],
                "Upload cancelled",
            ),
            ServerEvent::Paused(_) => {
                self.handle_confirmation(SessionState::Paused, &[SessionState::Active], "Upload paused")
            }
            ServerEvent::Resumed(_) => {
                self.handle_confirmation(SessionState::Active, &[SessionState::Paused], "Upload resumed")
            }
        }
    }

    fn handle_progress(&mut self, payload: ProgressPayload) {
        let name = payload.file_name.as_str();

        if self.session.state == SessionState::Cancelled {
            debug!(file_name = %name, status = %payload.status, "Progress after cancellation");
            self.record(
                LogSeverity::Info,
                format!("{}: {} event ignored, session cancelled", name, payload.status),
                Some(name),
            );
            return;
        }

        let Some(target) = FileState::from_wire(&payload.status) else {
            warn!(file_name = %name, status = %payload.status, "Unknown file status");
            self.record(
                LogSeverity::Warning,
                format!("{}: unknown status '{}'", name, payload.status),
                Some(name),
            );
            return;
        };

        let Some(local_id) = self.queue.find_member_by_name(name, &self.session.members) else {
            debug!(file_name = %name, status = %target, "Progress for a file outside the session");
            self.record(
                LogSeverity::Info,
                format!("{}: {} (not in the upload queue)", name, describe(target, &payload.message)),
                Some(name),
            );
            return;
        };

        if self.session.state == SessionState::Paused {
            debug!(file_name = %name, "Progress received while paused");
        }

        let Some(file) = self.queue.get_mut(local_id) else {
            return;
        };
        let outcome = file_state::apply_status(file, target, &payload.message, payload.progress);
        let current = file.state;

        let (severity, message) = match &outcome {
            Transition::Applied { to, .. } => (
                LogSeverity::for_file_state(*to),
                format!("{}: {}", name, describe(*to, &payload.message)),
            ),
            Transition::Progressed { percent } => (
                LogSeverity::Info,
                format!("{}: {} {}%", name, describe(current, &payload.message), percent),
            ),
            Transition::Unchanged => (
                LogSeverity::Info,
                format!("{}: {}", name, describe(current, &payload.message)),
            ),
            Transition::Redelivered => (
                LogSeverity::Info,
                format!("{}: repeated {} event ignored", name, target),
            ),
            Transition::IgnoredTerminal { current, attempted } => (
                LogSeverity::Info,
                format!("{}: {} event ignored, file already {}", name, attempted, current),
            ),
            Transition::Rejected { reason } => (
                LogSeverity::Warning,
                format!("{}: {} event rejected ({})", name, target, reason),
            ),
        };

        if outcome.changed() {
            self.mark_files_changed();
        }
        self.record(severity, message, Some(name));
    }

    fn handle_complete(&mut self, payload: CompletePayload) {
        let summary = UploadSummary {
            successful: payload.successful,
            failed: payload.failed,
            duplicates: payload.duplicates,
            session_id: Some(payload.session_id.clone()),
        };
        let text = format!(
            "{} successful, {} failed, {} duplicates",
            summary.successful, summary.failed, summary.duplicates
        );
        self.session.summary = Some(summary);

        if self.session.state.is_terminal() {
            self.record(
                LogSeverity::Info,
                format!("Server finished session after it was {}: {}", self.session.state, text),
                None,
            );
            return;
        }

        self.resolve_unfinished("No final status received before the session completed");
        self.set_session_state(SessionState::Completed);
        self.record(LogSeverity::Success, format!("Upload complete: {}", text), None);
    }

    fn handle_session_error(&mut self, message: &str) {
        if !self.session.state.is_in_flight() {
            self.record(LogSeverity::Error, format!("Server error: {}", message), None);
            return;
        }

        error!(session_id = ?self.session.session_id, error = %message, "Upload session failed");
        self.resolve_unfinished(message);
        self.set_session_state(SessionState::Failed);
        let text = format!("Upload failed: {}", message);
        self.record(LogSeverity::Error, text.clone(), None);
        self.notify(LogSeverity::Error, text);
    }

    fn handle_confirmation(&mut self, target: SessionState, allowed_from: &[SessionState], label: &str) {
        let state = self.session.state;
        if state == target {
            self.record(LogSeverity::Info, format!("{} (already {})", label, target), None);
        } else if allowed_from.contains(&state) {
            self.set_session_state(target);
            self.record(LogSeverity::Info, label.to_string(), None);
        } else {
            self.record(
                LogSeverity::Info,
                format!("{} event ignored while session is {}", target, state),
                None,
            );
        }
    }

    /// Fail every session member still short of a terminal state
    fn resolve_unfinished(&mut self, detail: &str) {
        let members = self.session.members.clone();
        let mut resolved = Vec::new();
        for local_id in members {
            if let Some(file) = self.queue.get_mut(local_id) {
                if file_state::fail(file, detail).changed() {
                    resolved.push(file.name.clone());
                }
            }
        }

        if resolved.is_empty() {
            return;
        }
        self.mark_files_changed();
        for name in resolved {
            self.record(LogSeverity::Error, format!("{}: error - {}", name, detail), Some(&name));
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn discard_session(&mut self) {
        self.attempt += 1;
        self.early_events.clear();
        let transition = self.session.reset();
        self.emit_transition(transition);
        self.mark_files_changed();
    }

    fn set_session_state(&mut self, new_state: SessionState) {
        let transition = self.session.transition_to(new_state);
        self.emit_transition(transition);
    }

    fn emit_transition(&mut self, transition: SessionTransition) {
        if transition.old_state == transition.new_state {
            return;
        }
        info!(
            session_id = ?transition.session_id,
            old_state = %transition.old_state,
            new_state = %transition.new_state,
            "Session state changed"
        );
        self.outbox.push(IngestEvent::SessionChanged {
            session_id: transition.session_id,
            old_state: transition.old_state,
            new_state: transition.new_state,
            timestamp: transition.transitioned_at,
        });
    }

    fn mark_files_changed(&mut self) {
        self.stats = compute_stats(self.queue.files());
        let queue = &self.queue;
        self.session_stats =
            compute_stats(self.session.members.iter().filter_map(|id| queue.get(*id)));
        self.files_dirty = true;
    }

    fn record(&mut self, severity: LogSeverity, message: impl Into<String>, file_name: Option<&str>) {
        let entry = self.activity.append(severity, message, file_name);
        self.outbox.push(IngestEvent::LogAppended {
            severity: entry.severity,
            message: entry.message,
            file_name: entry.file_name,
            timestamp: entry.timestamp,
        });
    }

    fn notify(&mut self, severity: LogSeverity, message: impl Into<String>) {
        self.outbox.push(IngestEvent::Notification {
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}

fn describe(state: FileState, message: &str) -> String {
    if message.trim().is_empty() {
        state.to_string()
    } else {
        format!("{} - {}", state, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_common::events::{ErrorPayload, SessionPayload};

    fn options() -> StoreOptions {
        StoreOptions {
            limits: QueueLimits {
                max_file_size_bytes: 50 * 1024 * 1024,
                max_queue_len: 100,
            },
            activity_log_capacity: 0,
            early_event_buffer: 16,
        }
    }

    fn store_with(names: &[&str]) -> (UploadStore, Vec<LocalId>) {
        let mut store = UploadStore::new(options());
        let handles = names
            .iter()
            .map(|name| FileHandle::new(format!("/tmp/{}", name), *name, 1024))
            .collect();
        let report = store.enqueue(handles);
        store.take_events();
        (store, report.accepted)
    }

    fn start(session_id: &str, total_files: usize) -> ServerEvent {
        ServerEvent::Start(StartPayload {
            session_id: session_id.to_string(),
            total_files,
        })
    }

    fn progress(session_id: &str, file_name: &str, status: &str, message: &str) -> ServerEvent {
        ServerEvent::Progress(ProgressPayload {
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            status: status.to_string(),
            message: message.to_string(),
            progress: None,
        })
    }

    fn complete(session_id: &str) -> ServerEvent {
        ServerEvent::Complete(CompletePayload {
            session_id: session_id.to_string(),
            successful: 0,
            failed: 0,
            duplicates: 0,
        })
    }

    fn session_event(session_id: &str) -> SessionPayload {
        SessionPayload {
            session_id: session_id.to_string(),
        }
    }

    fn state_of(store: &UploadStore, local_id: LocalId) -> FileState {
        store.file(local_id).unwrap().state
    }

    /// Submit and bind the session via `upload:start`
    fn active_session(names: &[&str], session_id: &str) -> (UploadStore, Vec<LocalId>) {
        let (mut store, ids) = store_with(names);
        store.submit().unwrap();
        store.apply_server_event(start(session_id, names.len()));
        assert_eq!(store.session().state, SessionState::Active);
        store.take_events();
        (store, ids)
    }

    #[test]
    fn test_happy_path_batch() {
        let (mut store, ids) = store_with(&["a.pdf", "b.pdf", "c.pdf"]);

        let effect = store.submit().unwrap();
        match effect {
            Effect::Upload { attempt, files } => {
                assert_eq!(attempt, 1);
                assert_eq!(files.len(), 3);
                assert_eq!(files[0].name, "a.pdf");
            }
            other => panic!("Unexpected effect: {:?}", other),
        }
        assert_eq!(store.session().state, SessionState::Submitting);
        assert!(ids.iter().all(|id| state_of(&store, *id) == FileState::Uploading));

        store.apply_server_event(start("S1", 3));
        assert_eq!(store.session().session_id.as_deref(), Some("S1"));
        assert_eq!(store.session().state, SessionState::Active);

        store.apply_server_event(progress("S1", "a.pdf", "processing", ""));
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(progress("S1", "b.pdf", "duplicate", "Already imported"));
        store.apply_server_event(progress("S1", "c.pdf", "error", "Unreadable"));
        store.apply_server_event(complete("S1"));

        assert_eq!(state_of(&store, ids[0]), FileState::Completed);
        assert_eq!(state_of(&store, ids[1]), FileState::Duplicate);
        assert_eq!(state_of(&store, ids[2]), FileState::Error);
        assert_eq!(store.session().state, SessionState::Completed);

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processing, 0);

        let file = store.file(ids[1]).unwrap();
        assert_eq!(file.duplicate_reason.as_deref(), Some("Already imported"));
        let file = store.file(ids[2]).unwrap();
        assert_eq!(file.error_detail.as_deref(), Some("Unreadable"));
    }

    #[test]
    fn test_submit_with_empty_queue() {
        let mut store = UploadStore::new(options());
        let result = store.submit();
        assert!(matches!(result, Err(IngestError::QueueEmpty)));
        assert_eq!(store.session().state, SessionState::Idle);

        let last = store.activity_log().entries().last().unwrap();
        assert_eq!(last.severity, LogSeverity::Error);
    }

    #[test]
    fn test_second_submit_rejected_while_in_flight() {
        let (mut store, _) = active_session(&["a.pdf"], "S1");
        let result = store.submit();
        assert!(matches!(
            result,
            Err(IngestError::SessionInFlight(SessionState::Active))
        ));
    }

    #[test]
    fn test_stale_session_events_ignored() {
        let (mut store, ids) = active_session(&["a.pdf"], "S2");

        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::Uploading);

        store.apply_server_event(complete("S1"));
        assert_eq!(store.session().state, SessionState::Active);
    }

    #[test]
    fn test_cancel_flow() {
        let (mut store, ids) = active_session(&["a.pdf", "b.pdf"], "S1");

        let effect = store.request_control(ControlAction::Cancel).unwrap();
        assert_eq!(
            effect,
            Effect::Control {
                attempt: 1,
                action: ControlAction::Cancel,
                session_id: "S1".to_string(),
            }
        );
        assert_eq!(store.session().state, SessionState::Cancelling);

        store.control_finished(1, ControlAction::Cancel, Ok(()));
        store.apply_server_event(ServerEvent::Cancelled(session_event("S1")));
        assert_eq!(store.session().state, SessionState::Cancelled);

        // Files keep their last state and may be resubmitted
        assert_eq!(state_of(&store, ids[0]), FileState::Uploading);
        let effect = store.submit().unwrap();
        assert!(matches!(effect, Effect::Upload { attempt: 2, .. }));
    }

    #[test]
    fn test_progress_after_cancel_ignored() {
        let (mut store, ids) = active_session(&["a.pdf", "b.pdf"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "processing", ""));

        store.request_control(ControlAction::Cancel).unwrap();
        store.control_finished(1, ControlAction::Cancel, Ok(()));
        store.apply_server_event(ServerEvent::Cancelled(session_event("S1")));
        assert_eq!(store.session().state, SessionState::Cancelled);

        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::Processing);
        assert_eq!(state_of(&store, ids[1]), FileState::Uploading);
        assert_eq!(store.session().state, SessionState::Cancelled);

        let last = store.activity_log().to_vec().pop().unwrap();
        assert!(last.message.contains("session cancelled"));
        assert_eq!(last.file_name.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn test_cancel_failure_restores_state() {
        let (mut store, _) = active_session(&["a.pdf"], "S1");
        store.request_control(ControlAction::Cancel).unwrap();
        store.take_events();

        store.control_finished(1, ControlAction::Cancel, Err("HTTP 500".to_string()));
        assert_eq!(store.session().state, SessionState::Active);
        assert_eq!(store.session().pending_control, None);

        let events = store.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, IngestEvent::Notification { severity: LogSeverity::Error, .. })));
    }

    #[test]
    fn test_control_requires_session_state() {
        let (mut store, _) = store_with(&["a.pdf"]);
        let result = store.request_control(ControlAction::Pause);
        assert!(matches!(
            result,
            Err(IngestError::InvalidSessionState { action: "pause", state: SessionState::Idle })
        ));

        let (mut store, _) = active_session(&["a.pdf"], "S1");
        let result = store.request_control(ControlAction::Resume);
        assert!(matches!(result, Err(IngestError::InvalidSessionState { .. })));
    }

    #[test]
    fn test_control_single_flight() {
        let (mut store, _) = active_session(&["a.pdf"], "S1");
        store.request_control(ControlAction::Pause).unwrap();
        let second = store.request_control(ControlAction::Pause);
        assert!(matches!(
            second,
            Err(IngestError::ControlPending(ControlAction::Pause))
        ));
    }

    #[test]
    fn test_control_without_session_id() {
        let (mut store, _) = store_with(&["a.pdf"]);
        store.submit().unwrap();
        store.submit_finished(1, Ok(UploadSummary::default()));
        assert_eq!(store.session().state, SessionState::Active);

        let result = store.request_control(ControlAction::Cancel);
        assert!(matches!(result, Err(IngestError::NoSessionId)));
        assert_eq!(store.session().state, SessionState::Active);
    }

    #[test]
    fn test_pause_and_resume_confirmations() {
        let (mut store, ids) = active_session(&["a.pdf"], "S1");
        store.request_control(ControlAction::Pause).unwrap();
        store.control_finished(1, ControlAction::Pause, Ok(()));
        assert_eq!(store.session().state, SessionState::Active);

        store.apply_server_event(ServerEvent::Paused(session_event("S1")));
        assert_eq!(store.session().state, SessionState::Paused);

        // Progress still lands while paused
        store.apply_server_event(progress("S1", "a.pdf", "processing", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::Processing);

        store.request_control(ControlAction::Resume).unwrap();
        store.control_finished(1, ControlAction::Resume, Ok(()));
        store.apply_server_event(ServerEvent::Resumed(session_event("S1")));
        assert_eq!(store.session().state, SessionState::Active);
    }

    #[test]
    fn test_zip_extraction() {
        let (mut store, ids) = active_session(&["invoices.zip"], "S1");

        store.apply_server_event(progress("S1", "invoices.zip", "processing_zip", "Extracting"));
        assert_eq!(state_of(&store, ids[0]), FileState::ProcessingZip);

        store.apply_server_event(progress("S1", "invoices.zip", "zip_extracted", "12 invoices"));
        assert_eq!(state_of(&store, ids[0]), FileState::ZipExtracted);
        assert_eq!(store.file(ids[0]).unwrap().progress(), Some(100));

        store.apply_server_event(complete("S1"));
        assert_eq!(store.stats().completed, 1);
        assert_eq!(store.stats().failed, 0);
    }

    #[test]
    fn test_zip_states_rejected_for_pdf() {
        let (mut store, ids) = active_session(&["a.pdf"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "processing_zip", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::Uploading);

        let last = store.activity_log().entries().last().unwrap();
        assert_eq!(last.severity, LogSeverity::Warning);
    }

    #[test]
    fn test_upload_request_failure_rolls_back() {
        let (mut store, ids) = store_with(&["a.pdf", "b.pdf"]);
        store.submit().unwrap();
        store.take_events();

        store.submit_finished(1, Err("connection refused".to_string()));

        assert_eq!(store.session().state, SessionState::Failed);
        for id in &ids {
            let file = store.file(*id).unwrap();
            assert_eq!(file.state, FileState::Error);
            assert!(file.error_detail.as_deref().unwrap().contains("connection refused"));
        }

        let events = store.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, IngestEvent::Notification { .. })));

        // Resubmission is allowed and re-sends the failed files
        match store.submit().unwrap() {
            Effect::Upload { files, .. } => assert_eq!(files.len(), 2),
            other => panic!("Unexpected effect: {:?}", other),
        }
    }

    #[test]
    fn test_late_response_for_discarded_attempt_ignored() {
        let (mut store, ids) = store_with(&["a.pdf"]);
        store.submit().unwrap();
        store.force_stop().unwrap();
        assert_eq!(store.session().state, SessionState::Idle);

        store.submit_finished(1, Err("timeout".to_string()));
        assert_eq!(store.session().state, SessionState::Idle);
        assert_eq!(state_of(&store, ids[0]), FileState::Uploading);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let (mut store, ids) = active_session(&["a.pdf"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(progress("S1", "a.pdf", "processing", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::Completed);

        let before = store.stats();
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        assert_eq!(store.stats(), before);
    }

    #[test]
    fn test_events_before_start_are_buffered() {
        let (mut store, ids) = store_with(&["a.pdf"]);
        store.submit().unwrap();

        store.apply_server_event(progress("S1", "a.pdf", "processing", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::Uploading);

        store.apply_server_event(start("S1", 1));
        assert_eq!(state_of(&store, ids[0]), FileState::Processing);
    }

    #[test]
    fn test_buffered_events_bound_by_upload_response() {
        let (mut store, ids) = store_with(&["a.pdf"]);
        store.submit().unwrap();
        store.apply_server_event(progress("S9", "a.pdf", "completed", ""));

        let summary = UploadSummary {
            successful: 1,
            session_id: Some("S9".to_string()),
            ..Default::default()
        };
        store.submit_finished(1, Ok(summary));
        assert_eq!(store.session().session_id.as_deref(), Some("S9"));
        assert_eq!(state_of(&store, ids[0]), FileState::Completed);
    }

    #[test]
    fn test_start_after_upload_response() {
        let (mut store, ids) = store_with(&["a.pdf"]);
        store.submit().unwrap();
        store.submit_finished(1, Ok(UploadSummary::default()));
        assert_eq!(store.session().state, SessionState::Active);

        store.apply_server_event(progress("S1", "a.pdf", "processing", ""));
        store.apply_server_event(start("S1", 1));
        assert_eq!(store.session().session_id.as_deref(), Some("S1"));
        assert_eq!(state_of(&store, ids[0]), FileState::Processing);
    }

    #[test]
    fn test_early_buffer_drops_oldest() {
        let mut opts = options();
        opts.early_event_buffer = 1;
        let mut store = UploadStore::new(opts);
        let report = store.enqueue(vec![
            FileHandle::new("/tmp/a.pdf", "a.pdf", 10),
            FileHandle::new("/tmp/b.pdf", "b.pdf", 10),
        ]);
        store.submit().unwrap();

        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(progress("S1", "b.pdf", "completed", ""));
        store.apply_server_event(start("S1", 2));

        assert_eq!(state_of(&store, report.accepted[0]), FileState::Uploading);
        assert_eq!(state_of(&store, report.accepted[1]), FileState::Completed);
    }

    #[test]
    fn test_unknown_file_name_logged_and_dropped() {
        let (mut store, _) = active_session(&["a.pdf"], "S1");
        let before = store.stats();
        store.apply_server_event(progress("S1", "other.pdf", "completed", ""));
        assert_eq!(store.stats(), before);

        let last = store.activity_log().entries().last().unwrap();
        assert_eq!(last.file_name.as_deref(), Some("other.pdf"));
        assert!(last.message.contains("not in the upload queue"));
    }

    #[test]
    fn test_unknown_status_logged() {
        let (mut store, ids) = active_session(&["a.pdf"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "teleported", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::Uploading);

        let last = store.activity_log().entries().last().unwrap();
        assert_eq!(last.severity, LogSeverity::Warning);
    }

    #[test]
    fn test_complete_resolves_unfinished_files() {
        let (mut store, ids) = active_session(&["a.pdf", "b.pdf"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(complete("S1"));

        assert_eq!(state_of(&store, ids[0]), FileState::Completed);
        assert_eq!(state_of(&store, ids[1]), FileState::Error);
        let stats = store.stats();
        assert_eq!(stats.accounted(), stats.total);
    }

    #[test]
    fn test_session_error_fails_session() {
        let (mut store, ids) = active_session(&["a.pdf"], "S1");
        store.apply_server_event(ServerEvent::Error(ErrorPayload {
            session_id: None,
            message: "Database unavailable".to_string(),
        }));

        assert_eq!(store.session().state, SessionState::Failed);
        let file = store.file(ids[0]).unwrap();
        assert_eq!(file.state, FileState::Error);
        assert_eq!(file.error_detail.as_deref(), Some("Database unavailable"));
    }

    #[test]
    fn test_duplicate_names_resolve_to_session_member() {
        let (mut store, ids) = store_with(&["a.pdf"]);
        store.submit().unwrap();
        store.apply_server_event(start("S1", 1));
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(complete("S1"));

        // Same name queued again for a second batch
        let second = store
            .enqueue(vec![FileHandle::new("/tmp/new/a.pdf", "a.pdf", 10)])
            .accepted[0];
        match store.submit().unwrap() {
            Effect::Upload { files, .. } => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].local_id, second);
            }
            other => panic!("Unexpected effect: {:?}", other),
        }
        store.apply_server_event(start("S2", 1));
        store.apply_server_event(progress("S2", "a.pdf", "error", "Bad scan"));

        assert_eq!(state_of(&store, ids[0]), FileState::Completed);
        assert_eq!(state_of(&store, second), FileState::Error);
    }

    #[test]
    fn test_remove_completed_file_requests_delete() {
        let (mut store, ids) = active_session(&["a.pdf", "b.pdf"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(progress("S1", "b.pdf", "error", ""));

        let effect = store.remove(ids[0]).unwrap();
        assert_eq!(
            effect,
            Some(Effect::DeleteFile {
                file_name: "a.pdf".to_string()
            })
        );
        assert_eq!(store.remove(ids[1]).unwrap(), None);
        assert!(matches!(store.remove(ids[1]), Err(IngestError::NotInQueue(_))));
        assert!(store.session().members.is_empty());
    }

    #[test]
    fn test_clear_bulk_deletes_completed() {
        let (mut store, _) = active_session(&["a.pdf", "b.pdf", "c.zip"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(progress("S1", "c.zip", "zip_extracted", ""));

        let effect = store.clear();
        assert_eq!(
            effect,
            Some(Effect::BulkDelete {
                file_names: vec!["a.pdf".to_string()]
            })
        );
        assert!(store.files().is_empty());
        assert_eq!(store.session().state, SessionState::Idle);
        assert_eq!(store.stats(), UploadStats::default());
    }

    #[test]
    fn test_clear_with_several_completed_files() {
        let (mut store, _) = active_session(&["a.pdf", "b.pdf", "c.pdf"], "S1");
        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(progress("S1", "b.pdf", "completed", ""));
        store.apply_server_event(progress("S1", "c.pdf", "error", ""));

        let effect = store.clear();
        assert_eq!(
            effect,
            Some(Effect::BulkDelete {
                file_names: vec!["a.pdf".to_string(), "b.pdf".to_string()]
            })
        );
        assert!(store.files().is_empty());
    }

    #[test]
    fn test_remove_zip_extracted_keeps_server_copies() {
        let (mut store, ids) = active_session(&["c.zip"], "S1");
        store.apply_server_event(progress("S1", "c.zip", "processing_zip", ""));
        store.apply_server_event(progress("S1", "c.zip", "zip_extracted", ""));
        assert_eq!(state_of(&store, ids[0]), FileState::ZipExtracted);

        assert_eq!(store.remove(ids[0]).unwrap(), None);
    }

    #[test]
    fn test_session_stats_exclude_files_added_mid_session() {
        let (mut store, _) = active_session(&["a.pdf"], "S1");
        store.enqueue(vec![FileHandle::new("/tmp/b.pdf", "b.pdf", 1024)]);

        store.apply_server_event(progress("S1", "a.pdf", "completed", ""));
        store.apply_server_event(complete("S1"));
        assert_eq!(store.session().state, SessionState::Completed);

        let session_stats = store.session_stats();
        assert_eq!(session_stats.total, 1);
        assert_eq!(session_stats.accounted(), session_stats.total);
        assert_eq!(store.stats().total, 2);
        assert_eq!(store.snapshot().session_stats, session_stats);

        store.clear();
        assert_eq!(store.session_stats(), UploadStats::default());
    }

    #[test]
    fn test_clear_without_completed_files() {
        let (mut store, _) = store_with(&["a.pdf"]);
        assert_eq!(store.clear(), None);
    }

    #[test]
    fn test_force_stop() {
        let (mut store, _) = active_session(&["a.pdf"], "S1");
        store.force_stop().unwrap();
        assert_eq!(store.session().state, SessionState::Idle);

        // Later events for the abandoned session are dropped
        store.apply_server_event(complete("S1"));
        assert_eq!(store.session().state, SessionState::Idle);

        assert!(matches!(
            store.force_stop(),
            Err(IngestError::InvalidSessionState { .. })
        ));
    }

    #[test]
    fn test_rejections_produce_notifications() {
        let mut store = UploadStore::new(options());
        let report = store.enqueue(vec![FileHandle::new("/tmp/notes.txt", "notes.txt", 10)]);
        assert!(report.accepted.is_empty());

        let events = store.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            IngestEvent::Notification { severity: LogSeverity::Warning, .. }
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, IngestEvent::FilesChanged { .. })));
    }

    #[test]
    fn test_take_events_reports_changes() {
        let (mut store, _) = store_with(&["a.pdf"]);
        store.submit().unwrap();
        let events = store.take_events();

        assert!(events.iter().any(|e| matches!(
            e,
            IngestEvent::SessionChanged { new_state: SessionState::Submitting, .. }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, IngestEvent::StatsChanged { .. })));
        assert!(store.take_events().is_empty());
    }

    #[test]
    fn test_stream_disconnect_logged_once() {
        let mut store = UploadStore::new(options());
        store.stream_status(false, "connection refused");
        store.stream_status(false, "connection refused");
        assert_eq!(store.activity_log().len(), 1);

        store.stream_status(true, "");
        assert_eq!(store.activity_log().len(), 2);
        assert!(store.snapshot().stream_connected);
    }
}
