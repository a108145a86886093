//! Upload session state machine
//!
//! `idle → submitting → active ⇄ paused → {cancelling → cancelled | completed | failed}`
//!
//! One session per batch submission. The session id is issued by the
//! server and normally arrives with the `upload:start` event.

use chrono::{DateTime, Utc};
use ingest_common::events::SessionState;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::LocalId;

/// Session control requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Cancel,
    Pause,
    Resume,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Cancel => "cancel",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
        }
    }

    /// Backend route segment (`POST /{segment}/{sessionId}`)
    pub fn route_segment(self) -> &'static str {
        match self {
            ControlAction::Cancel => "cancel-upload",
            ControlAction::Pause => "pause-upload",
            ControlAction::Resume => "resume-upload",
        }
    }

    /// Session state the action may be issued from
    pub fn required_state(self) -> SessionState {
        match self {
            ControlAction::Cancel | ControlAction::Pause => SessionState::Active,
            ControlAction::Resume => SessionState::Paused,
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session state change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub session_id: Option<String>,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Accepts either a count or the list of affected files
fn count_or_list<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::Array(items)) => Ok(items.len()),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid count {}", n))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a count or a list, got {}",
            other
        ))),
    }
}

/// `POST /upload` response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    #[serde(default, deserialize_with = "count_or_list")]
    pub successful: usize,
    #[serde(default, deserialize_with = "count_or_list")]
    pub failed: usize,
    #[serde(default, deserialize_with = "count_or_list")]
    pub duplicates: usize,
    /// Some backends echo the session id in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// One batch submission (in-memory state)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSession {
    /// Server-issued identifier, absent before the server reports it
    pub session_id: Option<String>,

    /// Current session state
    pub state: SessionState,

    /// Files the server announced for this session
    pub total_files: usize,

    /// Files submitted in this batch, in queue order
    pub members: Vec<LocalId>,

    /// Control request awaiting its HTTP response
    pub pending_control: Option<ControlAction>,

    /// State to restore if an optimistic cancel is rejected
    pub state_before_cancel: Option<SessionState>,

    /// Final server summary, once known
    pub summary: Option<UploadSummary>,

    pub started_at: Option<DateTime<Utc>>,

    /// Set on entering a terminal state
    pub ended_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    /// Start a fresh submission for `members`
    pub fn begin(&mut self, members: Vec<LocalId>) -> SessionTransition {
        let old_state = self.state;
        *self = Self {
            total_files: members.len(),
            members,
            started_at: Some(Utc::now()),
            ..Self::default()
        };
        self.state = SessionState::Submitting;

        SessionTransition {
            session_id: None,
            old_state,
            new_state: SessionState::Submitting,
            transitioned_at: Utc::now(),
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: SessionState) -> SessionTransition {
        let transition = SessionTransition {
            session_id: self.session_id.clone(),
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
            self.pending_control = None;
            self.state_before_cancel = None;
        }

        transition
    }

    /// Discard the session entirely (queue clear, force stop)
    pub fn reset(&mut self) -> SessionTransition {
        let transition = SessionTransition {
            session_id: self.session_id.clone(),
            old_state: self.state,
            new_state: SessionState::Idle,
            transitioned_at: Utc::now(),
        };
        *self = Self::default();
        transition
    }

    pub fn is_member(&self, local_id: LocalId) -> bool {
        self.members.contains(&local_id)
    }

    pub fn matches(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }
}
