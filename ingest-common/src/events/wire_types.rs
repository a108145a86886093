//! Events pushed by the ingestion backend over its event stream
//!
//! The SSE `event:` field carries the event name (`upload:progress`, ...),
//! the `data:` field carries a camelCase JSON payload.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

pub const EVENT_START: &str = "upload:start";
pub const EVENT_PROGRESS: &str = "upload:progress";
pub const EVENT_COMPLETE: &str = "upload:complete";
pub const EVENT_ERROR: &str = "upload:error";
pub const EVENT_CANCELLED: &str = "upload:cancelled";
pub const EVENT_PAUSED: &str = "upload:paused";
pub const EVENT_RESUMED: &str = "upload:resumed";

/// Session ids are opaque; some backends emit them as numbers
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "session id must be a string or number, got {}",
            other
        ))),
    }
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "session id must be a string or number, got {}",
            other
        ))),
    }
}

/// `upload:start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    #[serde(deserialize_with = "deserialize_id")]
    pub session_id: String,
    pub total_files: usize,
}

/// `upload:progress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    #[serde(deserialize_with = "deserialize_id")]
    pub session_id: String,
    pub file_name: String,
    /// Raw status string, parsed with `FileState::from_wire`
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// `upload:complete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    #[serde(deserialize_with = "deserialize_id")]
    pub session_id: String,
    #[serde(default)]
    pub successful: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub duplicates: usize,
}

/// `upload:error`; the session id is not always present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(
        default,
        deserialize_with = "deserialize_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    pub message: String,
}

/// `upload:cancelled`, `upload:paused`, `upload:resumed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    #[serde(deserialize_with = "deserialize_id")]
    pub session_id: String,
}

/// One decoded backend event
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Start(StartPayload),
    Progress(ProgressPayload),
    Complete(CompletePayload),
    Error(ErrorPayload),
    Cancelled(SessionPayload),
    Paused(SessionPayload),
    Resumed(SessionPayload),
}

impl ServerEvent {
    /// Decode an event from its SSE name and JSON data
    ///
    /// Returns `Ok(None)` for event names this client does not consume.
    pub fn parse(event_name: &str, data: &str) -> Result<Option<Self>> {
        let event = match event_name {
            EVENT_START => ServerEvent::Start(serde_json::from_str(data)?),
            EVENT_PROGRESS => ServerEvent::Progress(serde_json::from_str(data)?),
            EVENT_COMPLETE => ServerEvent::Complete(serde_json::from_str(data)?),
            EVENT_ERROR => ServerEvent::Error(serde_json::from_str(data)?),
            EVENT_CANCELLED => ServerEvent::Cancelled(serde_json::from_str(data)?),
            EVENT_PAUSED => ServerEvent::Paused(serde_json::from_str(data)?),
            EVENT_RESUMED => ServerEvent::Resumed(serde_json::from_str(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// SSE event name for this event
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Start(_) => EVENT_START,
            ServerEvent::Progress(_) => EVENT_PROGRESS,
            ServerEvent::Complete(_) => EVENT_COMPLETE,
            ServerEvent::Error(_) => EVENT_ERROR,
            ServerEvent::Cancelled(_) => EVENT_CANCELLED,
            ServerEvent::Paused(_) => EVENT_PAUSED,
            ServerEvent::Resumed(_) => EVENT_RESUMED,
        }
    }

    /// Session the event belongs to (`None` only for session-less errors)
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerEvent::Start(p) => Some(&p.session_id),
            ServerEvent::Progress(p) => Some(&p.session_id),
            ServerEvent::Complete(p) => Some(&p.session_id),
            ServerEvent::Error(p) => p.session_id.as_deref(),
            ServerEvent::Cancelled(p) | ServerEvent::Paused(p) | ServerEvent::Resumed(p) => {
                Some(&p.session_id)
            }
        }
    }

    /// JSON payload as sent in the SSE `data:` field
    pub fn to_data(&self) -> Result<String> {
        let data = match self {
            ServerEvent::Start(p) => serde_json::to_string(p),
            ServerEvent::Progress(p) => serde_json::to_string(p),
            ServerEvent::Complete(p) => serde_json::to_string(p),
            ServerEvent::Error(p) => serde_json::to_string(p),
            ServerEvent::Cancelled(p) | ServerEvent::Paused(p) | ServerEvent::Resumed(p) => {
                serde_json::to_string(p)
            }
        };
        data.map_err(Error::from)
    }
}
