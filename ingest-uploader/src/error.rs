//! Error types for ingest-uploader
//!
//! Every failure the orchestrator can hit is one of these. Inside the
//! message loop they never propagate: they become activity log entries,
//! per-file terminal states and toasts.

use ingest_common::events::SessionState;
use thiserror::Error;

use crate::models::{ControlAction, LocalId};
use crate::queue::AdmissionError;

/// Orchestrator error type
#[derive(Debug, Error)]
pub enum IngestError {
    /// Submit with nothing eligible to send
    #[error("No files eligible for upload")]
    QueueEmpty,

    /// Only one session may be in flight
    #[error("An upload session is already {0}")]
    SessionInFlight(SessionState),

    /// Session action not valid in the current state
    #[error("Cannot {action} while the session is {state}")]
    InvalidSessionState {
        action: &'static str,
        state: SessionState,
    },

    /// Control request before the server issued a session id
    #[error("Session id has not been received yet")]
    NoSessionId,

    /// A control request is still awaiting its response
    #[error("A {0} request is already pending")]
    ControlPending(ControlAction),

    /// Unknown local id
    #[error("File not in queue: {0}")]
    NotInQueue(LocalId),

    /// Queue admission rejected a file
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Transport failure talking to the backend
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Backend payload could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ingest-common error
    #[error("Common error: {0}")]
    Common(#[from] ingest_common::Error),

    /// The message loop has shut down
    #[error("Orchestrator is no longer running")]
    OrchestratorClosed,
}

/// Result type for orchestrator operations
pub type IngestResult<T> = Result<T, IngestError>;
